use tempfile::tempdir;
use treescan_core::errors::ScanError;
use treescan_core::serde::write_json;
use treescan_core::{
    AnalysisConfig, ConditionalType, ModelType, OutputConfig, SchemaVersion, ScanType, TemporalConfig, TimeRange,
};
use treescan_rand::{ReplicaArchive, ReplicaGenerator, ReplicaRecord, REPLICA_SCHEMA};
use treescan_tree::{SimulationBuffer, TreeBuilder};

#[test]
fn recorded_replicas_replay_identically() {
    let dir = tempdir().unwrap();
    let mut builder = TreeBuilder::with_intervals(4);
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_node("left", ["root"]).unwrap();
    builder.add_node("right", ["root"]).unwrap();
    builder.add_counts_at("left", 1, 4, 1.0).unwrap();
    builder.add_counts_at("right", 3, 2, 1.0).unwrap();
    let mut tree = builder.build().unwrap();

    let base = AnalysisConfig {
        scan_type: ScanType::TreeTime,
        model: ModelType::Uniform,
        conditional: ConditionalType::Node,
        temporal: TemporalConfig {
            data_range: TimeRange { start: 1, end: 4 },
            ..TemporalConfig::default()
        },
        ..AnalysisConfig::default()
    };
    tree.prepare(&base).unwrap();

    let record = AnalysisConfig {
        output: OutputConfig {
            write_replicas: Some(dir.path().to_path_buf()),
            ..OutputConfig::default()
        },
        ..base.clone()
    };
    let replay = AnalysisConfig {
        seed: base.seed + 1,
        output: OutputConfig {
            read_replicas: Some(dir.path().to_path_buf()),
            ..OutputConfig::default()
        },
        ..base.clone()
    };

    let writer = ReplicaGenerator::from_config(&record, &tree).unwrap();
    let reader = ReplicaGenerator::from_config(&replay, &tree).unwrap();
    let mut written = SimulationBuffer::new(&tree).unwrap();
    let mut read = SimulationBuffer::new(&tree).unwrap();
    for replica in 0..5 {
        writer.generate(replica, &tree, &mut written).unwrap();
        reader.generate(replica, &tree, &mut read).unwrap();
        assert_eq!(written.nodes(), read.nodes());
    }
    assert!(dir.path().join("replica_000004.json").exists());
}

#[test]
fn missing_replica_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_counts("root", 1, 1.0).unwrap();
    let tree = builder.build().unwrap();
    let archive = ReplicaArchive::open(dir.path()).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    let err = archive.read(0, &tree, &mut buffer).unwrap_err();
    assert_eq!(err.info().code, "json-read");

    let err = ReplicaArchive::open(&dir.path().join("absent")).unwrap_err();
    assert_eq!(err.info().code, "replica-archive-missing");
}

#[test]
fn replica_files_from_another_major_version_are_rejected() {
    let dir = tempdir().unwrap();
    let mut builder = TreeBuilder::new();
    builder.add_node("root", Vec::<String>::new()).unwrap();
    builder.add_counts("root", 2, 1.0).unwrap();
    let tree = builder.build().unwrap();

    let archive = ReplicaArchive::create(dir.path()).unwrap();
    let mut buffer = SimulationBuffer::new(&tree).unwrap();
    buffer.add_cases(tree.lookup("root").unwrap(), 2);
    let mut record = ReplicaRecord::capture(0, &tree, &buffer);
    assert_eq!(record.schema, REPLICA_SCHEMA);
    record.schema = SchemaVersion::new(REPLICA_SCHEMA.major + 1, 0);
    write_json(&archive.path_for(0), &record).unwrap();

    buffer.clear();
    let err = archive.read(0, &tree, &mut buffer).unwrap_err();
    assert!(matches!(err, ScanError::Io(info) if info.code == "replica-schema"));
}
