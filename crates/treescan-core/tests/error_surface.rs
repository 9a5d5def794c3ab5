use treescan_core::errors::{ErrorInfo, ErrorKind, ScanError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("node", "A01")
        .with_context("reason", "example")
}

#[test]
fn configuration_error_is_resolvable() {
    let err = ScanError::Configuration(sample_info("self-ancestor", "node is its own ancestor"));
    assert_eq!(err.info().code, "self-ancestor");
    assert_eq!(err.kind(), ErrorKind::Resolvable);
    assert!(err.info().context.contains_key("node"));
}

#[test]
fn io_error_is_resolvable() {
    let err = ScanError::Io(sample_info("json-read", "missing file"));
    assert_eq!(err.kind(), ErrorKind::Resolvable);
}

#[test]
fn program_and_memory_errors_classify() {
    let program = ScanError::Program(sample_info("case-total", "totals diverged"));
    let memory = ScanError::Memory(sample_info("buffer-alloc", "allocation failed"));
    assert_eq!(program.kind(), ErrorKind::Program);
    assert_eq!(memory.kind(), ErrorKind::Memory);
}

#[test]
fn replica_wrapping_keeps_index_and_trace() {
    let err = ScanError::Program(ErrorInfo::new("case-total", "totals diverged")).at_replica(17);
    assert_eq!(err.replica_index(), Some(17));
    assert_eq!(err.kind(), ErrorKind::Program);
    assert!(err.info().trace.iter().any(|frame| frame.contains("17")));
    assert!(err.to_string().contains("replica 17"));

    let rewrapped = err.clone().at_replica(3);
    assert_eq!(rewrapped.replica_index(), Some(17));
}

#[test]
fn display_includes_context_hint_and_trace() {
    let info = ErrorInfo::new("E001", "problem")
        .with_context("node", "1")
        .with_hint("fix it")
        .with_frame("propagate");
    let text = ScanError::Configuration(info).to_string();
    assert!(text.contains("node=1"));
    assert!(text.contains("hint: fix it"));
    assert!(text.contains("trace: propagate"));
}

#[test]
fn errors_round_trip_json() {
    let err = ScanError::Memory(sample_info("buffer-alloc", "allocation failed")).at_replica(4);
    let json = serde_json::to_string(&err).expect("serialize");
    let decoded: ScanError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, err);
}
