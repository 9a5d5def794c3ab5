//! Report and cut-table writers for `treescan run`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use treescan_core::errors::{ErrorInfo, ScanError};
use treescan_core::serde::write_json;
use treescan_engine::{AnalysisReport, ReportedCut};

/// File names written into the output directory.
pub const REPORT_FILE: &str = "analysis_report.json";
/// Ranked cuts, one CSV row each.
pub const CUTS_FILE: &str = "cuts.csv";

#[derive(Debug, Serialize)]
struct CutRow<'a> {
    report_order: usize,
    node_id: &'a str,
    merged: String,
    cases: i64,
    expected: f64,
    relative_risk: Option<f64>,
    excess_cases: f64,
    llr: f64,
    rank: u64,
    p_value: Option<f64>,
    window_start: Option<i64>,
    window_end: Option<i64>,
}

impl<'a> From<&'a ReportedCut> for CutRow<'a> {
    fn from(cut: &'a ReportedCut) -> Self {
        Self {
            report_order: cut.report_order,
            node_id: &cut.node_id,
            merged: cut.merged.join(";"),
            cases: cut.cases,
            expected: cut.expected,
            relative_risk: cut.relative_risk,
            excess_cases: cut.excess_cases,
            llr: cut.llr,
            rank: cut.rank,
            p_value: cut.p_value,
            window_start: cut.window.map(|window| window.start),
            window_end: cut.window.map(|window| window.end),
        }
    }
}

fn csv_error(err: impl ToString, path: &Path) -> ScanError {
    ScanError::Io(ErrorInfo::new("cuts-csv", err.to_string()).with_context("path", path.display().to_string()))
}

/// Writes the ranked cuts as CSV.
pub fn write_cuts_csv(path: &Path, cuts: &[ReportedCut]) -> Result<(), ScanError> {
    let mut writer = csv::Writer::from_path(path).map_err(|err| csv_error(err, path))?;
    for cut in cuts {
        writer
            .serialize(CutRow::from(cut))
            .map_err(|err| csv_error(err, path))?;
    }
    writer.flush().map_err(|err| csv_error(err, path))
}

/// Writes the JSON report and the cut table into `out`, returning the
/// paths written.
pub fn write_outputs(out: &Path, report: &AnalysisReport) -> Result<Vec<PathBuf>, ScanError> {
    fs::create_dir_all(out).map_err(|err| {
        ScanError::Io(ErrorInfo::new("out-mkdir", err.to_string()).with_context("path", out.display().to_string()))
    })?;
    let report_path = out.join(REPORT_FILE);
    write_json(&report_path, report)?;
    let cuts_path = out.join(CUTS_FILE);
    write_cuts_csv(&cuts_path, &report.cuts)?;
    Ok(vec![report_path, cuts_path])
}
