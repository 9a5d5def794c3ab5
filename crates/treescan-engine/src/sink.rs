use std::fs::{self, File};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use serde::Serialize;
use treescan_core::errors::{ErrorInfo, ScanError};

/// Receives each replica's maximum LLR in replica index order.
pub trait LlrSink {
    /// Records one replica.
    fn record(&mut self, replica: usize, llr: f64) -> Result<(), ScanError>;

    /// Flushes buffered output.
    fn finish(&mut self) -> Result<(), ScanError> {
        Ok(())
    }
}

impl LlrSink for Vec<(usize, f64)> {
    fn record(&mut self, replica: usize, llr: f64) -> Result<(), ScanError> {
        self.push((replica, llr));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct LlrRow {
    replica: usize,
    llr: f64,
}

fn wrap_csv(code: &str, err: impl ToString, path: &Path) -> ScanError {
    ScanError::Io(ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()))
}

/// CSV file with one `replica,llr` row per replica. Replicas are numbered
/// from 1 in the file.
#[derive(Debug)]
pub struct CsvLlrSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLlrSink {
    /// Creates (or truncates) the file and writes the header.
    pub fn create(path: &Path) -> Result<Self, ScanError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| wrap_csv("llr-mkdir", err, parent))?;
        }
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|err| wrap_csv("llr-create", err, path))?;
        writer
            .write_record(["replica", "llr"])
            .map_err(|err| wrap_csv("llr-write", err, path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }
}

impl LlrSink for CsvLlrSink {
    fn record(&mut self, replica: usize, llr: f64) -> Result<(), ScanError> {
        self.writer
            .serialize(LlrRow {
                replica: replica + 1,
                llr,
            })
            .map_err(|err| wrap_csv("llr-write", err, &self.path))
    }

    fn finish(&mut self) -> Result<(), ScanError> {
        self.writer.flush().map_err(|err| wrap_csv("llr-flush", err, &self.path))
    }
}
