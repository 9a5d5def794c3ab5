//! Structured error types shared across TreeScan crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`ScanError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (node identifiers, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Causal call path, innermost frame first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
            trace: Vec::new(),
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Appends a frame to the causal trace.
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        if !self.trace.is_empty() {
            write!(f, " | trace: {}", self.trace.join(" <- "))?;
        }
        Ok(())
    }
}

/// Coarse classification of a [`ScanError`] used by completion reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Bad input structure or I/O failure the user can fix.
    Resolvable,
    /// Internal invariant violation.
    Program,
    /// Allocation failure.
    Memory,
}

/// Canonical error type for the TreeScan engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum ScanError {
    /// Invalid tree structure, counts or analysis settings.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// File system and serialization failures.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Broken internal invariant.
    #[error("program error: {0}")]
    Program(ErrorInfo),
    /// Allocation of simulation state failed.
    #[error("memory error: {0}")]
    Memory(ErrorInfo),
    /// Failure raised while evaluating a single replica.
    #[error("replica {index} failed: {source}")]
    Replica {
        /// Zero based replica index of the failing job.
        index: usize,
        /// Underlying failure.
        source: Box<ScanError>,
    },
}

impl ScanError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            ScanError::Configuration(info)
            | ScanError::Io(info)
            | ScanError::Program(info)
            | ScanError::Memory(info) => info,
            ScanError::Replica { source, .. } => source.info(),
        }
    }

    /// Classifies the error for completion reporting and retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Configuration(_) | ScanError::Io(_) => ErrorKind::Resolvable,
            ScanError::Program(_) => ErrorKind::Program,
            ScanError::Memory(_) => ErrorKind::Memory,
            ScanError::Replica { source, .. } => source.kind(),
        }
    }

    /// Returns the replica index when the error originated in a simulation job.
    pub fn replica_index(&self) -> Option<usize> {
        match self {
            ScanError::Replica { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Wraps the error with the replica index that produced it and records the
    /// job in the causal trace. Already wrapped errors are returned unchanged.
    pub fn at_replica(self, index: usize) -> Self {
        if matches!(self, ScanError::Replica { .. }) {
            return self;
        }
        ScanError::Replica {
            index,
            source: Box::new(self.with_frame(format!("replica job {index}"))),
        }
    }

    /// Pushes a frame onto the causal trace of the innermost payload.
    pub fn with_frame(self, frame: impl Into<String>) -> Self {
        match self {
            ScanError::Configuration(info) => ScanError::Configuration(info.with_frame(frame)),
            ScanError::Io(info) => ScanError::Io(info.with_frame(frame)),
            ScanError::Program(info) => ScanError::Program(info.with_frame(frame)),
            ScanError::Memory(info) => ScanError::Memory(info.with_frame(frame)),
            ScanError::Replica { index, source } => ScanError::Replica {
                index,
                source: Box::new(source.with_frame(frame)),
            },
        }
    }
}
