use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle of a simulation run. Leaves `Normal` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum SourceState {
    /// Jobs are being handed out.
    Normal = 0,
    /// A job failed; no further jobs are handed out.
    ExceptionCaught = 1,
    /// The run was canceled by the caller.
    Canceled = 2,
    /// The sequential early-termination threshold was reached.
    AutoAborted = 3,
}

impl SourceState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::ExceptionCaught,
            2 => Self::Canceled,
            3 => Self::AutoAborted,
            _ => Self::Normal,
        }
    }
}

/// Hands out replica indices to workers without locking.
#[derive(Debug)]
pub struct JobSource {
    next: AtomicUsize,
    total: usize,
    state: AtomicU8,
}

impl JobSource {
    /// Creates a source for `total` replicas.
    pub fn new(total: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            total,
            state: AtomicU8::new(SourceState::Normal as u8),
        }
    }

    /// Claims the next replica index, or `None` once every index is claimed
    /// or the run has left `Normal`.
    pub fn acquire(&self) -> Option<usize> {
        if self.state() != SourceState::Normal {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.total).then_some(index)
    }

    /// Current state.
    pub fn state(&self) -> SourceState {
        SourceState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Moves out of `Normal`. Returns false if another transition won.
    pub fn transition(&self, to: SourceState) -> bool {
        self.state
            .compare_exchange(
                SourceState::Normal as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Number of replicas requested.
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
