use serde::{Deserialize, Serialize};

/// Dense arena index of a node inside a tree model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(u32);

impl NodeIndex {
    /// Creates an index from its position in the node arena.
    pub fn new(position: usize) -> Self {
        Self(position as u32)
    }

    /// Returns the position of the node in the arena.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Inclusive window of time-interval indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// First interval inside the window.
    pub start: usize,
    /// Last interval inside the window.
    pub end: usize,
}

impl TimeWindow {
    /// Creates a new inclusive window.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of intervals covered by the window.
    pub fn length(&self) -> usize {
        self.end + 1 - self.start
    }
}
