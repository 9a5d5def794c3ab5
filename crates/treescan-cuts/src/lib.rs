#![deny(missing_docs)]
#![doc = "Candidate cut generation, scoring and the bounded ranked cut list."]

mod cut;
mod enumerate;
mod list;

pub use cut::{Candidate, Cut};
pub use enumerate::{
    allowed_windows, merged_groups, CutEnumerator, ScanOutcome, MAX_COMBINATORIAL_CHILDREN,
};
pub use list::{CutList, CutSink, MaxLlr};
