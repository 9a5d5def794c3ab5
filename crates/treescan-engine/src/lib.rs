#![deny(missing_docs)]
#![doc = "Parallel replica scheduling, sequential looks and the end-to-end analysis driver."]

mod analysis;
mod critical;
mod job;
mod reducer;
mod report;
mod scheduler;
mod sequential;
mod sink;

pub use analysis::run_analysis;
pub use critical::{critical_value, CriticalValue, CriticalValues, PERCENTILES};
pub use job::{CancelToken, JobSource, SourceState};
pub use reducer::{ReducerSummary, ReplicaOutcome, ReplicaReducer};
pub use report::{AnalysisReport, CompletionStatus, ReportedCut, ReportedWindow, REPORT_SCHEMA};
pub use scheduler::{run_replicas, SimulationPlan};
pub use sequential::{LookRecord, SequentialStatistic};
pub use sink::{CsvLlrSink, LlrSink};
