//! The single entry point embedding applications call: sequences in, one
//! [`ResultBundle`] or failure per sequence out.

pub mod options;
pub mod pipeline;
pub mod report;

pub use options::{AnalysisOptions, JobTimeouts};
pub use pipeline::{AnalysisPipeline, PipelineEvent, Stage};
pub use report::{BatchReport, FailureEntry, ItemFailure, ItemOutcome, ResultBundle};
