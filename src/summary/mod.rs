//! Summary and failure taxonomy for shiplane
//!
//! Implements lane_summary.json and the stable exit code ladder.

mod failure;
mod lane_summary;

pub use failure::{ExitCode, ExitCodeAggregator, FailureKind, Status};
pub use lane_summary::{
    ArtifactRecord, LaneSummary, StepSummary, SUMMARY_SCHEMA_ID, SUMMARY_SCHEMA_VERSION,
};
