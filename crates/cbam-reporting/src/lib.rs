//! cbam-reporting: periodic aggregation
//!
//! Builds quarterly reports from eligible entries, records every exclusion
//! with its reasons, and renders the submission payload.

pub mod aggregator;
pub mod export;

pub use aggregator::ReportAggregator;
pub use export::to_submission_json;
