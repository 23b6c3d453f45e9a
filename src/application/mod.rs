//! Application layer: Use cases and services.
//!
//! Orchestrates the risk engine with the observation and explanation
//! ports.

mod assessment;

pub use assessment::{
    AssessmentReport, AssessmentService, Explanation, ExplanationSource, SkippedRecord,
};
