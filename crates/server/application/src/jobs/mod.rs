//! Dedupe-keyed job execution on top of the job-run store facet.

pub mod runner;

pub use runner::{BackoffPolicy, JobOutcome, JobRunner};
