//! Dedupe-keyed execution tracking: job runs, Google import runs and email
//! delivery logs. All three share the attempt accounting in [`attempts`].

pub mod attempts;
pub mod email_log;
pub mod google_import;
pub mod job_run;

pub use attempts::*;
pub use email_log::*;
pub use google_import::*;
pub use job_run::*;
