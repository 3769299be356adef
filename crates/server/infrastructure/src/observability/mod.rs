//! Observability
//!
//! Tracing subscriber setup and correlation-id propagation through outbox
//! message headers.

pub mod correlation;
pub mod tracing;

pub use correlation::{CORRELATION_ID_HEADER, correlation_id_of, propagate_correlation};
pub use self::tracing::{TracingResult, init_tracing};
