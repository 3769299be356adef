// E-sign persistence core - Application Layer
// Services that sit on top of the store facets:
// - outbox: claim/publish/settle dispatcher and the background relay
// - jobs: dedupe-keyed job runner with exponential backoff
// - signing: signing-token issue, rotate, revoke and validate
// - storage: object-key and encryption admission for object writes
// - retention: per-scope retention sweep

pub mod jobs;
pub mod outbox;
pub mod retention;
pub mod signing;
pub mod storage;

pub use jobs::{BackoffPolicy, JobOutcome, JobRunner};
pub use outbox::{DispatchRequest, DispatchResult, OutboxDispatcher, OutboxRelay, RelayHandle};
pub use retention::{RetentionSweep, SweepReport};
pub use signing::{EntropySource, IssuedToken, OsEntropy, SigningTokenService, hash_token};
pub use storage::ObjectWriteGate;
