// E-sign persistence core - Domain Layer
// Bounded contexts:
// - shared_kernel: scope, ids, pagination and the coded error taxonomy
// - documents / agreements: lifecycle root, participants, fields, artifacts
// - audit: append-only trail
// - signing: hash-only signing tokens
// - jobs: job runs, Google import runs, email logs
// - credentials: encrypted integration credentials
// - outbox: transactional outbox model
// - transaction: unit-of-work abstraction and post-commit hooks
// - policy: retention/privacy and storage admission

pub mod shared_kernel;

pub mod agreements;
pub mod audit;
pub mod credentials;
pub mod documents;
pub mod jobs;
pub mod outbox;
pub mod policy;
pub mod signing;
pub mod store;
pub mod transaction;

pub use shared_kernel::*;
pub use store::{EsignStore, TransactionalStore};
pub use transaction::{TxHooks, TxManager, UnconfiguredTxManager, with_tx_hooks};
