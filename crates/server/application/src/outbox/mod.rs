//! Outbox dispatch: the claim/publish/settle batch and the background relay
//! that drives it.

pub mod dispatcher;
pub mod relay;

pub use dispatcher::{DispatchRequest, DispatchResult, OutboxDispatcher};
pub use relay::{OutboxRelay, RelayConfig, RelayHandle};
