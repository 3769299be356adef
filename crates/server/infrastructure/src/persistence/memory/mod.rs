//! In-memory store
//!
//! The whole store is one [`StoreState`] behind a `parking_lot::RwLock`.
//! Writers, including transactions, are serialized by an async writer gate.
//! A transaction clones the committed state into a [`MemoryTx`], runs the
//! unit of work against that copy and swaps it in only when the work
//! returns `Ok`.
//!
//! Entity operations validate before they mutate, so a failed write leaves
//! the state untouched.

mod agreements;
mod artifacts;
mod audit;
mod credentials;
mod documents;
pub(crate) mod facets;
mod fields;
mod jobs;
mod outbox;
mod participants;
mod signing;
mod state;

#[cfg(test)]
mod tests;

pub use state::StoreState;

use async_trait::async_trait;
use esign_server_domain::{DomainError, Result, TxManager};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use facets::impl_store_facets;

/// Read and write access to a [`StoreState`]. Every store facet is
/// implemented on top of these two methods.
#[async_trait]
pub trait StateAccess: Send + Sync {
    fn read_state<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreState) -> Result<R>;

    async fn write_state<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<R> + Send + 'static;
}

#[derive(Default)]
struct Shared {
    state: RwLock<StoreState>,
    writer: tokio::sync::Mutex<()>,
}

/// Thread-safe in-memory store. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: RwLock::new(state),
                writer: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> StoreState {
        self.inner.state.read().clone()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("InMemoryStore")
            .field("agreements", &state.agreements.len())
            .field("outbox_messages", &state.outbox_messages.len())
            .finish()
    }
}

#[async_trait]
impl StateAccess for InMemoryStore {
    fn read_state<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreState) -> Result<R>,
    {
        let state = self.inner.state.read();
        f(&*state)
    }

    async fn write_state<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<R> + Send + 'static,
    {
        let _writer = self.inner.writer.lock().await;
        let mut state = self.inner.state.write();
        f(&mut *state)
    }
}

#[async_trait]
impl TxManager for InMemoryStore {
    type Tx = MemoryTx;

    async fn with_tx<T, F, Fut>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self::Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let _writer = self.inner.writer.lock().await;
        let tx = MemoryTx::begin(self.snapshot());
        let outcome = f(tx.clone()).await;
        let working = tx.finish();
        match outcome {
            Ok(value) => {
                *self.inner.state.write() = working?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }
}

/// Write surface of one in-memory transaction. Clones share the working
/// copy; once the transaction completes every call fails.
#[derive(Clone)]
pub struct MemoryTx {
    working: Arc<Mutex<Option<StoreState>>>,
}

impl MemoryTx {
    pub(crate) fn begin(state: StoreState) -> Self {
        Self {
            working: Arc::new(Mutex::new(Some(state))),
        }
    }

    /// Take the working copy, closing the transaction.
    pub(crate) fn finish(&self) -> Result<StoreState> {
        self.working.lock().take().ok_or_else(closed)
    }

    pub fn is_open(&self) -> bool {
        self.working.lock().is_some()
    }
}

/// A detached transaction over an empty state, used when no transaction
/// manager is configured.
impl Default for MemoryTx {
    fn default() -> Self {
        Self::begin(StoreState::default())
    }
}

impl std::fmt::Debug for MemoryTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTx")
            .field("open", &self.is_open())
            .finish()
    }
}

fn closed() -> DomainError {
    DomainError::infrastructure("transaction already completed")
}

#[async_trait]
impl StateAccess for MemoryTx {
    fn read_state<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreState) -> Result<R>,
    {
        match self.working.lock().as_ref() {
            Some(state) => f(state),
            None => Err(closed()),
        }
    }

    async fn write_state<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<R> + Send + 'static,
    {
        match self.working.lock().as_mut() {
            Some(state) => f(state),
            None => Err(closed()),
        }
    }
}

impl_store_facets!(InMemoryStore);
impl_store_facets!(MemoryTx);
