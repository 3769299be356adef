//! Transaction coordination
//!
//! A [`TxManager`] runs a unit of work against a write surface (`Tx`) that
//! exposes the same store facets as the non-transactional store. The work
//! commits when it returns `Ok` and is discarded when it returns `Err` or is
//! dropped before completion.
//!
//! [`with_tx_hooks`] adds a [`TxHooks`] collector. Hooks registered during
//! the work run in registration order once the commit has succeeded; they
//! are discarded on failure. Hook errors are joined and returned, and hooks
//! are not retried, so they should only poke workers whose durable input was
//! written inside the transaction (outbox rows).

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::shared_kernel::{DomainError, Result};

#[async_trait]
pub trait TxManager: Send + Sync {
    /// Scoped write surface handed to the unit of work.
    type Tx: Send + Sync + 'static;

    async fn with_tx<T, F, Fut>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self::Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static;
}

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Ordered collector of post-commit hooks. Cloning shares the collector.
#[derive(Clone, Default)]
pub struct TxHooks {
    hooks: Arc<Mutex<Vec<Hook>>>,
}

impl TxHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after_commit<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.lock().push(Box::new(move || Box::pin(hook())));
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered hook in order, joining their errors.
    pub async fn run(&self) -> Result<()> {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        let mut errors = Vec::new();
        for hook in hooks {
            if let Err(err) = hook().await {
                errors.push(err);
            }
        }
        match DomainError::join(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn discard(&self) {
        self.hooks.lock().clear();
    }
}

impl std::fmt::Debug for TxHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHooks").field("len", &self.len()).finish()
    }
}

/// Run `f` in a transaction and fire its hooks after a successful commit.
pub async fn with_tx_hooks<M, T, F, Fut>(manager: &M, f: F) -> Result<T>
where
    M: TxManager + ?Sized,
    T: Send + 'static,
    F: FnOnce(M::Tx, TxHooks) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let hooks = TxHooks::new();
    let collector = hooks.clone();
    let value = match manager.with_tx(move |tx| f(tx, collector)).await {
        Ok(value) => value,
        Err(err) => {
            hooks.discard();
            return Err(err);
        }
    };
    hooks.run().await?;
    Ok(value)
}

/// Test-mode manager used when no transaction manager is configured: the
/// work runs against a default-constructed write surface, with no
/// atomicity.
pub struct UnconfiguredTxManager<Tx> {
    _tx: PhantomData<fn() -> Tx>,
}

impl<Tx> UnconfiguredTxManager<Tx> {
    pub fn new() -> Self {
        Self { _tx: PhantomData }
    }
}

impl<Tx> Default for UnconfiguredTxManager<Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tx> Clone for UnconfiguredTxManager<Tx> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<Tx> std::fmt::Debug for UnconfiguredTxManager<Tx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UnconfiguredTxManager")
    }
}

#[async_trait]
impl<Tx> TxManager for UnconfiguredTxManager<Tx>
where
    Tx: Default + Send + Sync + 'static,
{
    type Tx = Tx;

    async fn with_tx<T, F, Fut>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self::Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        f(Tx::default()).await
    }
}
