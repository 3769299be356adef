//! # SQLite snapshot store
//!
//! [`SqliteSnapshotStore`] keeps the working state in an [`InMemoryStore`]
//! and writes the full state as one JSON document to a single-row table
//! after every committed write. Opening the store loads that row back.
//!
//! Writes inside [`SqliteSnapshotStore::with_batch`] only mark the store
//! dirty; the snapshot is written once when the outermost batch ends.
//!
//! A write is applied in memory before its snapshot is written. When the
//! snapshot write fails the call returns [`DomainError::NotPersisted`]: the
//! change is visible, the store stays dirty and the next flush or
//! [`close`](SqliteSnapshotStore::close) retries the snapshot. Callers must
//! not repeat the write.

use async_trait::async_trait;
use chrono::Utc;
use esign_server_domain::{DomainError, Result, TxManager};
use esign_shared::config::DatabaseConfig;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::persistence::memory::facets::impl_store_facets;
use crate::persistence::memory::{InMemoryStore, MemoryTx, StateAccess, StoreState};

const TEMP_DB_FILE: &str = "esign-store.db";

/// Errors raised by the snapshot layer. Surfaced to callers as
/// `INFRASTRUCTURE`.
#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    #[error("Backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("Invalid DSN {dsn}: {reason}")]
    InvalidDsn { dsn: String, reason: String },

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("Temporary database error: {0}")]
    TempDir(#[from] std::io::Error),

    #[error("snapshot store closed")]
    Closed,
}

impl From<SnapshotStoreError> for DomainError {
    fn from(err: SnapshotStoreError) -> Self {
        DomainError::infrastructure(err.to_string())
    }
}

struct Inner {
    memory: InMemoryStore,
    pool: SqlitePool,
    dirty: AtomicBool,
    batch_depth: AtomicUsize,
    closed: AtomicBool,
    persist_lock: tokio::sync::Mutex<()>,
    /// Keeps the temporary database alive when no DSN was configured.
    _temp_dir: Option<tempfile::TempDir>,
}

/// Durable store. Clones share the same state and connection pool.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    inner: Arc<Inner>,
}

impl SqliteSnapshotStore {
    /// Open (or create) the database at `dsn` and load its snapshot.
    pub async fn open(dsn: &str, busy_timeout_ms: u64) -> Result<Self> {
        Ok(Self::connect(dsn, busy_timeout_ms, None).await?)
    }

    /// Open the configured database, or a process-scoped temporary file
    /// when no DSN is set.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        match config.dsn.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(dsn) => Self::open(dsn, config.busy_timeout_ms).await,
            None => {
                let dir = tempfile::tempdir().map_err(SnapshotStoreError::from)?;
                let dsn = format!("sqlite://{}", dir.path().join(TEMP_DB_FILE).display());
                info!(dsn = %dsn, "No database DSN configured, using a temporary file");
                Ok(Self::connect(&dsn, config.busy_timeout_ms, Some(dir)).await?)
            }
        }
    }

    /// In-memory SQLite database, useful for tests.
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::connect("sqlite::memory:", 5_000, None).await?)
    }

    async fn connect(
        dsn: &str,
        busy_timeout_ms: u64,
        temp_dir: Option<tempfile::TempDir>,
    ) -> std::result::Result<Self, SnapshotStoreError> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| SnapshotStoreError::InvalidDsn {
                dsn: dsn.to_string(),
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(busy_timeout_ms));

        // One connection: every snapshot write replaces the same row.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS esign_store_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let raw: Option<String> =
            sqlx::query_scalar("SELECT snapshot_json FROM esign_store_snapshot WHERE id = 1")
                .fetch_optional(&pool)
                .await?;
        let state = match raw {
            Some(raw) => StoreState::from_json(&raw)
                .map_err(|e| SnapshotStoreError::Corrupt(e.to_string()))?,
            None => StoreState::default(),
        };
        debug!(
            agreements = state.agreements.len(),
            outbox_messages = state.outbox_messages.len(),
            "Loaded store snapshot"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                memory: InMemoryStore::from_state(state),
                pool,
                dirty: AtomicBool::new(false),
                batch_depth: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                persist_lock: tokio::sync::Mutex::new(()),
                _temp_dir: temp_dir,
            }),
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> std::result::Result<(), SnapshotStoreError> {
        if self.is_closed() {
            Err(SnapshotStoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Write the snapshot if anything changed since the last write.
    pub async fn flush(&self) -> Result<()> {
        let _persist = self.inner.persist_lock.lock().await;
        if !self.inner.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.write_snapshot().await {
            self.inner.dirty.store(true, Ordering::SeqCst);
            error!(error = %err, "Failed to persist store snapshot");
            return Err(err);
        }
        Ok(())
    }

    async fn write_snapshot(&self) -> Result<()> {
        let json = self.inner.memory.snapshot().to_json()?;
        sqlx::query(
            r#"
            INSERT INTO esign_store_snapshot (id, snapshot_json, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.inner.pool)
        .await
        .map_err(SnapshotStoreError::from)?;
        Ok(())
    }

    async fn after_write(&self) -> Result<()> {
        self.inner.dirty.store(true, Ordering::SeqCst);
        if self.inner.batch_depth.load(Ordering::SeqCst) == 0 {
            self.flush().await.map_err(not_persisted)?;
        }
        Ok(())
    }

    /// Run `f` with snapshot writes deferred until the outermost batch
    /// returns. The snapshot is flushed even when `f` fails, since the
    /// individual writes inside it have already been applied.
    pub async fn with_batch<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(SqliteSnapshotStore) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_open()?;
        self.inner.batch_depth.fetch_add(1, Ordering::SeqCst);
        let outcome = f(self.clone()).await;
        let remaining = self.inner.batch_depth.fetch_sub(1, Ordering::SeqCst) - 1;
        let flushed = if remaining == 0 {
            self.flush().await.map_err(not_persisted)
        } else {
            Ok(())
        };
        match (outcome, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(inner), Err(flush)) => Err(DomainError::Joined(vec![inner, flush])),
        }
    }

    /// Flush and release the connection pool. Later writes fail.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let flushed = self.flush().await;
        self.inner.pool.close().await;
        info!("Snapshot store closed");
        flushed
    }
}

fn not_persisted(err: DomainError) -> DomainError {
    DomainError::NotPersisted {
        message: err.to_string(),
    }
}

impl std::fmt::Debug for SqliteSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSnapshotStore")
            .field("dirty", &self.is_dirty())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl StateAccess for SqliteSnapshotStore {
    fn read_state<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreState) -> Result<R>,
    {
        self.inner.memory.read_state(f)
    }

    async fn write_state<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<R> + Send + 'static,
    {
        self.ensure_open()?;
        let value = self.inner.memory.write_state(f).await?;
        self.after_write().await?;
        Ok(value)
    }
}

#[async_trait]
impl TxManager for SqliteSnapshotStore {
    type Tx = MemoryTx;

    async fn with_tx<T, F, Fut>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self::Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.ensure_open()?;
        let value = self.inner.memory.with_tx(f).await?;
        self.after_write().await?;
        Ok(value)
    }
}

impl_store_facets!(SqliteSnapshotStore);

#[cfg(test)]
mod tests {
    use super::*;
    use esign_server_domain::Scope;
    use esign_server_domain::agreements::{AgreementPatch, AgreementRepository, NewAgreement};
    use esign_server_domain::documents::{DocumentRepository, NewDocument};

    fn scope() -> Scope {
        Scope::new("tenant-1", "org-1")
    }

    fn document() -> NewDocument {
        NewDocument {
            title: "NDA".to_string(),
            source_object_key: "documents/nda.pdf".to_string(),
            source_sha256: "9f86d081".to_string(),
            size_bytes: 100,
            page_count: 1,
            ..Default::default()
        }
    }

    fn dsn(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}", dir.path().join("store.db").display())
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
        let doc = store.create_document(&scope(), document()).await.unwrap();
        let agreement = store
            .create_draft(
                &scope(),
                NewAgreement {
                    document_id: doc.id.clone(),
                    title: "Mutual NDA".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!store.is_dirty());
        store.close().await.unwrap();

        let reopened = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
        let loaded = reopened.get_agreement(&scope(), &agreement.id).await.unwrap();
        assert_eq!(loaded, agreement);
    }

    #[tokio::test]
    async fn test_writes_after_close_fail() {
        let store = SqliteSnapshotStore::in_memory().await.unwrap();
        store.close().await.unwrap();
        let err = store.create_document(&scope(), document()).await.unwrap_err();
        assert_eq!(
            err,
            DomainError::Infrastructure {
                message: "snapshot store closed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_failed_snapshot_reports_applied_write() {
        let store = SqliteSnapshotStore::in_memory().await.unwrap();
        store.inner.pool.close().await;

        let err = store.create_document(&scope(), document()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotPersisted { .. }));
        assert!(err.was_applied());
        assert!(store.is_dirty());

        let documents = store
            .list_documents(&scope(), esign_server_domain::ListOptions::default())
            .await
            .unwrap();
        assert_eq!(documents.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_defers_snapshot_until_end() {
        let store = SqliteSnapshotStore::in_memory().await.unwrap();
        let count = store
            .with_batch(|batch| async move {
                batch.create_document(&scope(), document()).await?;
                batch.create_document(&scope(), document()).await?;
                assert!(batch.is_dirty());
                Ok(2)
            })
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
        let doc = store.create_document(&scope(), document()).await.unwrap();
        let agreement = store
            .create_draft(
                &scope(),
                NewAgreement {
                    document_id: doc.id,
                    title: "Original".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let agreement_id = agreement.id.clone();
        let result: Result<()> = store
            .with_tx(move |tx| async move {
                tx.update_draft(
                    &scope(),
                    &agreement_id,
                    AgreementPatch {
                        title: Some("Changed".to_string()),
                        ..Default::default()
                    },
                    0,
                )
                .await?;
                Err(DomainError::infrastructure("abort"))
            })
            .await;
        assert!(result.is_err());
        store.close().await.unwrap();

        let reopened = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
        let loaded = reopened.get_agreement(&scope(), &agreement.id).await.unwrap();
        assert_eq!(loaded.title, "Original");
    }

    #[tokio::test]
    async fn test_from_config_without_dsn_uses_temp_file() {
        let store = SqliteSnapshotStore::from_config(&DatabaseConfig::default())
            .await
            .unwrap();
        store.create_document(&scope(), document()).await.unwrap();
        assert!(!store.is_dirty());
    }
}
