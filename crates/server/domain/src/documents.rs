//! Documents: immutable source PDF metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared_kernel::{ListOptions, Paginated, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSourceType {
    #[default]
    Upload,
    GoogleDrive,
}

impl DocumentSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSourceType::Upload => "upload",
            DocumentSourceType::GoogleDrive => "google_drive",
        }
    }
}

impl fmt::Display for DocumentSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a document exported from Google Drive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSourceMetadata {
    pub google_file_id: String,
    pub google_doc_url: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
    pub exported_by_user_id: String,
    pub mime_type: String,
    pub ingestion_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub scope: Scope,
    pub title: String,
    pub source_object_key: String,
    pub source_sha256: String,
    pub size_bytes: i64,
    pub page_count: i32,
    pub source_type: DocumentSourceType,
    #[serde(default)]
    pub google: Option<GoogleSourceMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for Document {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Paginated for Document {
    fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub id: Option<String>,
    pub title: String,
    pub source_object_key: String,
    pub source_sha256: String,
    pub size_bytes: i64,
    pub page_count: i32,
    pub source_type: DocumentSourceType,
    pub google: Option<GoogleSourceMetadata>,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_document(&self, scope: &Scope, input: NewDocument) -> Result<Document>;

    async fn get_document(&self, scope: &Scope, id: &str) -> Result<Document>;

    /// Ordered by `created_at`, then id.
    async fn list_documents(&self, scope: &Scope, options: ListOptions) -> Result<Vec<Document>>;
}
