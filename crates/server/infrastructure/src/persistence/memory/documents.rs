use chrono::{DateTime, Utc};
use esign_server_domain::documents::{Document, DocumentSourceType, NewDocument};
use esign_server_domain::{
    DomainError, ListOptions, Result, Scope, normalize_id, require_text, resolve_time, window,
};

use super::state::{StoreState, ensure_free, lookup};

impl StoreState {
    pub(crate) fn document(&self, scope: &Scope, id: &str) -> Result<&Document> {
        lookup(&self.documents, scope, "document", id)
    }

    pub(crate) fn create_document(
        &mut self,
        scope: &Scope,
        input: NewDocument,
        now: DateTime<Utc>,
    ) -> Result<Document> {
        let title = require_text("document", "title", &input.title)?;
        let source_object_key =
            require_text("document", "source_object_key", &input.source_object_key)?;
        let source_sha256 = require_text("document", "source_sha256", &input.source_sha256)?;
        if input.size_bytes < 0 {
            return Err(DomainError::missing("document", "size_bytes", "must be >= 0"));
        }
        if input.page_count < 1 {
            return Err(DomainError::missing("document", "page_count", "must be >= 1"));
        }
        let google = match (input.source_type, input.google) {
            (DocumentSourceType::GoogleDrive, Some(meta)) => {
                if meta.google_file_id.trim().is_empty() {
                    return Err(DomainError::missing(
                        "document",
                        "google_file_id",
                        "required for google_drive documents",
                    ));
                }
                Some(meta)
            }
            (DocumentSourceType::GoogleDrive, None) => {
                return Err(DomainError::missing(
                    "document",
                    "google",
                    "required for google_drive documents",
                ));
            }
            (DocumentSourceType::Upload, _) => None,
        };

        let id = normalize_id(input.id.as_deref());
        ensure_free(&self.documents, scope, "document", &id)?;
        let created_at = resolve_time(input.created_at, now);
        let document = Document {
            id: id.clone(),
            scope: scope.clone(),
            title,
            source_object_key,
            source_sha256,
            size_bytes: input.size_bytes,
            page_count: input.page_count,
            source_type: input.source_type,
            google,
            created_at,
            updated_at: created_at,
        };
        self.documents.insert(id, document.clone());
        Ok(document)
    }

    pub(crate) fn list_documents(&self, scope: &Scope, options: &ListOptions) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .documents
            .values()
            .filter(|d| &d.scope == scope)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if options.sort_desc {
            documents.reverse();
        }
        window(documents, options)
    }
}
