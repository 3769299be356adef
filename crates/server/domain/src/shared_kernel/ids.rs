use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DomainError, Result};

/// Mint a new opaque identifier. Version 7 UUIDs sort by creation time,
/// so id-ordered scans follow insertion order.
pub fn mint_id() -> String {
    Uuid::now_v7().to_string()
}

/// Trim a caller supplied id, minting one when absent or blank.
pub fn normalize_id(id: Option<&str>) -> String {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => mint_id(),
    }
}

/// Trimmed non-empty text or `MISSING_REQUIRED_FIELDS`.
pub fn require_text(entity: &str, field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::missing(entity, field, "required"));
    }
    Ok(value.to_string())
}

/// Optional timestamps fall back to `now`; the Unix epoch counts as unset.
pub fn resolve_time(value: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match value {
        Some(t) if t.timestamp() != 0 || t.timestamp_subsec_nanos() != 0 => t,
        _ => now,
    }
}
