//! List options and opaque keyset cursors.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::{DomainError, Result};

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 200;

/// `{limit, offset | cursor, sort_desc}`. A cursor, when present, wins over
/// the offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub cursor: Option<String>,
    pub sort_desc: bool,
}

impl ListOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn descending(mut self) -> Self {
        self.sort_desc = true;
        self
    }

    /// Zero selects the default; anything above the maximum is clamped.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        }
    }
}

/// One page of a cursor-paginated listing. `next_cursor` is `None` on the
/// last page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Deterministic list ordering key: timestamp, then id as tiebreaker.
pub trait Paginated {
    fn sort_key(&self) -> (DateTime<Utc>, &str);
}

fn compare_keys(a: (DateTime<Utc>, &str), b: (DateTime<Utc>, &str)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1))
}

fn encode_cursor(key: (DateTime<Utc>, &str)) -> String {
    let raw = format!(
        "{}.{}:{}",
        key.0.timestamp(),
        key.0.timestamp_subsec_nanos(),
        key.1
    );
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, String)> {
    let malformed = || DomainError::missing("page", "cursor", "malformed cursor");
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim().as_bytes())
        .map_err(|_| malformed())?;
    let raw = String::from_utf8(bytes).map_err(|_| malformed())?;
    let (stamp, id) = raw.split_once(':').ok_or_else(malformed)?;
    let (secs, nanos) = stamp.split_once('.').ok_or_else(malformed)?;
    let secs: i64 = secs.parse().map_err(|_| malformed())?;
    let nanos: u32 = nanos.parse().map_err(|_| malformed())?;
    let at = DateTime::from_timestamp(secs, nanos).ok_or_else(malformed)?;
    Ok((at, id.to_string()))
}

/// Sort `items` by their key and cut one page. Looks one item ahead so the
/// last page never carries a cursor.
pub fn paginate<'a, T, I>(items: I, options: &ListOptions) -> Result<Page<T>>
where
    T: Paginated + Clone + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut sorted: Vec<&T> = items.into_iter().collect();
    sorted.sort_by(|a, b| {
        let ord = compare_keys(a.sort_key(), b.sort_key());
        if options.sort_desc { ord.reverse() } else { ord }
    });

    let limit = options.effective_limit();
    let remaining: Vec<&T> = match &options.cursor {
        Some(cursor) => {
            let (at, id) = decode_cursor(cursor)?;
            sorted
                .into_iter()
                .filter(|item| {
                    let ord = compare_keys(item.sort_key(), (at, id.as_str()));
                    if options.sort_desc {
                        ord == Ordering::Less
                    } else {
                        ord == Ordering::Greater
                    }
                })
                .collect()
        }
        None => sorted.into_iter().skip(options.offset).collect(),
    };

    let has_more = remaining.len() > limit;
    let items: Vec<T> = remaining.into_iter().take(limit).cloned().collect();
    let next_cursor = if has_more {
        items.last().map(|last| encode_cursor(last.sort_key()))
    } else {
        None
    };
    Ok(Page { items, next_cursor })
}

/// Offset/limit window for non-cursor listings; a zero limit returns
/// everything after the offset.
pub fn window<T>(items: Vec<T>, options: &ListOptions) -> Vec<T> {
    let iter = items.into_iter().skip(options.offset);
    match options.limit {
        0 => iter.collect(),
        n => iter.take(n.min(MAX_PAGE_LIMIT)).collect(),
    }
}
