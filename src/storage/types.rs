//! Bucket data contracts: object metadata persisted in the KV store and the
//! read-only `FileRecord` view handed to the query engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_UPLOADER: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectMeta {
    pub id: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub version: u64,
    /// Epoch milliseconds, UTC.
    pub created_at: i64,
    /// Epoch milliseconds, UTC.
    pub last_modified: i64,
    pub content_type: Option<String>,
    /// User metadata attached at upload time, stored as given.
    pub uploader: Option<String>,
    pub deleted: bool,
}

impl ObjectMeta {
    pub fn last_modified_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.last_modified).unwrap_or_default()
    }

    pub fn uploader_or_unknown(&self) -> &str {
        match self.uploader.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u,
            _ => UNKNOWN_UPLOADER,
        }
    }
}

/// One file as seen by a single query invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Lowercased; never empty.
    pub uploader: String,
}

impl FileRecord {
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>, uploader: Option<&str>) -> Self {
        let uploader = match uploader.map(str::trim) {
            Some(u) if !u.is_empty() => u.to_lowercase(),
            _ => UNKNOWN_UPLOADER.to_string(),
        };
        Self { key: key.into(), size, last_modified, uploader }
    }

    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self::new(meta.key.clone(), meta.size, meta.last_modified_utc(), meta.uploader.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploader_defaults_and_lowercases() {
        let ts = Utc::now();
        assert_eq!(FileRecord::new("a", 1, ts, None).uploader, "unknown");
        assert_eq!(FileRecord::new("a", 1, ts, Some("  ")).uploader, "unknown");
        assert_eq!(FileRecord::new("a", 1, ts, Some(" Alice ")).uploader, "alice");
    }
}
