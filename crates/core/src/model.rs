//! Data model shared by the storage adapter, transfer engine and TUI.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Maximum key length accepted from the remote store (S3's own limit).
pub const MAX_KEY_BYTES: usize = 1024;

/// An object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key, at most [`MAX_KEY_BYTES`] bytes.
    pub key: String,
    /// Exact size in bytes.
    pub size: u64,
    /// Last-modified timestamp, if reported by the store.
    pub last_modified: Option<DateTime<Utc>>,
    /// Etag with any surrounding quotes stripped.
    pub etag: String,
    /// Storage class, when the store reports one.
    pub storage_class: Option<String>,
}

impl ObjectInfo {
    /// Strip surrounding double quotes from a raw etag, the one place etag
    /// normalisation happens for objects returned by listing calls.
    pub fn normalize_etag(raw: &str) -> String {
        raw.trim_matches('"').to_string()
    }
}

/// A bucket, with a region that may still need resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub region: Region,
}

/// An AWS-style region string. Empty means "not yet resolved".
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Region(String);

impl Region {
    pub fn unresolved() -> Self {
        Region(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Region(value.into())
    }

    pub fn is_resolved(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_resolved() {
            f.write_str(&self.0)
        } else {
            f.write_str("(unresolved)")
        }
    }
}

/// Metadata returned by `HeadObject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub user_metadata: BTreeMap<String, String>,
}

/// One completed part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number, 1..=10000.
    pub part_number: u32,
    /// Etag, unquoted.
    pub etag: String,
    /// Size in bytes of this part.
    pub size: u64,
}

/// An in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
}

/// Smallest part number accepted by the remote store.
pub const MIN_PART_NUMBER: u32 = 1;
/// Largest part number accepted by the remote store.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Validate that a set of completed parts is contiguous, gap-free, and sorted
/// ascending by part number, per the invariant in the data model.
pub fn validate_completed_parts(parts: &[CompletedPart]) -> Result<(), String> {
    if parts.is_empty() {
        return Ok(());
    }
    if parts.len() as u64 > MAX_PART_NUMBER as u64 {
        return Err(format!(
            "too many parts: {} exceeds the {} part maximum",
            parts.len(),
            MAX_PART_NUMBER
        ));
    }
    for (idx, part) in parts.iter().enumerate() {
        let expected = idx as u32 + MIN_PART_NUMBER;
        if part.part_number != expected {
            return Err(format!(
                "parts must be contiguous and sorted ascending with no gaps: \
                 expected part {expected} at position {idx}, found {}",
                part.part_number
            ));
        }
    }
    Ok(())
}

/// Either an upload or a download, carrying the data each needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKind {
    Upload {
        local_path: PathBuf,
        content_type: Option<ContentType>,
        user_metadata: BTreeMap<String, String>,
    },
    Download {
        local_path: PathBuf,
    },
}

/// A single requested transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub bucket: String,
    pub key: String,
    pub kind: TransferKind,
}

/// A MIME content type, resolved once at the adapter boundary rather than
/// threaded through as a bare `Option<String>` everywhere it is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType(String);

impl ContentType {
    pub fn new(value: impl Into<String>) -> Self {
        ContentType(value.into())
    }

    /// Resolve a content type from a file's extension, falling back to
    /// `application/octet-stream` the way the platform MIME lookup would.
    pub fn guess(path: &std::path::Path) -> Self {
        ContentType(mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of one key in a batch delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub key: String,
    pub result: Result<(), crate::error::ErrorRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_normalisation_strips_quotes() {
        assert_eq!(ObjectInfo::normalize_etag("\"abc123\""), "abc123");
        assert_eq!(ObjectInfo::normalize_etag("abc123"), "abc123");
    }

    #[test]
    fn empty_parts_are_valid() {
        assert!(validate_completed_parts(&[]).is_ok());
    }

    #[test]
    fn contiguous_parts_are_valid() {
        let parts = vec![
            CompletedPart { part_number: 1, etag: "a".into(), size: 5 },
            CompletedPart { part_number: 2, etag: "b".into(), size: 5 },
            CompletedPart { part_number: 3, etag: "c".into(), size: 1 },
        ];
        assert!(validate_completed_parts(&parts).is_ok());
    }

    #[test]
    fn gap_in_parts_is_rejected() {
        let parts = vec![
            CompletedPart { part_number: 1, etag: "a".into(), size: 5 },
            CompletedPart { part_number: 3, etag: "c".into(), size: 1 },
        ];
        assert!(validate_completed_parts(&parts).is_err());
    }

    #[test]
    fn out_of_order_parts_are_rejected() {
        let parts = vec![
            CompletedPart { part_number: 2, etag: "b".into(), size: 5 },
            CompletedPart { part_number: 1, etag: "a".into(), size: 5 },
        ];
        assert!(validate_completed_parts(&parts).is_err());
    }

    #[test]
    fn content_type_guess_falls_back_to_octet_stream() {
        let ct = ContentType::guess(std::path::Path::new("archive.unknownext"));
        assert_eq!(ct.as_str(), "application/octet-stream");
    }

    #[test]
    fn content_type_guess_resolves_known_extension() {
        let ct = ContentType::guess(std::path::Path::new("notes.txt"));
        assert_eq!(ct.as_str(), "text/plain");
    }

    #[test]
    fn region_display_shows_unresolved() {
        assert_eq!(Region::unresolved().to_string(), "(unresolved)");
        assert_eq!(Region::new("us-east-1").to_string(), "us-east-1");
    }
}
