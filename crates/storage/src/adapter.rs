//! The `StorageAdapter` trait: the minimum capability set the transfer
//! engine needs, so it stays SDK-agnostic and testable against a fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use s3term_core::{Bucket, ObjectInfo, ObjectMetadata, Region};

pub use tokio_util::sync::CancellationToken;

/// Errors surfaced by the adapter. Raw messages are passed through
/// unclassified; classification into [`s3term_core::ErrorCategory`] is the
/// caller's job (C8), not the adapter's.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{message}")]
    Remote {
        message: String,
        http_status: Option<u16>,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn remote(message: impl Into<String>, http_status: Option<u16>) -> Self {
        StorageError::Remote {
            message: message.into(),
            http_status,
        }
    }

    pub fn raw_message(&self) -> String {
        match self {
            StorageError::Remote { message, .. } => message.clone(),
            StorageError::Cancelled => "cancelled".to_string(),
            StorageError::Io(err) => err.to_string(),
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            StorageError::Remote { http_status, .. } => *http_status,
            _ => None,
        }
    }
}

/// One page of a `ListObjects` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsPage {
    pub items: Vec<ObjectInfo>,
    pub truncated: bool,
    pub next_token: Option<String>,
}

/// A readable byte source for one upload part. The engine owns seeking: it
/// hands the adapter a reader already positioned at the part's start.
pub trait PartReader: std::io::Read + Send {}
impl<T: std::io::Read + Send> PartReader for T {}

/// Input to `UploadPart`: a seekable window into the local file.
pub struct PartUpload<'a> {
    pub part_number: u32,
    pub reader: &'a mut dyn PartReader,
    pub size: u64,
}

/// Per-key batch-delete result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteObjectsResult {
    pub key: String,
    pub error: Option<String>,
}

/// Capability surface over the vendor SDK. All operations accept a
/// cancellation token and never block indefinitely without one.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn list_buckets(&self, cancel: &CancellationToken) -> Result<Vec<Bucket>, StorageError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max: usize,
        continuation_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ListObjectsPage, StorageError>;

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ObjectMetadata, StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut dyn PartReader,
        size: u64,
        content_type: Option<&str>,
        user_metadata: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String, StorageError>;

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        user_metadata: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String, StorageError>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part: PartUpload<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, StorageError>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[s3term_core::CompletedPart],
        cancel: &CancellationToken,
    ) -> Result<String, StorageError>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<DeleteObjectsResult>, StorageError>;

    /// Half-open byte range `[offset, offset+length)`. Returns the bytes of
    /// that range; the caller (the transfer engine) is responsible for
    /// writing them at the right file offset.
    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StorageError>;

    async fn get_bucket_region(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<Region, StorageError>;
}
