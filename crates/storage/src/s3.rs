//! `S3Adapter`: the production [`StorageAdapter`] backed by `aws-sdk-s3`.
//!
//! Credential and region discovery are out of scope here (the external
//! collaborator described in the specification); this adapter only accepts
//! an already-built `aws_sdk_s3::Client`.

use std::collections::BTreeMap;
use std::io::Read;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use s3term_core::{Bucket, CompletedPart, ObjectInfo, ObjectMetadata, Region};

use crate::adapter::{
    CancellationToken, DeleteObjectsResult, ListObjectsPage, PartUpload, StorageAdapter, StorageError,
};

/// Production storage adapter over `aws-sdk-s3`.
pub struct S3Adapter {
    client: Client,
}

impl S3Adapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_conf(config: aws_config::SdkConfig) -> Self {
        Self::new(Client::new(&config))
    }
}

fn unquote(etag: &str) -> String {
    ObjectInfo::normalize_etag(etag)
}

/// Race an SDK future against cancellation; maps a cancelled race to
/// [`StorageError::Cancelled`] so the caller's token always wins.
async fn with_cancel<F, T, E>(cancel: &CancellationToken, fut: F) -> Result<T, StorageError>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        res = fut => res.map_err(|e| classify_sdk_error(&e)),
    }
}

fn classify_sdk_error<E: std::fmt::Display>(err: &E) -> StorageError {
    let message = err.to_string();
    let http_status = extract_http_status(&message);
    StorageError::remote(message, http_status)
}

/// Best-effort HTTP status extraction from an SDK error's `Display` output;
/// the SDK error types already embed this in their message, so we scrape it
/// rather than depend on each service's private error-metadata type.
fn extract_http_status(message: &str) -> Option<u16> {
    for code in [400, 403, 404, 429, 500, 502, 503, 504] {
        if message.contains(&code.to_string()) {
            return Some(code);
        }
    }
    None
}

#[async_trait]
impl StorageAdapter for S3Adapter {
    async fn list_buckets(&self, cancel: &CancellationToken) -> Result<Vec<Bucket>, StorageError> {
        let mut buckets = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self.client.list_buckets();
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = with_cancel(cancel, req.send()).await?;
            for b in resp.buckets() {
                buckets.push(Bucket {
                    name: b.name().unwrap_or_default().to_string(),
                    creation_date: b
                        .creation_date()
                        .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0)),
                    region: Region::unresolved(),
                });
            }
            continuation = resp.continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }
        Ok(buckets)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max: usize,
        continuation_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ListObjectsPage, StorageError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(max as i32);
        if let Some(token) = continuation_token {
            req = req.continuation_token(token);
        }
        let resp = with_cancel(cancel, req.send()).await?;

        let items = resp
            .contents()
            .iter()
            .map(|obj| ObjectInfo {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0).max(0) as u64,
                last_modified: obj
                    .last_modified()
                    .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0)),
                etag: obj.e_tag().map(unquote).unwrap_or_default(),
                storage_class: obj.storage_class().map(|c| c.as_str().to_string()),
            })
            .collect();

        Ok(ListObjectsPage {
            items,
            truncated: resp.is_truncated().unwrap_or(false),
            next_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ObjectMetadata, StorageError> {
        let resp = with_cancel(
            cancel,
            self.client.head_object().bucket(bucket).key(key).send(),
        )
        .await?;

        let user_metadata: BTreeMap<String, String> = resp
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(ObjectMetadata {
            size: resp.content_length().unwrap_or(0).max(0) as u64,
            content_type: resp.content_type().map(str::to_string),
            last_modified: resp
                .last_modified()
                .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0)),
            user_metadata,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut dyn crate::adapter::PartReader,
        size: u64,
        content_type: Option<&str>,
        user_metadata: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        let mut buf = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut buf)?;

        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(buf));
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        for (k, v) in user_metadata {
            req = req.metadata(k, v);
        }

        let resp = with_cancel(cancel, req.send()).await?;
        Ok(resp.e_tag().map(unquote).unwrap_or_default())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        user_metadata: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        let mut req = self.client.create_multipart_upload().bucket(bucket).key(key);
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        for (k, v) in user_metadata {
            req = req.metadata(k, v);
        }
        let resp = with_cancel(cancel, req.send()).await?;
        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::remote("no upload id returned", None))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part: PartUpload<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        let mut buf = Vec::with_capacity(part.size as usize);
        part.reader.read_to_end(&mut buf)?;

        let resp = with_cancel(
            cancel,
            self.client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part.part_number as i32)
                .body(ByteStream::from(buf))
                .send(),
        )
        .await?;

        Ok(resp.e_tag().map(unquote).unwrap_or_default())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
        cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        s3term_core::model::validate_completed_parts(parts)
            .map_err(|msg| StorageError::remote(msg, None))?;

        let sdk_parts: Vec<SdkCompletedPart> = parts
            .iter()
            .map(|p| {
                SdkCompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(p.etag.clone())
                    .build()
            })
            .collect();

        let completed = CompletedMultipartUpload::builder().set_parts(Some(sdk_parts)).build();

        let resp = with_cancel(
            cancel,
            self.client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(completed)
                .send(),
        )
        .await?;

        Ok(resp.e_tag().map(unquote).unwrap_or_default())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        with_cancel(
            cancel,
            self.client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .send(),
        )
        .await?;
        Ok(())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        with_cancel(
            cancel,
            self.client.delete_object().bucket(bucket).key(key).send(),
        )
        .await?;
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<DeleteObjectsResult>, StorageError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let identifiers: Vec<ObjectIdentifier> = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build().expect("key is required"))
            .collect();
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(false)
            .build()
            .map_err(|e| StorageError::remote(e.to_string(), None))?;

        let resp = with_cancel(
            cancel,
            self.client.delete_objects().bucket(bucket).delete(delete).send(),
        )
        .await?;

        let mut results: BTreeMap<String, DeleteObjectsResult> = BTreeMap::new();
        for deleted in resp.deleted() {
            if let Some(key) = deleted.key() {
                results.insert(
                    key.to_string(),
                    DeleteObjectsResult {
                        key: key.to_string(),
                        error: None,
                    },
                );
            }
        }
        for err in resp.errors() {
            if let Some(key) = err.key() {
                let message = format!(
                    "{}: {}",
                    err.code().unwrap_or("Error"),
                    err.message().unwrap_or_default()
                );
                results.insert(
                    key.to_string(),
                    DeleteObjectsResult {
                        key: key.to_string(),
                        error: Some(message),
                    },
                );
            }
        }

        // Preserve input order, as required by the contract.
        Ok(keys
            .iter()
            .map(|k| {
                results.remove(k).unwrap_or(DeleteObjectsResult {
                    key: k.clone(),
                    error: Some("key missing from delete response".to_string()),
                })
            })
            .collect())
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StorageError> {
        let end = offset + length.saturating_sub(1);
        let range = format!("bytes={offset}-{end}");
        let resp = with_cancel(
            cancel,
            self.client.get_object().bucket(bucket).key(key).range(range).send(),
        )
        .await?;

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            body = resp.body.collect() => body.map_err(|e| StorageError::remote(e.to_string(), None))?,
        };
        Ok(body.into_bytes().to_vec())
    }

    async fn get_bucket_region(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<Region, StorageError> {
        let resp = with_cancel(
            cancel,
            self.client.get_bucket_location().bucket(bucket).send(),
        )
        .await?;
        let region = resp
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "us-east-1".to_string());
        Ok(Region::new(region))
    }
}
