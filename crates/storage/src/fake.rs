//! In-memory [`StorageAdapter`] used by engine and view unit tests so C2/C3
//! can be exercised without a network.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Mutex;

use async_trait::async_trait;
use s3term_core::{Bucket, CompletedPart, ObjectInfo, ObjectMetadata, Region};

use crate::adapter::{
    CancellationToken, DeleteObjectsResult, ListObjectsPage, PartUpload, StorageAdapter, StorageError,
};

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<String, Vec<u8>>,
}

struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, Vec<u8>>,
}

/// An in-memory, single-process stand-in for an S3-compatible store.
pub struct FakeAdapter {
    buckets: Mutex<BTreeMap<String, BucketState>>,
    uploads: Mutex<BTreeMap<String, PendingUpload>>,
    next_upload_id: Mutex<u64>,
    /// When set, every call fails with this message until cleared — used to
    /// simulate transient/permanent remote failures in tests.
    pub inject_failure: Mutex<Option<(String, Option<u16>)>>,
}

impl Default for FakeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            uploads: Mutex::new(BTreeMap::new()),
            next_upload_id: Mutex::new(1),
            inject_failure: Mutex::new(None),
        }
    }

    pub fn with_bucket(self, name: &str) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .insert(name.to_string(), BucketState::default());
        self
    }

    pub fn put_raw(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .objects
            .insert(key.to_string(), data);
    }

    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .cloned()
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        if let Some((message, status)) = self.inject_failure.lock().unwrap().clone() {
            return Err(StorageError::remote(message, status));
        }
        Ok(())
    }

    fn etag_for(data: &[u8]) -> String {
        // Not a real MD5; deterministic and sufficient for fake-adapter tests.
        format!("{:x}", data.len() as u64 ^ 0x9E3779B97F4A7C15)
    }
}

#[async_trait]
impl StorageAdapter for FakeAdapter {
    async fn list_buckets(&self, _cancel: &CancellationToken) -> Result<Vec<Bucket>, StorageError> {
        self.check_failure()?;
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .keys()
            .map(|name| Bucket {
                name: name.clone(),
                creation_date: None,
                region: Region::unresolved(),
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max: usize,
        continuation_token: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<ListObjectsPage, StorageError> {
        self.check_failure()?;
        let buckets = self.buckets.lock().unwrap();
        let Some(state) = buckets.get(bucket) else {
            return Err(StorageError::remote("NoSuchBucket", Some(404)));
        };

        let start_after: String = continuation_token.unwrap_or_default().to_string();
        let mut matching: Vec<&String> = state
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix) && k.as_str() > start_after.as_str())
            .collect();
        matching.sort();

        let truncated = matching.len() > max;
        matching.truncate(max.max(1));

        let items = matching
            .iter()
            .map(|key| {
                let data = &state.objects[key.as_str()];
                ObjectInfo {
                    key: (*key).clone(),
                    size: data.len() as u64,
                    last_modified: None,
                    etag: Self::etag_for(data),
                    storage_class: None,
                }
            })
            .collect();

        let next_token = if truncated {
            matching.last().map(|k| (*k).clone())
        } else {
            None
        };

        Ok(ListObjectsPage {
            items,
            truncated,
            next_token,
        })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        _cancel: &CancellationToken,
    ) -> Result<ObjectMetadata, StorageError> {
        self.check_failure()?;
        let buckets = self.buckets.lock().unwrap();
        let data = buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .ok_or_else(|| StorageError::remote("NoSuchKey", Some(404)))?;
        Ok(ObjectMetadata {
            size: data.len() as u64,
            content_type: None,
            last_modified: None,
            user_metadata: BTreeMap::new(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut dyn crate::adapter::PartReader,
        _size: u64,
        _content_type: Option<&str>,
        _user_metadata: &BTreeMap<String, String>,
        _cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        self.check_failure()?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let etag = Self::etag_for(&buf);
        self.put_raw(bucket, key, buf);
        Ok(etag)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        _content_type: Option<&str>,
        _user_metadata: &BTreeMap<String, String>,
        _cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        self.check_failure()?;
        let mut next = self.next_upload_id.lock().unwrap();
        let id = format!("fake-upload-{}", *next);
        *next += 1;
        self.uploads.lock().unwrap().insert(
            id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part: PartUpload<'_>,
        _cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        self.check_failure()?;
        let mut buf = Vec::new();
        part.reader.read_to_end(&mut buf)?;
        let etag = Self::etag_for(&buf);

        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::remote("NoSuchUpload", Some(404)))?;
        upload.parts.insert(part.part_number, buf);
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
        _cancel: &CancellationToken,
    ) -> Result<String, StorageError> {
        self.check_failure()?;
        s3term_core::model::validate_completed_parts(parts)
            .map_err(|msg| StorageError::remote(msg, None))?;

        let upload = self
            .uploads
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| StorageError::remote("NoSuchUpload", Some(404)))?;
        assert_eq!(upload.bucket, bucket);
        assert_eq!(upload.key, key);

        let mut data = Vec::new();
        for part in parts {
            let chunk = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| StorageError::remote("missing part", None))?;
            data.extend_from_slice(chunk);
        }
        let etag = Self::etag_for(&data);
        self.put_raw(bucket, key, data);
        Ok(etag)
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.uploads.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.check_failure()?;
        self.buckets
            .lock()
            .unwrap()
            .get_mut(bucket)
            .map(|b| b.objects.remove(key));
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Vec<DeleteObjectsResult>, StorageError> {
        self.check_failure()?;
        let mut buckets = self.buckets.lock().unwrap();
        let state = buckets.entry(bucket.to_string()).or_default();
        Ok(keys
            .iter()
            .map(|k| {
                state.objects.remove(k);
                DeleteObjectsResult {
                    key: k.clone(),
                    error: None,
                }
            })
            .collect())
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StorageError> {
        self.check_failure()?;
        let buckets = self.buckets.lock().unwrap();
        let data = buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .ok_or_else(|| StorageError::remote("NoSuchKey", Some(404)))?;
        let start = offset as usize;
        let end = (offset + length) as usize;
        if start > data.len() {
            return Ok(Vec::new());
        }
        Ok(data[start..end.min(data.len())].to_vec())
    }

    async fn get_bucket_region(
        &self,
        _bucket: &str,
        _cancel: &CancellationToken,
    ) -> Result<Region, StorageError> {
        self.check_failure()?;
        Ok(Region::new("us-east-1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let adapter = FakeAdapter::new().with_bucket("b");
        let mut data = std::io::Cursor::new(b"hello world".to_vec());
        adapter
            .put_object("b", "k", &mut data, 11, None, &BTreeMap::new(), &token())
            .await
            .unwrap();
        let got = adapter.get_object_range("b", "k", 0, 11, &token()).await.unwrap();
        assert_eq!(got, b"hello world");
    }

    #[tokio::test]
    async fn list_pagination_yields_both_pages_once() {
        let adapter = FakeAdapter::new().with_bucket("b");
        for i in 0..5 {
            adapter.put_raw("b", &format!("k{i}"), vec![0; 4]);
        }
        let page1 = adapter
            .list_objects("b", "", 3, None, &token())
            .await
            .unwrap();
        assert!(page1.truncated);
        assert_eq!(page1.items.len(), 3);

        let page2 = adapter
            .list_objects("b", "", 3, page1.next_token.as_deref(), &token())
            .await
            .unwrap();
        assert!(!page2.truncated);
        assert_eq!(page2.items.len(), 2);
    }

    #[tokio::test]
    async fn failure_injection_is_classified_upstream() {
        let adapter = FakeAdapter::new().with_bucket("b");
        *adapter.inject_failure.lock().unwrap() = Some(("AccessDenied".to_string(), Some(403)));
        let err = adapter.list_buckets(&token()).await.unwrap_err();
        assert_eq!(err.http_status(), Some(403));
    }
}
