//! Transfer Engine (C3): move one object between the remote store and the
//! local filesystem on top of the storage adapter (C1) and worker pool (C2),
//! feeding the progress model (C4) as it goes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use s3term_core::{classify, CompletedPart, ContentType, Terminal, MAX_PART_NUMBER};
use s3term_storage::{CancellationToken, PartUpload, StorageAdapter, StorageError};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::backoff::BackoffConfig;
use crate::pool::{Job, JobError, PoolConfig, WorkerPool};

/// Below this size, downloads/uploads use a single request.
pub const DOWNLOAD_THRESHOLD: u64 = 5 * 1024 * 1024;
pub const UPLOAD_THRESHOLD: u64 = 5 * 1024 * 1024;
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_CONCURRENCY: usize = 5;
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
const PROGRESS_COALESCE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Job(JobError),
    #[error("downloaded size {actual} does not match advertised size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("{0}")]
    Validation(String),
}

/// Sink for progress updates, implemented by the caller (typically wrapping
/// `s3term_core::ProgressState` behind a mutex). The engine never renders
/// progress itself — it only reports byte counts and terminal state.
pub trait ProgressSink: Send + Sync {
    fn set_progress(&self, current: u64);
    fn finish(&self, terminal: Terminal);
}

/// Coalesces `set_progress` calls to at most one per 100ms per transfer;
/// `finish` always passes through immediately.
struct CoalescingProgress<P: ProgressSink> {
    inner: Arc<P>,
    last_sent: Mutex<Instant>,
}

impl<P: ProgressSink> CoalescingProgress<P> {
    fn new(inner: Arc<P>) -> Self {
        Self {
            inner,
            last_sent: Mutex::new(Instant::now() - PROGRESS_COALESCE_INTERVAL),
        }
    }
}

impl<P: ProgressSink> ProgressSink for CoalescingProgress<P> {
    fn set_progress(&self, current: u64) {
        let mut last = self.last_sent.lock().unwrap();
        if last.elapsed() >= PROGRESS_COALESCE_INTERVAL {
            *last = Instant::now();
            drop(last);
            self.inner.set_progress(current);
        }
    }

    fn finish(&self, terminal: Terminal) {
        self.inner.finish(terminal);
    }
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset).map(|_| ())
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0usize;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        written += n;
    }
    Ok(())
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut read = 0usize;
    while read < buf.len() {
        let n = file.seek_read(&mut buf[read..], offset + read as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"));
        }
        read += n;
    }
    Ok(())
}

fn compute_part_count(total_size: u64, part_size: u64, concurrency: usize) -> usize {
    let part_size = part_size.max(1);
    let parts = total_size.div_ceil(part_size);
    (parts as usize).clamp(1, concurrency.max(1))
}

/// Split `total_size` into `n` equal (floor-division) ranges, the last
/// absorbing the remainder. Used for download range-splitting.
fn split_ranges(total_size: u64, n: usize) -> Vec<(u64, u64)> {
    let n = n.max(1) as u64;
    let base = total_size / n;
    let mut ranges = Vec::new();
    let mut offset = 0u64;
    for i in 0..n {
        let length = if i == n - 1 { total_size - offset } else { base };
        if length == 0 {
            continue;
        }
        ranges.push((offset, length));
        offset += length;
    }
    ranges
}

/// Reject an upload before any part job is scheduled if it would need more
/// than `MAX_PART_NUMBER` parts, matching the limit `split_parts` would
/// otherwise silently exceed.
fn check_part_count(total_size: u64, part_size: u64) -> Result<(), String> {
    let part_size = part_size.max(MIN_PART_SIZE);
    let part_count = total_size.div_ceil(part_size);
    if part_count > MAX_PART_NUMBER as u64 {
        return Err(format!(
            "upload would require {part_count} parts, exceeding the {MAX_PART_NUMBER} part maximum; raise the part size"
        ));
    }
    Ok(())
}

/// Split `total_size` into contiguous `part_size`-sized parts, the last
/// absorbing the remainder. Used for multipart upload part boundaries.
fn split_parts(total_size: u64, part_size: u64) -> Vec<(u32, u64, u64)> {
    let part_size = part_size.max(MIN_PART_SIZE);
    let mut parts = Vec::new();
    let mut offset = 0u64;
    let mut part_number = 1u32;
    while offset < total_size {
        let length = part_size.min(total_size - offset);
        parts.push((part_number, offset, length));
        offset += length;
        part_number += 1;
    }
    parts
}

struct RangeDownloadJob {
    adapter: Arc<dyn StorageAdapter>,
    bucket: String,
    key: String,
    offset: u64,
    length: u64,
    file: Arc<File>,
    backoff: BackoffConfig,
    progress: Arc<dyn ProgressSink>,
    bytes_done: Arc<AtomicU64>,
    total_size: u64,
    semaphore: Arc<Semaphore>,
}

#[async_trait]
impl Job for RangeDownloadJob {
    type Output = ();

    async fn execute(&self, cancel: CancellationToken) -> Result<(), JobError> {
        let mut attempt = 0u32;
        loop {
            let permit = self.semaphore.acquire().await.expect("semaphore is never closed");
            let result = self
                .adapter
                .get_object_range(&self.bucket, &self.key, self.offset, self.length, &cancel)
                .await;
            drop(permit);

            match result {
                Ok(bytes) => {
                    write_at(&self.file, &bytes, self.offset)
                        .map_err(|e| JobError::Failed(e.to_string()))?;
                    let done = self.bytes_done.fetch_add(bytes.len() as u64, Ordering::SeqCst)
                        + bytes.len() as u64;
                    self.progress.set_progress(done.min(self.total_size));
                    return Ok(());
                }
                Err(StorageError::Cancelled) => return Err(JobError::Cancelled),
                Err(err) => {
                    let record = classify(&err.raw_message(), err.http_status());
                    if !record.retryable || attempt >= self.backoff.max_retries {
                        return Err(JobError::Failed(err.raw_message()));
                    }
                    tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

struct UploadPartJob {
    adapter: Arc<dyn StorageAdapter>,
    bucket: String,
    key: String,
    upload_id: String,
    part_number: u32,
    offset: u64,
    length: u64,
    file: Arc<File>,
    backoff: BackoffConfig,
    progress: Arc<dyn ProgressSink>,
    bytes_done: Arc<AtomicU64>,
    total_size: u64,
    semaphore: Arc<Semaphore>,
}

#[async_trait]
impl Job for UploadPartJob {
    type Output = CompletedPart;

    async fn execute(&self, cancel: CancellationToken) -> Result<CompletedPart, JobError> {
        let mut buf = vec![0u8; self.length as usize];
        read_at(&self.file, &mut buf, self.offset).map_err(|e| JobError::Failed(e.to_string()))?;

        let mut attempt = 0u32;
        loop {
            let permit = self.semaphore.acquire().await.expect("semaphore is never closed");
            let mut cursor = Cursor::new(&buf[..]);
            let part = PartUpload {
                part_number: self.part_number,
                reader: &mut cursor,
                size: self.length,
            };
            let result = self
                .adapter
                .upload_part(&self.bucket, &self.key, &self.upload_id, part, &cancel)
                .await;
            drop(permit);

            match result {
                Ok(etag) => {
                    let done = self.bytes_done.fetch_add(self.length, Ordering::SeqCst) + self.length;
                    self.progress.set_progress(done.min(self.total_size));
                    return Ok(CompletedPart {
                        part_number: self.part_number,
                        etag,
                        size: self.length,
                    });
                }
                Err(StorageError::Cancelled) => return Err(JobError::Cancelled),
                Err(err) => {
                    let record = classify(&err.raw_message(), err.http_status());
                    if !record.retryable || attempt >= self.backoff.max_retries {
                        return Err(JobError::Failed(err.raw_message()));
                    }
                    tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Request describing a single download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub bucket: String,
    pub key: String,
    pub local_path: PathBuf,
    pub total_size: u64,
}

/// Request describing a single upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub local_path: PathBuf,
    pub content_type: Option<ContentType>,
    pub user_metadata: BTreeMap<String, String>,
}

/// Chunked upload/download orchestration on top of [`StorageAdapter`] and
/// [`WorkerPool`]. Multiple concurrent transfers share one byte-level
/// concurrency budget via an internal semaphore, so a batch of requests
/// never oversubscribes the remote store even though each request builds
/// its own worker pool.
pub struct TransferEngine {
    adapter: Arc<dyn StorageAdapter>,
    concurrency: usize,
    part_size: u64,
    backoff: BackoffConfig,
    semaphore: Arc<Semaphore>,
}

impl TransferEngine {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            concurrency: DEFAULT_CONCURRENCY,
            part_size: DEFAULT_PART_SIZE,
            backoff: BackoffConfig::default(),
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self.semaphore = Arc::new(Semaphore::new(self.concurrency));
        self
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn download(
        &self,
        req: DownloadRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        info!(bucket = %req.bucket, key = %req.key, size = req.total_size, "starting download");
        let result = if req.total_size <= DOWNLOAD_THRESHOLD {
            self.download_single(req, progress, cancel).await
        } else {
            self.download_multipart(req, progress, cancel).await
        };
        if let Err(err) = &result {
            warn!(error = %err, "download failed");
        }
        result
    }

    async fn download_single(
        &self,
        req: DownloadRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        let mut attempt = 0u32;
        let bytes = loop {
            let result = self
                .adapter
                .get_object_range(&req.bucket, &req.key, 0, req.total_size, &cancel)
                .await;
            match result {
                Ok(bytes) => break bytes,
                Err(StorageError::Cancelled) => {
                    progress.finish(Terminal::Failure("cancelled".to_string()));
                    return Err(TransferError::Cancelled);
                }
                Err(err) => {
                    let record = classify(&err.raw_message(), err.http_status());
                    if !record.retryable || attempt >= self.backoff.max_retries {
                        progress.finish(Terminal::Failure(err.raw_message()));
                        return Err(TransferError::Storage(err));
                    }
                    warn!(key = %req.key, attempt, error = %err.raw_message(), "retrying download");
                    tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        };

        std::fs::write(&req.local_path, &bytes)?;
        progress.set_progress(req.total_size);
        progress.finish(Terminal::Success);
        Ok(())
    }

    async fn download_multipart(
        &self,
        req: DownloadRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        let file = File::create(&req.local_path)?;
        file.set_len(req.total_size)?;
        let file = Arc::new(file);

        let n = compute_part_count(req.total_size, self.part_size, self.concurrency);
        let ranges = split_ranges(req.total_size, n);

        let mut pool = WorkerPool::<RangeDownloadJob>::new(PoolConfig::new(n.min(self.concurrency)));
        pool.start();

        let bytes_done = Arc::new(AtomicU64::new(0));
        let coalesced = Arc::new(CoalescingProgress::new(progress.clone()));

        for (offset, length) in &ranges {
            let job = RangeDownloadJob {
                adapter: self.adapter.clone(),
                bucket: req.bucket.clone(),
                key: req.key.clone(),
                offset: *offset,
                length: *length,
                file: file.clone(),
                backoff: self.backoff,
                progress: coalesced.clone(),
                bytes_done: bytes_done.clone(),
                total_size: req.total_size,
                semaphore: self.semaphore.clone(),
            };
            if pool.submit(job).await.is_err() {
                break;
            }
        }

        let results = pool.results();
        let mut remaining = ranges.len();
        let mut failure = None;
        while remaining > 0 {
            match results.recv().await {
                Ok(r) => {
                    remaining -= 1;
                    if let Err(err) = r.output {
                        if failure.is_none() {
                            cancel.cancel();
                            pool.cancel_all();
                        }
                        failure = Some(err);
                    }
                }
                Err(_) => break,
            }
        }
        pool.stop().await;

        if let Some(err) = failure {
            drop(file);
            let _ = std::fs::remove_file(&req.local_path);
            progress.finish(Terminal::Failure(err.to_string()));
            return Err(TransferError::Job(err));
        }

        drop(file);
        let on_disk = std::fs::metadata(&req.local_path)?.len();
        if on_disk != req.total_size {
            let _ = std::fs::remove_file(&req.local_path);
            progress.finish(Terminal::Failure(format!(
                "downloaded size {on_disk} does not match advertised size {}",
                req.total_size
            )));
            return Err(TransferError::SizeMismatch {
                expected: req.total_size,
                actual: on_disk,
            });
        }

        progress.finish(Terminal::Success);
        Ok(())
    }

    pub async fn upload(
        &self,
        req: UploadRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<String, TransferError> {
        let total_size = std::fs::metadata(&req.local_path)?.len();
        info!(bucket = %req.bucket, key = %req.key, size = total_size, "starting upload");
        let result = if total_size <= UPLOAD_THRESHOLD {
            self.upload_single(req, total_size, progress, cancel).await
        } else {
            self.upload_multipart(req, total_size, progress, cancel).await
        };
        if let Err(err) = &result {
            warn!(error = %err, "upload failed");
        }
        result
    }

    async fn upload_single(
        &self,
        req: UploadRequest,
        total_size: u64,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<String, TransferError> {
        let content_type = req
            .content_type
            .unwrap_or_else(|| ContentType::guess(&req.local_path));

        let mut attempt = 0u32;
        loop {
            let mut file = std::fs::File::open(&req.local_path)?;
            let result = self
                .adapter
                .put_object(
                    &req.bucket,
                    &req.key,
                    &mut file,
                    total_size,
                    Some(content_type.as_str()),
                    &req.user_metadata,
                    &cancel,
                )
                .await;
            match result {
                Ok(etag) => {
                    progress.set_progress(total_size);
                    progress.finish(Terminal::Success);
                    return Ok(etag);
                }
                Err(StorageError::Cancelled) => {
                    progress.finish(Terminal::Failure("cancelled".to_string()));
                    return Err(TransferError::Cancelled);
                }
                Err(err) => {
                    let record = classify(&err.raw_message(), err.http_status());
                    if !record.retryable || attempt >= self.backoff.max_retries {
                        progress.finish(Terminal::Failure(err.raw_message()));
                        return Err(TransferError::Storage(err));
                    }
                    warn!(key = %req.key, attempt, error = %err.raw_message(), "retrying upload");
                    tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn upload_multipart(
        &self,
        req: UploadRequest,
        total_size: u64,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<String, TransferError> {
        if let Err(message) = check_part_count(total_size, self.part_size) {
            warn!(key = %req.key, reason = %message, "rejecting upload before any bytes move");
            progress.finish(Terminal::Failure(message.clone()));
            return Err(TransferError::Validation(message));
        }

        let content_type = req
            .content_type
            .clone()
            .unwrap_or_else(|| ContentType::guess(&req.local_path));

        let upload_id = self
            .adapter
            .create_multipart_upload(
                &req.bucket,
                &req.key,
                Some(content_type.as_str()),
                &req.user_metadata,
                &cancel,
            )
            .await?;

        let file = Arc::new(std::fs::File::open(&req.local_path)?);
        let parts = split_parts(total_size, self.part_size);

        let mut pool = WorkerPool::<UploadPartJob>::new(PoolConfig::new(self.concurrency));
        pool.start();

        let bytes_done = Arc::new(AtomicU64::new(0));
        let coalesced = Arc::new(CoalescingProgress::new(progress.clone()));

        for (part_number, offset, length) in &parts {
            let job = UploadPartJob {
                adapter: self.adapter.clone(),
                bucket: req.bucket.clone(),
                key: req.key.clone(),
                upload_id: upload_id.clone(),
                part_number: *part_number,
                offset: *offset,
                length: *length,
                file: file.clone(),
                backoff: self.backoff,
                progress: coalesced.clone(),
                bytes_done: bytes_done.clone(),
                total_size,
                semaphore: self.semaphore.clone(),
            };
            if pool.submit(job).await.is_err() {
                break;
            }
        }

        let results = pool.results();
        let mut remaining = parts.len();
        let mut completed = Vec::with_capacity(parts.len());
        let mut failure = None;
        while remaining > 0 {
            match results.recv().await {
                Ok(r) => {
                    remaining -= 1;
                    match r.output {
                        Ok(part) => completed.push(part),
                        Err(err) => {
                            if failure.is_none() {
                                cancel.cancel();
                                pool.cancel_all();
                            }
                            failure = Some(err);
                        }
                    }
                }
                Err(_) => break,
            }
        }
        pool.stop().await;

        if let Some(err) = failure {
            warn!(key = %req.key, error = %err, "aborting multipart upload after part failure");
            let abort_cancel = CancellationToken::new();
            let _ = self
                .adapter
                .abort_multipart_upload(&req.bucket, &req.key, &upload_id, &abort_cancel)
                .await;
            progress.finish(Terminal::Failure(err.to_string()));
            return Err(TransferError::Job(err));
        }

        completed.sort_by_key(|p| p.part_number);

        match self
            .adapter
            .complete_multipart_upload(&req.bucket, &req.key, &upload_id, &completed, &cancel)
            .await
        {
            Ok(etag) => {
                info!(key = %req.key, parts = completed.len(), "multipart upload completed");
                progress.finish(Terminal::Success);
                Ok(etag)
            }
            Err(err) => {
                let abort_cancel = CancellationToken::new();
                let _ = self
                    .adapter
                    .abort_multipart_upload(&req.bucket, &req.key, &upload_id, &abort_cancel)
                    .await;
                progress.finish(Terminal::Failure(err.raw_message()));
                Err(TransferError::Storage(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3term_storage::FakeAdapter;
    use std::sync::Mutex as StdMutex;

    struct RecordingProgress {
        samples: StdMutex<Vec<u64>>,
        terminal: StdMutex<Option<Terminal>>,
    }

    impl RecordingProgress {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                samples: StdMutex::new(Vec::new()),
                terminal: StdMutex::new(None),
            })
        }

        fn terminal(&self) -> Option<Terminal> {
            self.terminal.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingProgress {
        fn set_progress(&self, current: u64) {
            self.samples.lock().unwrap().push(current);
        }
        fn finish(&self, terminal: Terminal) {
            *self.terminal.lock().unwrap() = Some(terminal);
        }
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn part_count_respects_concurrency_cap() {
        assert_eq!(compute_part_count(50 * 1024 * 1024, 5 * 1024 * 1024, 5), 5);
        assert_eq!(compute_part_count(6 * 1024 * 1024, 5 * 1024 * 1024, 5), 2);
    }

    #[test]
    fn split_parts_keeps_non_final_parts_at_or_above_minimum() {
        let parts = split_parts(12 * 1024 * 1024, 5 * 1024 * 1024);
        assert_eq!(parts.len(), 3);
        for (_, _, length) in &parts[..parts.len() - 1] {
            assert!(*length >= MIN_PART_SIZE);
        }
        let total: u64 = parts.iter().map(|(_, _, l)| l).sum();
        assert_eq!(total, 12 * 1024 * 1024);
    }

    #[test]
    fn split_parts_boundary_at_exactly_one_part_size() {
        assert_eq!(split_parts(5 * 1024 * 1024, 5 * 1024 * 1024).len(), 1);
        assert_eq!(split_parts(5 * 1024 * 1024 + 1, 5 * 1024 * 1024).len(), 2);
    }

    #[test]
    fn check_part_count_rejects_uploads_needing_more_than_max_part_number() {
        let part_size = 5 * 1024 * 1024;
        let max_size = MAX_PART_NUMBER as u64 * part_size;
        assert!(check_part_count(max_size, part_size).is_ok());
        assert!(check_part_count(max_size + 1, part_size).is_err());
    }

    #[tokio::test]
    async fn small_upload_uses_single_put_and_round_trips() {
        let adapter: Arc<dyn StorageAdapter> = Arc::new(FakeAdapter::new().with_bucket("b"));
        let engine = TransferEngine::new(adapter.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let progress = RecordingProgress::new();
        let req = UploadRequest {
            bucket: "b".to_string(),
            key: "small.txt".to_string(),
            local_path: path,
            content_type: None,
            user_metadata: BTreeMap::new(),
        };
        engine.upload(req, progress.clone(), token()).await.unwrap();
        assert_eq!(progress.terminal(), Some(Terminal::Success));
    }

    #[tokio::test]
    async fn large_upload_splits_into_parts_and_completes() {
        let adapter: Arc<dyn StorageAdapter> = Arc::new(FakeAdapter::new().with_bucket("b"));
        let engine = TransferEngine::new(adapter.clone()).with_part_size(5 * 1024 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let data = vec![7u8; 12 * 1024 * 1024];
        std::fs::write(&path, &data).unwrap();

        let progress = RecordingProgress::new();
        let req = UploadRequest {
            bucket: "b".to_string(),
            key: "large.bin".to_string(),
            local_path: path,
            content_type: None,
            user_metadata: BTreeMap::new(),
        };
        engine.upload(req, progress.clone(), token()).await.unwrap();
        assert_eq!(progress.terminal(), Some(Terminal::Success));
    }

    #[tokio::test]
    async fn download_round_trips_object_bytes() {
        let fake = FakeAdapter::new().with_bucket("b");
        let data = vec![9u8; 11 * 1024 * 1024];
        fake.put_raw("b", "k", data.clone());
        let adapter: Arc<dyn StorageAdapter> = Arc::new(fake);
        let engine = TransferEngine::new(adapter);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let progress = RecordingProgress::new();
        let req = DownloadRequest {
            bucket: "b".to_string(),
            key: "k".to_string(),
            local_path: path.clone(),
            total_size: data.len() as u64,
        };
        engine.download(req, progress.clone(), token()).await.unwrap();
        assert_eq!(progress.terminal(), Some(Terminal::Success));
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), data.len());
    }

    #[tokio::test]
    async fn non_retryable_failure_fails_upload_before_any_bytes_move() {
        let fake = Arc::new(FakeAdapter::new().with_bucket("b"));
        *fake.inject_failure.lock().unwrap() = Some(("AccessDenied".to_string(), Some(403)));
        let adapter: Arc<dyn StorageAdapter> = fake;
        let engine = TransferEngine::new(adapter).with_part_size(5 * 1024 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bin");
        std::fs::write(&path, vec![1u8; 12 * 1024 * 1024]).unwrap();

        let progress = RecordingProgress::new();
        let req = UploadRequest {
            bucket: "b".to_string(),
            key: "large.bin".to_string(),
            local_path: path,
            content_type: None,
            user_metadata: BTreeMap::new(),
        };
        // AccessDenied (403) is non-retryable: create_multipart_upload itself
        // fails, so no part job ever runs.
        let err = engine.upload(req, progress.clone(), token()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn upload_exactly_at_threshold_takes_the_single_put_path() {
        let adapter: Arc<dyn StorageAdapter> = Arc::new(FakeAdapter::new().with_bucket("b"));
        let engine = TransferEngine::new(adapter.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exact.bin");
        std::fs::write(&path, vec![3u8; UPLOAD_THRESHOLD as usize]).unwrap();

        let progress = RecordingProgress::new();
        let req = UploadRequest {
            bucket: "b".to_string(),
            key: "exact.bin".to_string(),
            local_path: path,
            content_type: None,
            user_metadata: BTreeMap::new(),
        };
        engine.upload(req, progress.clone(), token()).await.unwrap();
        assert_eq!(progress.terminal(), Some(Terminal::Success));
    }
}
