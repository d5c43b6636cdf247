//! Deferred effects (§4.7): `update` never performs I/O, it only returns
//! [`Command`]s; this module spawns the tasks that execute them and feeds
//! their outcomes back as messages.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use s3term_core::{Bucket, ErrorRecord, ObjectInfo, Region};
use s3term_engine::{DownloadRequest, ProgressSink, TransferEngine, UploadRequest};
use s3term_storage::{ListObjectsPage, StorageAdapter};

use crate::app::Msg;

/// A deferred effect requested by `update`.
#[derive(Debug, Clone)]
pub enum Command {
    ListBuckets,
    ListObjects { bucket: String, prefix: String, continuation: Option<String> },
    GetBucketRegion { bucket: String },
    Download { bucket: String, key: String, local_path: PathBuf, total_size: u64 },
    Upload { bucket: String, key: String, local_path: PathBuf },
    DeleteObject { bucket: String, key: String },
    GenerateObjectList { bucket: String, listing: Vec<ObjectInfo> },
}

/// Result of a completed command, delivered to the runtime as a [`Msg`].
#[derive(Debug)]
pub enum CommandOutcome {
    Buckets(Result<Vec<Bucket>, ErrorRecord>),
    Objects(Result<ListObjectsPage, ErrorRecord>),
    BucketRegion(Result<Region, ErrorRecord>),
    TransferProgress { current: u64, total: u64 },
    TransferDone(Result<String, ErrorRecord>),
    ObjectListWritten(Result<PathBuf, ErrorRecord>),
}

/// Forwards `TransferEngine` progress callbacks onto the runtime's message
/// channel, mirroring the teacher's engine-emits-events pattern one layer up.
struct ChannelProgressSink {
    out_tx: mpsc::UnboundedSender<Msg>,
    total: u64,
}

impl ProgressSink for ChannelProgressSink {
    fn set_progress(&self, current: u64) {
        let _ = self.out_tx.send(Msg::CommandResult(CommandOutcome::TransferProgress {
            current,
            total: self.total,
        }));
    }

    fn finish(&self, _terminal: s3term_core::Terminal) {}
}

#[derive(Clone)]
pub struct CommandContext {
    pub adapter: Arc<dyn StorageAdapter>,
    pub engine: Arc<TransferEngine>,
    pub out_tx: mpsc::UnboundedSender<Msg>,
}

impl CommandContext {
    /// Spawn the command's task and return a token the caller can cancel
    /// (e.g. when the owning screen is popped).
    pub fn spawn(&self, cmd: Command) -> CancellationToken {
        let cancel = CancellationToken::new();
        let child = cancel.child_token();
        let ctx = self.clone();
        tokio::spawn(async move { ctx.run(cmd, child).await });
        cancel
    }

    async fn run(&self, cmd: Command, cancel: CancellationToken) {
        let outcome = match cmd {
            Command::ListBuckets => CommandOutcome::Buckets(
                self.adapter.list_buckets(&cancel).await.map_err(classify_storage_error),
            ),
            Command::ListObjects { bucket, prefix, continuation } => {
                CommandOutcome::Objects(
                    self.adapter
                        .list_objects(&bucket, &prefix, 1000, continuation.as_deref(), &cancel)
                        .await
                        .map_err(classify_storage_error),
                )
            }
            Command::GetBucketRegion { bucket } => CommandOutcome::BucketRegion(
                self.adapter.get_bucket_region(&bucket, &cancel).await.map_err(classify_storage_error),
            ),
            Command::Download { bucket, key, local_path, total_size } => {
                let sink: Arc<dyn ProgressSink> =
                    Arc::new(ChannelProgressSink { out_tx: self.out_tx.clone(), total: total_size });
                let req = DownloadRequest { bucket, key, local_path, total_size };
                let result = self.engine.download(req, sink, cancel).await;
                CommandOutcome::TransferDone(
                    result.map(|_| String::new()).map_err(classify_transfer_error),
                )
            }
            Command::Upload { bucket, key, local_path } => {
                let total = std::fs::metadata(&local_path).map(|m| m.len()).unwrap_or(0);
                let sink: Arc<dyn ProgressSink> =
                    Arc::new(ChannelProgressSink { out_tx: self.out_tx.clone(), total });
                let content_type = s3term_core::ContentType::guess(&local_path);
                let req = UploadRequest {
                    bucket,
                    key,
                    local_path,
                    content_type: Some(content_type),
                    user_metadata: Default::default(),
                };
                let result = self.engine.upload(req, sink, cancel).await;
                CommandOutcome::TransferDone(result.map_err(classify_transfer_error))
            }
            Command::DeleteObject { bucket, key } => CommandOutcome::TransferDone(
                self.adapter
                    .delete_object(&bucket, &key, &cancel)
                    .await
                    .map(|_| String::new())
                    .map_err(classify_storage_error),
            ),
            Command::GenerateObjectList { bucket: _, listing } => {
                CommandOutcome::ObjectListWritten(write_object_list(&listing))
            }
        };
        log_outcome(&outcome);
        let _ = self.out_tx.send(Msg::CommandResult(outcome));
    }
}

fn log_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Buckets(Ok(buckets)) => info!(count = buckets.len(), "listed buckets"),
        CommandOutcome::Buckets(Err(err)) => warn!(error = %err.raw, "list buckets failed"),
        CommandOutcome::Objects(Ok(page)) => info!(count = page.items.len(), "listed objects"),
        CommandOutcome::Objects(Err(err)) => warn!(error = %err.raw, "list objects failed"),
        CommandOutcome::BucketRegion(Ok(region)) => info!(region = %region.as_str(), "resolved bucket region"),
        CommandOutcome::BucketRegion(Err(err)) => warn!(error = %err.raw, "bucket region lookup failed"),
        CommandOutcome::TransferProgress { .. } => {}
        CommandOutcome::TransferDone(Ok(_)) => info!("transfer completed"),
        CommandOutcome::TransferDone(Err(err)) => warn!(error = %err.raw, "transfer failed"),
        CommandOutcome::ObjectListWritten(Ok(path)) => {
            info!(path = %path.display(), "wrote object list")
        }
        CommandOutcome::ObjectListWritten(Err(err)) => {
            warn!(error = %err.raw, "writing object list failed")
        }
    }
}

fn classify_storage_error(err: s3term_storage::StorageError) -> ErrorRecord {
    s3term_core::classify(&err.raw_message(), err.http_status())
}

fn classify_transfer_error(err: s3term_engine::TransferError) -> ErrorRecord {
    match err {
        s3term_engine::TransferError::Storage(e) => classify_storage_error(e),
        s3term_engine::TransferError::Io(e) => s3term_core::classify_io(&e),
        s3term_engine::TransferError::Validation(message) => ErrorRecord {
            category: s3term_core::ErrorCategory::Validation,
            title: s3term_core::ErrorCategory::Validation.title(),
            user_message: message.clone(),
            suggestion: s3term_core::ErrorCategory::Validation.suggestion(),
            raw: message,
            retryable: false,
            timestamp: chrono::Utc::now(),
        },
        other => s3term_core::classify(&other.to_string(), None),
    }
}

fn write_object_list(items: &[ObjectInfo]) -> Result<PathBuf, ErrorRecord> {
    use std::io::Write;

    let name = format!(
        "ObjectList-{}.txt",
        crate::format::format_timestamp_for_filename(chrono::Utc::now())
    );
    let path = PathBuf::from(&name);
    let mut file =
        std::fs::File::create(&path).map_err(|e| s3term_core::classify_io(&e))?;
    for item in items {
        writeln!(file, "./{},{}", item.key, item.size).map_err(|e| s3term_core::classify_io(&e))?;
    }
    Ok(path)
}
