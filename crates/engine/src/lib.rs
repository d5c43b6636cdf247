#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Generic worker pool (C2) and transfer engine (C3): chunked upload/download
//! orchestration on top of `s3term-storage`, feeding `s3term-core`'s progress
//! model.

pub mod backoff;
pub mod pool;
pub mod transfer;

pub use backoff::BackoffConfig;
pub use pool::{Job, JobError, JobResult, PoolConfig, SubmitError, WorkerPool};
pub use transfer::{
    DownloadRequest, ProgressSink, TransferEngine, TransferError, UploadRequest,
    DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE, DOWNLOAD_THRESHOLD, UPLOAD_THRESHOLD,
};
