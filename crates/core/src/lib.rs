//! Shared domain types, progress tracking and error classification for `s3term`.
//!
//! This crate has no I/O dependencies: it is imported by the storage adapter,
//! the transfer engine and the TUI binary so that all three agree on one
//! vocabulary for objects, transfers, progress and error categories.

pub mod error;
pub mod model;
pub mod progress;

pub use error::{classify, classify_io, ErrorCategory, ErrorRecord};
pub use model::{
    validate_completed_parts, Bucket, CompletedPart, ContentType, DeleteOutcome, MultipartUpload,
    ObjectInfo, ObjectMetadata, Region, TransferKind, TransferRequest, MAX_PART_NUMBER,
    MIN_PART_NUMBER,
};
pub use progress::{Eta, ProgressState, Terminal};
