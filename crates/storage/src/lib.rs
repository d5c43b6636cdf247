#![deny(unreachable_pub)]

//! Capability-only storage adapter (C1): the narrow surface the transfer
//! engine and TUI need from the remote object store, hiding the vendor SDK
//! behind a trait so the rest of the workspace can be tested against a fake.

pub mod adapter;
pub mod s3;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use adapter::{
    CancellationToken, DeleteObjectsResult, ListObjectsPage, PartUpload, StorageAdapter,
    StorageError,
};
pub use s3::S3Adapter;

#[cfg(any(test, feature = "test-util"))]
pub use fake::FakeAdapter;
