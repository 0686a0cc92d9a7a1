use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Bundle, BundleCode, BundleId, BundleResult, ChunkRecord, FileRef, LeaseToken, UploadId};

/// Result of trying to store a freshly created bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another unexpired bundle already holds the code
    CodeTaken,
}

/// Persistence for bundles.
///
/// Every method is one atomic step: the liveness check and the mutation it
/// guards must not be separable by a concurrent caller.
#[async_trait]
pub trait BundleRepository: Send + Sync {
    /// Store `bundle` unless its code is still held by an unexpired bundle
    async fn insert_bundle(&self, bundle: Bundle, now: DateTime<Utc>) -> BundleResult<InsertOutcome>;

    /// Snapshot of the live bundle behind `code`
    async fn find_live(&self, code: &BundleCode, now: DateTime<Utc>) -> BundleResult<Option<Bundle>>;

    /// Append a file if `code` still names the live bundle `file.bundle_id`.
    /// Returns false when it does not.
    async fn add_file(&self, code: &BundleCode, file: FileRef, now: DateTime<Utc>) -> BundleResult<bool>;

    /// Flip a live bundle to consuming under `lease` and return its snapshot
    async fn consume(
        &self,
        code: &BundleCode,
        lease: &LeaseToken,
        now: DateTime<Utc>,
    ) -> BundleResult<Option<Bundle>>;

    /// Remove a bundle held under `lease`, returning what was removed
    async fn complete(&self, id: BundleId, lease: &LeaseToken) -> BundleResult<Option<Bundle>>;

    /// Put a bundle held under `lease` back to live
    async fn release(&self, id: BundleId, lease: &LeaseToken) -> BundleResult<bool>;

    /// Remove and return expired bundles. Consuming bundles are only taken once
    /// their lease started before `stale_lease_before`.
    async fn take_expired(
        &self,
        now: DateTime<Utc>,
        stale_lease_before: DateTime<Utc>,
    ) -> BundleResult<Vec<Bundle>>;
}

/// Persistence for chunk records of in-progress uploads
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Insert or replace the record for `(upload_id, chunk_index)`.
    /// Returns how many distinct chunks the upload now has.
    async fn upsert_chunk(&self, record: ChunkRecord) -> BundleResult<usize>;

    /// All records of an upload ordered by chunk index
    async fn chunks_for_upload(&self, upload_id: &UploadId) -> BundleResult<Vec<ChunkRecord>>;

    /// Remove all records of an upload, returning them
    async fn delete_chunks(&self, upload_id: &UploadId) -> BundleResult<Vec<ChunkRecord>>;

    /// Uploads whose newest chunk arrived before `received_before`
    async fn stale_uploads(&self, received_before: DateTime<Utc>) -> BundleResult<Vec<UploadId>>;
}
