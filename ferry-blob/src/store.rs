use async_trait::async_trait;
use uuid::Uuid;

use crate::{BlobResult, ByteStream};

/// Core blob storage operations - must be implemented by all storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob from a stream, replacing any blob already under `key`
    async fn put(&self, key: &str, stream: ByteStream) -> BlobResult<PutResult>;

    /// Open a blob as a stream. Missing blobs yield `BlobError::NotFound`.
    async fn get(&self, key: &str) -> BlobResult<GetResult>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Check whether a blob exists
    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Remove every blob under `prefix` (a staging directory)
    async fn delete_prefix(&self, prefix: &str) -> BlobResult<()>;
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub size_bytes: u64,
}

/// Result of a get operation
pub struct GetResult {
    pub stream: ByteStream,
    pub size_bytes: u64,
}

impl std::fmt::Debug for GetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetResult")
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

/// Strategy for generating blob keys
pub trait BlobKeyStrategy: Send + Sync {
    /// Key for a finished file. Must not collide for two files sharing a name.
    fn file_key(&self, display_name: &str) -> String;

    /// Key for one chunk of an in-progress upload
    fn chunk_key(&self, upload_id: &str, chunk_index: u32) -> String;

    /// Prefix holding every chunk of one upload
    fn staging_prefix(&self, upload_id: &str) -> String;

    /// Scratch key for bytes that arrive before we know where they belong
    fn spool_key(&self) -> String;
}

/// Default layout: `files/{random}_{name}`, `chunks/{upload}/part-{index}`
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyStrategy;

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn file_key(&self, display_name: &str) -> String {
        format!("files/{}_{}", Uuid::new_v4().simple(), safe_segment(display_name))
    }

    fn chunk_key(&self, upload_id: &str, chunk_index: u32) -> String {
        format!("{}/part-{:06}", self.staging_prefix(upload_id), chunk_index)
    }

    fn staging_prefix(&self, upload_id: &str) -> String {
        format!("chunks/{}", upload_id)
    }

    fn spool_key(&self) -> String {
        format!("incoming/{}", Uuid::new_v4().simple())
    }
}

const MAX_SEGMENT_LEN: usize = 100;

/// Reduce a user-supplied file name to something safe as one key segment.
///
/// Keeps the last path component, maps anything outside `[A-Za-z0-9._-]` to
/// `_` and caps the length. The original name is kept on the file record; this
/// is only for the storage key.
pub fn safe_segment(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut out: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(MAX_SEGMENT_LEN)
        .collect();
    if out.chars().all(|c| c == '.') {
        out = "file".to_string();
    }
    out
}
