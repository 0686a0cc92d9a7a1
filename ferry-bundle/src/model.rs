use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BundleError, BundleResult};

/// Six ASCII digits naming a bundle. Leading zeros are significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleCode(String);

impl BundleCode {
    pub const LEN: usize = 6;

    /// Parse user input. Anything that is not exactly six digits cannot name a
    /// live bundle, so it is reported as not found.
    pub fn parse(input: &str) -> BundleResult<Self> {
        if input.len() == Self::LEN && input.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(input.to_string()))
        } else {
            Err(BundleError::not_found(input))
        }
    }

    /// Format a number as a zero-padded code, wrapping at one million
    pub fn from_number(n: u32) -> Self {
        Self(format!("{:06}", n % 1_000_000))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BundleCode {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Internal identity of a bundle. Codes get reused after expiry, ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub Uuid);

impl BundleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-chosen id grouping the chunks of one upload.
///
/// It becomes a storage path segment, so only `[A-Za-z0-9_-]` is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub const MAX_LEN: usize = 128;

    pub fn parse(input: &str) -> BundleResult<Self> {
        let valid_chars = input
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if input.is_empty() || input.len() > Self::MAX_LEN || !valid_chars {
            return Err(BundleError::invalid(format!(
                "upload id must be 1-{} characters of [A-Za-z0-9_-]",
                Self::MAX_LEN
            )));
        }
        Ok(Self(input.to_string()))
    }

    /// Fresh random id, for callers that do not pick their own
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UploadId {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Token held by the one download allowed to drain a bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(pub String);

impl LeaseToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BundleState {
    Live,
    /// A download holds the bundle. Completing removes the record, releasing
    /// puts it back to `Live`.
    Consuming {
        lease: LeaseToken,
        since: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub code: BundleCode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Attachment order
    pub files: Vec<FileRef>,
    pub state: BundleState,
}

impl Bundle {
    pub fn new(code: BundleCode, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: BundleId::new(),
            code,
            created_at,
            expires_at,
            files: Vec::new(),
            state: BundleState::Live,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Visible to resolve, attach and consume
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, BundleState::Live) && !self.is_expired(now)
    }

    /// Still owns its code: not expired, and not yet removed by a completed download
    pub fn holds_code(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }
}

/// A finished file attached to a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: FileId,
    pub display_name: String,
    pub blob_path: String,
    pub bundle_id: BundleId,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl FileRef {
    pub fn new(
        bundle_id: BundleId,
        display_name: String,
        blob_path: String,
        size_bytes: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FileId::new(),
            display_name,
            blob_path,
            bundle_id,
            size_bytes,
            created_at,
        }
    }
}

/// One received chunk of an in-progress upload, keyed by `(upload_id, chunk_index)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub upload_id: UploadId,
    pub display_name: String,
    pub blob_path: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub size_bytes: u64,
    pub received_at: DateTime<Utc>,
}

/// Returned when a download takes a bundle
#[derive(Debug, Clone)]
pub struct ConsumeLease {
    pub code: BundleCode,
    pub bundle_id: BundleId,
    pub token: LeaseToken,
    pub files: Vec<FileRef>,
}

/// Acknowledgement for one accepted chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub upload_id: UploadId,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Distinct chunks recorded for this upload so far
    pub chunks_received: usize,
    pub size_bytes: u64,
}

/// Outcome of a housekeeping pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub bundles: usize,
    pub blobs: usize,
    pub uploads: usize,
}

/// Normalise a client-supplied file name for display and archive entries.
///
/// Only the last path component survives, so an entry can never climb out of
/// the extraction directory.
pub fn clean_display_name(raw: &str, max_len: usize) -> BundleResult<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(BundleError::invalid("file name is empty"));
    }
    if last.chars().any(char::is_control) {
        return Err(BundleError::invalid("file name contains control characters"));
    }
    if last.chars().count() > max_len {
        return Err(BundleError::invalid(format!(
            "file name longer than {} characters",
            max_len
        )));
    }
    Ok(last.to_string())
}
