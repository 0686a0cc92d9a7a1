use ferry_blob::BlobError;
use thiserror::Error;

/// Result type for bundle operations
pub type BundleResult<T> = Result<T, BundleError>;

/// Errors surfaced by the registry, the chunk assembler and the archive streamer
#[derive(Error, Debug)]
pub enum BundleError {
    /// Unknown, expired, consumed or currently downloading code
    #[error("Bundle not found or expired: {code}")]
    NotFound { code: String },

    #[error("Upload {upload_id} is incomplete: {reason}")]
    IncompleteUpload { upload_id: String, reason: String },

    #[error("Storage error: {source}")]
    Storage {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The sink stopped accepting bytes mid-transfer
    #[error("Streaming failed: {reason}")]
    Streaming { reason: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },
}

impl BundleError {
    pub fn not_found<S: Into<String>>(code: S) -> Self {
        Self::NotFound { code: code.into() }
    }

    pub fn incomplete<U: Into<String>, R: Into<String>>(upload_id: U, reason: R) -> Self {
        Self::IncompleteUpload {
            upload_id: upload_id.into(),
            reason: reason.into(),
        }
    }

    /// Wrap any error (or plain message) as a storage failure
    pub fn storage<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Storage {
            source: error.into(),
        }
    }

    pub fn streaming<S: Into<String>>(reason: S) -> Self {
        Self::Streaming {
            reason: reason.into(),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<BlobError> for BundleError {
    fn from(error: BlobError) -> Self {
        Self::storage(error)
    }
}
