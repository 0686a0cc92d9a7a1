use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use parking_lot::RwLock;

use crate::types::validate_key;
use crate::{BlobConfig, BlobError, BlobResult, BlobStore, ByteStream, GetResult, PutResult};

/// In-memory blob store for tests and local development
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    config: BlobConfig,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BlobConfig) -> Self {
        Self {
            blobs: Arc::default(),
            config,
        }
    }

    /// Sorted list of stored keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, mut stream: ByteStream) -> BlobResult<PutResult> {
        validate_key(key)?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let size_bytes = buf.len() as u64;

        self.blobs.write().insert(key.to_string(), buf.freeze());
        Ok(PutResult { size_bytes })
    }

    async fn get(&self, key: &str) -> BlobResult<GetResult> {
        validate_key(key)?;

        let data = self
            .blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::not_found(key))?;

        // Hand out the blob in buffer-sized slices of the shared allocation
        let step = self.config.read_buffer_bytes.max(1);
        let parts: Vec<Result<Bytes, std::io::Error>> = (0..data.len())
            .step_by(step)
            .map(|start| Ok(data.slice(start..(start + step).min(data.len()))))
            .collect();

        Ok(GetResult {
            stream: Box::pin(futures::stream::iter(parts)),
            size_bytes: data.len() as u64,
        })
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        validate_key(key)?;
        self.blobs.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        validate_key(key)?;
        Ok(self.blobs.read().contains_key(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> BlobResult<()> {
        validate_key(prefix)?;
        let nested = format!("{}/", prefix);
        self.blobs
            .write()
            .retain(|key, _| key != prefix && !key.starts_with(&nested));
        Ok(())
    }
}
