use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ferry_blob::{BlobKeyStrategy, BlobStore, ByteStream};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::repository::ChunkRepository;
use crate::{
    clean_display_name, BundleCode, BundleConfig, BundleError, BundleRegistry, BundleResult,
    ChunkReceipt, ChunkRecord, FileRef, UploadId,
};

/// Metadata sent with every chunk of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpload {
    pub upload_id: UploadId,
    pub display_name: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

/// Collects chunks of an upload and stitches them into one file on finalize
pub struct ChunkAssembler {
    chunks: Arc<dyn ChunkRepository>,
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    registry: Arc<BundleRegistry>,
    /// Uploads with a finalize in flight
    finalizing: Mutex<HashSet<UploadId>>,
}

impl ChunkAssembler {
    pub fn new(
        chunks: Arc<dyn ChunkRepository>,
        store: Arc<dyn BlobStore>,
        keys: Arc<dyn BlobKeyStrategy>,
        registry: Arc<BundleRegistry>,
    ) -> Self {
        Self {
            chunks,
            store,
            keys,
            registry,
            finalizing: Mutex::new(HashSet::new()),
        }
    }

    fn config(&self) -> &BundleConfig {
        self.registry.config()
    }

    /// Store one chunk. Re-sending an index replaces the earlier copy.
    pub async fn accept_chunk(&self, upload: &ChunkUpload, stream: ByteStream) -> BundleResult<ChunkReceipt> {
        let max_chunks = self.config().max_chunks;
        if upload.total_chunks == 0 || upload.total_chunks > max_chunks {
            return Err(BundleError::invalid(format!(
                "total chunks must be between 1 and {}",
                max_chunks
            )));
        }
        if upload.chunk_index >= upload.total_chunks {
            return Err(BundleError::invalid(format!(
                "chunk index {} out of range for {} chunks",
                upload.chunk_index, upload.total_chunks
            )));
        }
        let display_name = clean_display_name(&upload.display_name, self.config().max_display_name_len)?;

        let key = self.keys.chunk_key(upload.upload_id.as_str(), upload.chunk_index);
        let put = self.store.put(&key, stream).await?;

        let record = ChunkRecord {
            upload_id: upload.upload_id.clone(),
            display_name,
            blob_path: key,
            chunk_index: upload.chunk_index,
            total_chunks: upload.total_chunks,
            size_bytes: put.size_bytes,
            received_at: self.registry.now(),
        };
        let chunks_received = self.chunks.upsert_chunk(record).await?;

        debug!(
            upload_id = %upload.upload_id,
            chunk_index = upload.chunk_index,
            total_chunks = upload.total_chunks,
            chunks_received,
            "Chunk accepted"
        );
        Ok(ChunkReceipt {
            upload_id: upload.upload_id.clone(),
            chunk_index: upload.chunk_index,
            total_chunks: upload.total_chunks,
            chunks_received,
            size_bytes: put.size_bytes,
        })
    }

    /// Reassemble a complete upload in index order and attach it to the bundle
    pub async fn finalize(&self, code: &BundleCode, upload_id: &UploadId) -> BundleResult<FileRef> {
        let _claim = FinalizeClaim::acquire(&self.finalizing, upload_id)?;

        // Dead bundle: leave the chunks alone
        let bundle = self.registry.live_bundle(code).await?;

        let records = self.chunks.chunks_for_upload(upload_id).await?;
        let display_name = check_complete(upload_id, &records)?;

        let final_key = self.keys.file_key(&display_name);
        let part_keys = records.iter().map(|r| r.blob_path.clone()).collect();
        let put = match self.store.put(&final_key, self.drain_parts(part_keys)).await {
            Ok(put) => put,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&final_key).await {
                    warn!(key = %final_key, error = %cleanup, "Failed to remove partial file");
                }
                // Parts already read are gone, so the records no longer describe anything
                if let Err(cleanup) = self.abandon(upload_id).await {
                    warn!(upload_id = %upload_id, error = %cleanup, "Failed to drop chunks after failed finalize");
                }
                return Err(e.into());
            }
        };

        self.chunks.delete_chunks(upload_id).await?;
        self.remove_staging(upload_id).await;

        let file = self
            .registry
            .register_blob(&bundle, display_name, final_key, put.size_bytes)
            .await?;
        info!(
            code = %code,
            upload_id = %upload_id,
            chunks = records.len(),
            size_bytes = file.size_bytes,
            "Upload finalized"
        );
        Ok(file)
    }

    /// Drop every chunk of an upload. Returns how many records were removed.
    pub async fn abandon(&self, upload_id: &UploadId) -> BundleResult<usize> {
        let removed = self.chunks.delete_chunks(upload_id).await?;
        for record in &removed {
            if let Err(e) = self.store.delete(&record.blob_path).await {
                warn!(key = %record.blob_path, error = %e, "Failed to delete chunk");
            }
        }
        self.remove_staging(upload_id).await;

        info!(upload_id = %upload_id, chunks = removed.len(), "Upload abandoned");
        Ok(removed.len())
    }

    /// Abandon uploads that have not received a chunk since `received_before`
    pub async fn purge_stale(&self, received_before: DateTime<Utc>) -> BundleResult<usize> {
        let stale = self.chunks.stale_uploads(received_before).await?;
        let mut purged = 0;
        for upload_id in &stale {
            let busy = self.finalizing.lock().contains(upload_id);
            if busy {
                continue;
            }
            self.abandon(upload_id).await?;
            purged += 1;
        }
        Ok(purged)
    }

    /// Stream the parts back to back, deleting each one once it has been read
    fn drain_parts(&self, part_keys: Vec<String>) -> ByteStream {
        let store = Arc::clone(&self.store);
        let stream = async_stream::stream! {
            for key in part_keys {
                match store.get(&key).await {
                    Ok(part) => {
                        let mut part_stream = part.stream;
                        while let Some(chunk) = part_stream.next().await {
                            let failed = chunk.is_err();
                            yield chunk;
                            if failed {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("Failed to read part {}: {}", key, e)
                        ));
                        return;
                    }
                }
                if let Err(e) = store.delete(&key).await {
                    warn!(key = %key, error = %e, "Failed to delete assembled chunk");
                }
            }
        };
        Box::pin(stream)
    }

    async fn remove_staging(&self, upload_id: &UploadId) {
        let prefix = self.keys.staging_prefix(upload_id.as_str());
        if let Err(e) = self.store.delete_prefix(&prefix).await {
            warn!(prefix = %prefix, error = %e, "Failed to remove staging area");
        }
    }
}

/// Marks an upload as being finalized for as long as it lives
struct FinalizeClaim<'a> {
    set: &'a Mutex<HashSet<UploadId>>,
    upload_id: UploadId,
}

impl<'a> FinalizeClaim<'a> {
    fn acquire(set: &'a Mutex<HashSet<UploadId>>, upload_id: &UploadId) -> BundleResult<Self> {
        if !set.lock().insert(upload_id.clone()) {
            return Err(BundleError::incomplete(
                upload_id.as_str(),
                "finalize already in progress",
            ));
        }
        Ok(Self {
            set,
            upload_id: upload_id.clone(),
        })
    }
}

impl Drop for FinalizeClaim<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.upload_id);
    }
}

/// Check that `records` (ordered by index) form exactly `0..total_chunks` of
/// one file. Returns the agreed display name.
fn check_complete(upload_id: &UploadId, records: &[ChunkRecord]) -> BundleResult<String> {
    let incomplete = |reason: String| BundleError::incomplete(upload_id.as_str(), reason);

    let first = records
        .first()
        .ok_or_else(|| incomplete("no chunks received".to_string()))?;

    if records.iter().any(|r| r.total_chunks != first.total_chunks) {
        return Err(incomplete("chunks disagree on the total chunk count".to_string()));
    }
    if records.iter().any(|r| r.display_name != first.display_name) {
        return Err(incomplete("chunks disagree on the file name".to_string()));
    }

    let total = first.total_chunks;
    let in_order = records
        .iter()
        .enumerate()
        .all(|(position, r)| r.chunk_index as usize == position);
    if records.len() != total as usize || !in_order {
        let present: HashSet<u32> = records.iter().map(|r| r.chunk_index).collect();
        let missing: Vec<String> = (0..total)
            .filter(|i| !present.contains(i))
            .take(10)
            .map(|i| i.to_string())
            .collect();
        return Err(incomplete(format!(
            "received {} of {} chunks, missing [{}]",
            records.len(),
            total,
            missing.join(", ")
        )));
    }

    Ok(first.display_name.clone())
}
