use std::sync::Arc;

use ferry_blob::{BlobKeyStrategy, BlobStore, ByteStream, DefaultKeyStrategy, MemoryBlobStore};
use tokio::io::AsyncWrite;
use tracing::{instrument, warn};

use crate::archive::{ArchiveStreamer, ArchiveSummary};
use crate::chunks::{ChunkAssembler, ChunkUpload};
use crate::clock::{Clock, SystemClock};
use crate::code::{CodeGenerator, RandomCodes};
use crate::repository::{BundleRepository, ChunkRepository};
use crate::{
    Bundle, BundleCode, BundleConfig, BundleRegistry, BundleResult, ChunkReceipt, ConsumeLease,
    FileRef, MemoryRepository, PurgeReport, UploadId,
};

/// Entry point for everything a client can do with bundles
pub struct Ferry {
    registry: Arc<BundleRegistry>,
    assembler: ChunkAssembler,
    archive: ArchiveStreamer,
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
}

impl Ferry {
    /// Start building a `Ferry` over one repository and one blob store
    pub fn builder<R, S>(repo: R, store: S) -> FerryBuilder
    where
        R: BundleRepository + ChunkRepository + 'static,
        S: BlobStore + 'static,
    {
        let repo = Arc::new(repo);
        FerryBuilder {
            bundles: repo.clone(),
            chunks: repo,
            store: Arc::new(store),
            keys: Arc::new(DefaultKeyStrategy),
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomCodes),
            config: BundleConfig::default(),
        }
    }

    /// Everything in memory, default settings
    pub fn in_memory() -> Self {
        Self::builder(MemoryRepository::new(), MemoryBlobStore::new()).build()
    }

    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn keys(&self) -> &Arc<dyn BlobKeyStrategy> {
        &self.keys
    }

    pub fn config(&self) -> &BundleConfig {
        self.registry.config()
    }

    #[instrument(skip_all)]
    pub async fn create_bundle(&self) -> BundleResult<Bundle> {
        self.registry.create().await
    }

    #[instrument(skip_all, fields(code = %code))]
    pub async fn upload_file(
        &self,
        code: &BundleCode,
        display_name: &str,
        stream: ByteStream,
    ) -> BundleResult<FileRef> {
        self.registry.attach_file(code, display_name, stream).await
    }

    /// Accept a chunk for a live bundle
    #[instrument(skip_all, fields(code = %code, upload_id = %upload.upload_id, chunk_index = upload.chunk_index))]
    pub async fn upload_chunk(
        &self,
        code: &BundleCode,
        upload: &ChunkUpload,
        stream: ByteStream,
    ) -> BundleResult<ChunkReceipt> {
        self.registry.live_bundle(code).await?;
        self.assembler.accept_chunk(upload, stream).await
    }

    #[instrument(skip_all, fields(code = %code, upload_id = %upload_id))]
    pub async fn finalize_upload(&self, code: &BundleCode, upload_id: &UploadId) -> BundleResult<FileRef> {
        self.assembler.finalize(code, upload_id).await
    }

    #[instrument(skip_all, fields(code = %code, upload_id = %upload_id))]
    pub async fn abandon_upload(&self, code: &BundleCode, upload_id: &UploadId) -> BundleResult<usize> {
        self.registry.live_bundle(code).await?;
        self.assembler.abandon(upload_id).await
    }

    #[instrument(skip_all, fields(code = %code))]
    pub async fn resolve(&self, code: &BundleCode) -> BundleResult<Vec<FileRef>> {
        self.registry.resolve(code).await
    }

    /// Stream the bundle as a zip into `sink`, exactly once.
    ///
    /// On success the bundle and its blobs are gone. If streaming fails the
    /// bundle is handed back untouched and can be downloaded again until it
    /// expires.
    #[instrument(skip_all, fields(code = %code))]
    pub async fn download<W>(&self, code: &BundleCode, sink: W) -> BundleResult<ArchiveSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let lease = self.begin_download(code).await?;
        self.finish_download(lease, sink).await
    }

    /// First half of [`Ferry::download`]: take the bundle. Transports that must
    /// pick a status code before streaming call this up front.
    pub async fn begin_download(&self, code: &BundleCode) -> BundleResult<ConsumeLease> {
        self.registry.consume(code).await
    }

    /// Second half of [`Ferry::download`]: stream, then complete or release
    pub async fn finish_download<W>(&self, lease: ConsumeLease, sink: W) -> BundleResult<ArchiveSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self.archive.stream(&lease.files, sink).await {
            Ok(summary) => {
                self.registry.complete(&lease).await?;
                Ok(summary)
            }
            Err(e) => {
                warn!(code = %lease.code, error = %e, "Download failed, releasing bundle");
                if let Err(release_err) = self.registry.release(&lease).await {
                    warn!(code = %lease.code, error = %release_err, "Could not release bundle");
                }
                Err(e)
            }
        }
    }

    /// Drop expired bundles and uploads nobody finished
    #[instrument(skip_all)]
    pub async fn purge_expired(&self) -> BundleResult<PurgeReport> {
        let mut report = self.registry.purge_expired().await?;
        let cutoff = self.registry.now() - self.config().ttl;
        report.uploads = self.assembler.purge_stale(cutoff).await?;
        Ok(report)
    }
}

/// Wires the pieces of a [`Ferry`] together
pub struct FerryBuilder {
    bundles: Arc<dyn BundleRepository>,
    chunks: Arc<dyn ChunkRepository>,
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    config: BundleConfig,
}

impl FerryBuilder {
    pub fn with_config(mut self, config: BundleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_codes<G: CodeGenerator + 'static>(mut self, codes: G) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    pub fn with_key_strategy<K: BlobKeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn build(self) -> Ferry {
        let registry = Arc::new(BundleRegistry::new(
            self.bundles,
            self.store.clone(),
            self.keys.clone(),
            self.clock,
            self.codes,
            self.config.clone(),
        ));
        let assembler = ChunkAssembler::new(
            self.chunks,
            self.store.clone(),
            self.keys.clone(),
            registry.clone(),
        );
        let archive = ArchiveStreamer::new(self.store.clone(), self.config.archive_compression);

        Ferry {
            registry,
            assembler,
            archive,
            store: self.store,
            keys: self.keys,
        }
    }
}
