use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use ferry_blob::{BlobKeyStrategy, BlobStore, ByteStream};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::code::CodeGenerator;
use crate::repository::{BundleRepository, InsertOutcome};
use crate::{
    clean_display_name, Bundle, BundleCode, BundleConfig, BundleError, BundleResult,
    ConsumeLease, FileRef, LeaseToken, PurgeReport,
};

/// Owns bundle lifecycles: creation, attachment, lookup and the one-time
/// consume handshake.
pub struct BundleRegistry {
    repo: Arc<dyn BundleRepository>,
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn BlobKeyStrategy>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    config: BundleConfig,
}

impl BundleRegistry {
    pub fn new(
        repo: Arc<dyn BundleRepository>,
        store: Arc<dyn BlobStore>,
        keys: Arc<dyn BlobKeyStrategy>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        config: BundleConfig,
    ) -> Self {
        Self {
            repo,
            store,
            keys,
            clock,
            codes,
            config,
        }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create an empty bundle under a fresh code
    pub async fn create(&self) -> BundleResult<Bundle> {
        let created_at = self.now().trunc_subsecs(0);
        let expires_at = created_at + self.config.ttl;

        for attempt in 1..=self.config.code_attempts {
            let bundle = Bundle::new(self.codes.next_code(), created_at, expires_at);
            match self.repo.insert_bundle(bundle.clone(), created_at).await? {
                InsertOutcome::Inserted => {
                    info!(code = %bundle.code, expires_at = %bundle.expires_at, "Bundle created");
                    return Ok(bundle);
                }
                InsertOutcome::CodeTaken => {
                    debug!(code = %bundle.code, attempt, "Code already in use, retrying");
                }
            }
        }

        Err(BundleError::storage(format!(
            "no free bundle code after {} attempts",
            self.config.code_attempts
        )))
    }

    /// The live bundle behind `code`, or `NotFound`
    pub async fn live_bundle(&self, code: &BundleCode) -> BundleResult<Bundle> {
        self.repo
            .find_live(code, self.now())
            .await?
            .ok_or_else(|| BundleError::not_found(code.as_str()))
    }

    /// Store a whole file and attach it to the bundle
    pub async fn attach_file(
        &self,
        code: &BundleCode,
        display_name: &str,
        stream: ByteStream,
    ) -> BundleResult<FileRef> {
        let display_name = clean_display_name(display_name, self.config.max_display_name_len)?;
        let bundle = self.live_bundle(code).await?;

        let key = self.keys.file_key(&display_name);
        let put = match self.store.put(&key, stream).await {
            Ok(put) => put,
            Err(e) => {
                self.discard_blob(&key).await;
                return Err(e.into());
            }
        };

        self.register_blob(&bundle, display_name, key, put.size_bytes).await
    }

    /// Attach a blob that was already written under `blob_path`
    pub async fn register_file(
        &self,
        code: &BundleCode,
        display_name: &str,
        blob_path: String,
        size_bytes: u64,
    ) -> BundleResult<FileRef> {
        let display_name = clean_display_name(display_name, self.config.max_display_name_len)?;
        let bundle = match self.live_bundle(code).await {
            Ok(bundle) => bundle,
            Err(e) => {
                self.discard_blob(&blob_path).await;
                return Err(e);
            }
        };
        self.register_blob(&bundle, display_name, blob_path, size_bytes).await
    }

    /// Record the file. The blob is deleted again if the bundle died meanwhile.
    pub(crate) async fn register_blob(
        &self,
        bundle: &Bundle,
        display_name: String,
        blob_path: String,
        size_bytes: u64,
    ) -> BundleResult<FileRef> {
        let file = FileRef::new(bundle.id, display_name, blob_path, size_bytes, self.now());

        match self.repo.add_file(&bundle.code, file.clone(), self.now()).await {
            Ok(true) => {
                info!(
                    code = %bundle.code,
                    file = %file.display_name,
                    size_bytes = file.size_bytes,
                    "File attached"
                );
                Ok(file)
            }
            Ok(false) => {
                self.discard_blob(&file.blob_path).await;
                Err(BundleError::not_found(bundle.code.as_str()))
            }
            Err(e) => {
                self.discard_blob(&file.blob_path).await;
                Err(e)
            }
        }
    }

    /// Files of a live bundle in attachment order
    pub async fn resolve(&self, code: &BundleCode) -> BundleResult<Vec<FileRef>> {
        Ok(self.live_bundle(code).await?.files)
    }

    /// Take the bundle for a download. Nobody else can see it afterwards
    /// unless the lease is released.
    pub async fn consume(&self, code: &BundleCode) -> BundleResult<ConsumeLease> {
        let token = LeaseToken::new();
        let bundle = self
            .repo
            .consume(code, &token, self.now())
            .await?
            .ok_or_else(|| BundleError::not_found(code.as_str()))?;

        info!(code = %code, files = bundle.files.len(), "Bundle consumed");
        Ok(ConsumeLease {
            code: bundle.code,
            bundle_id: bundle.id,
            token,
            files: bundle.files,
        })
    }

    /// Finish a download: drop the record and every blob it referenced
    pub async fn complete(&self, lease: &ConsumeLease) -> BundleResult<()> {
        let bundle = self
            .repo
            .complete(lease.bundle_id, &lease.token)
            .await?
            .ok_or_else(|| BundleError::not_found(lease.code.as_str()))?;

        let removed = self.delete_blobs(&bundle.files).await;
        info!(code = %bundle.code, blobs = removed, "Bundle completed");
        Ok(())
    }

    /// Give a bundle back after a failed download
    pub async fn release(&self, lease: &ConsumeLease) -> BundleResult<()> {
        if self.repo.release(lease.bundle_id, &lease.token).await? {
            info!(code = %lease.code, "Bundle released");
            Ok(())
        } else {
            Err(BundleError::not_found(lease.code.as_str()))
        }
    }

    /// Remove expired bundles and their blobs
    pub async fn purge_expired(&self) -> BundleResult<PurgeReport> {
        let now = self.now();
        let expired = self.repo.take_expired(now, now - self.config.ttl).await?;

        let mut report = PurgeReport::default();
        for bundle in &expired {
            report.blobs += self.delete_blobs(&bundle.files).await;
            report.bundles += 1;
            debug!(code = %bundle.code, "Expired bundle purged");
        }
        if report.bundles > 0 {
            info!(bundles = report.bundles, blobs = report.blobs, "Purged expired bundles");
        }
        Ok(report)
    }

    async fn delete_blobs(&self, files: &[FileRef]) -> usize {
        let mut removed = 0;
        for file in files {
            match self.store.delete(&file.blob_path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %file.blob_path, error = %e, "Failed to delete blob"),
            }
        }
        removed
    }

    async fn discard_blob(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, error = %e, "Failed to discard orphaned blob");
        }
    }
}
