use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::repository::{BundleRepository, ChunkRepository, InsertOutcome};
use crate::{
    Bundle, BundleCode, BundleId, BundleResult, BundleState, ChunkRecord, FileRef, LeaseToken,
    UploadId,
};

#[derive(Default)]
struct BundleTable {
    by_id: HashMap<BundleId, Bundle>,
    /// Latest bundle issued each code. Stale entries are harmless; lookups
    /// always re-check the bundle itself.
    by_code: HashMap<BundleCode, BundleId>,
}

impl BundleTable {
    fn current(&self, code: &BundleCode) -> Option<&Bundle> {
        self.by_code.get(code).and_then(|id| self.by_id.get(id))
    }

    fn current_mut(&mut self, code: &BundleCode) -> Option<&mut Bundle> {
        let id = self.by_code.get(code)?;
        self.by_id.get_mut(id)
    }

    fn remove(&mut self, id: BundleId) -> Option<Bundle> {
        let bundle = self.by_id.remove(&id)?;
        if self.by_code.get(&bundle.code) == Some(&id) {
            self.by_code.remove(&bundle.code);
        }
        Some(bundle)
    }
}

type ChunkTable = HashMap<UploadId, BTreeMap<u32, ChunkRecord>>;

/// In-memory repository for bundles and chunk records
#[derive(Clone, Default)]
pub struct MemoryRepository {
    bundles: Arc<RwLock<BundleTable>>,
    chunks: Arc<RwLock<ChunkTable>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bundle records held, live or not
    pub fn bundle_count(&self) -> usize {
        self.bundles.read().by_id.len()
    }

    /// Number of uploads with at least one chunk record
    pub fn upload_count(&self) -> usize {
        self.chunks.read().len()
    }
}

#[async_trait]
impl BundleRepository for MemoryRepository {
    async fn insert_bundle(&self, bundle: Bundle, now: DateTime<Utc>) -> BundleResult<InsertOutcome> {
        let mut table = self.bundles.write();
        if table.current(&bundle.code).is_some_and(|b| b.holds_code(now)) {
            return Ok(InsertOutcome::CodeTaken);
        }

        table.by_code.insert(bundle.code.clone(), bundle.id);
        table.by_id.insert(bundle.id, bundle);
        Ok(InsertOutcome::Inserted)
    }

    async fn find_live(&self, code: &BundleCode, now: DateTime<Utc>) -> BundleResult<Option<Bundle>> {
        let table = self.bundles.read();
        Ok(table.current(code).filter(|b| b.is_live(now)).cloned())
    }

    async fn add_file(&self, code: &BundleCode, file: FileRef, now: DateTime<Utc>) -> BundleResult<bool> {
        let mut table = self.bundles.write();
        match table.current_mut(code) {
            Some(bundle) if bundle.id == file.bundle_id && bundle.is_live(now) => {
                bundle.files.push(file);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume(
        &self,
        code: &BundleCode,
        lease: &LeaseToken,
        now: DateTime<Utc>,
    ) -> BundleResult<Option<Bundle>> {
        let mut table = self.bundles.write();
        match table.current_mut(code) {
            Some(bundle) if bundle.is_live(now) => {
                bundle.state = BundleState::Consuming {
                    lease: lease.clone(),
                    since: now,
                };
                Ok(Some(bundle.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete(&self, id: BundleId, lease: &LeaseToken) -> BundleResult<Option<Bundle>> {
        let mut table = self.bundles.write();
        let held = matches!(
            table.by_id.get(&id).map(|b| &b.state),
            Some(BundleState::Consuming { lease: current, .. }) if current == lease
        );
        Ok(if held { table.remove(id) } else { None })
    }

    async fn release(&self, id: BundleId, lease: &LeaseToken) -> BundleResult<bool> {
        let mut table = self.bundles.write();
        match table.by_id.get_mut(&id) {
            Some(bundle) => match &bundle.state {
                BundleState::Consuming { lease: current, .. } if current == lease => {
                    bundle.state = BundleState::Live;
                    Ok(true)
                }
                _ => Ok(false),
            },
            None => Ok(false),
        }
    }

    async fn take_expired(
        &self,
        now: DateTime<Utc>,
        stale_lease_before: DateTime<Utc>,
    ) -> BundleResult<Vec<Bundle>> {
        let mut table = self.bundles.write();
        let doomed: Vec<BundleId> = table
            .by_id
            .values()
            .filter(|b| b.is_expired(now))
            .filter(|b| match &b.state {
                BundleState::Live => true,
                BundleState::Consuming { since, .. } => *since < stale_lease_before,
            })
            .map(|b| b.id)
            .collect();

        Ok(doomed.into_iter().filter_map(|id| table.remove(id)).collect())
    }
}

#[async_trait]
impl ChunkRepository for MemoryRepository {
    async fn upsert_chunk(&self, record: ChunkRecord) -> BundleResult<usize> {
        let mut chunks = self.chunks.write();
        let upload = chunks.entry(record.upload_id.clone()).or_default();
        upload.insert(record.chunk_index, record);
        Ok(upload.len())
    }

    async fn chunks_for_upload(&self, upload_id: &UploadId) -> BundleResult<Vec<ChunkRecord>> {
        let chunks = self.chunks.read();
        Ok(chunks
            .get(upload_id)
            .map(|upload| upload.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_chunks(&self, upload_id: &UploadId) -> BundleResult<Vec<ChunkRecord>> {
        let removed = self.chunks.write().remove(upload_id);
        Ok(removed
            .map(|upload| upload.into_values().collect())
            .unwrap_or_default())
    }

    async fn stale_uploads(&self, received_before: DateTime<Utc>) -> BundleResult<Vec<UploadId>> {
        let chunks = self.chunks.read();
        let mut stale: Vec<UploadId> = chunks
            .iter()
            .filter(|(_, upload)| {
                upload
                    .values()
                    .map(|r| r.received_at)
                    .max()
                    .is_some_and(|newest| newest < received_before)
            })
            .map(|(id, _)| id.clone())
            .collect();
        stale.sort();
        Ok(stale)
    }
}
