use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{apply_batch, apply_insert, apply_upsert, TierError, TierKind, TierRecord, TierStore};

/// Process-lifetime table used as the last-resort tier.
///
/// The table is populated from its seed once per process. After [`MemoryTable::clear`] it starts
/// over empty, so records deleted from the cache stay deleted.
#[derive(Debug)]
pub struct MemoryTable<R> {
    seed: Vec<R>,
    rows: RwLock<Option<BTreeMap<String, R>>>,
    initialized: AtomicBool,
}

impl<R: TierRecord> MemoryTable<R> {
    pub fn new() -> Self {
        Self::with_seed(Vec::new())
    }

    pub fn with_seed(seed: Vec<R>) -> Self {
        Self {
            seed,
            rows: RwLock::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    fn seeded(&self) -> BTreeMap<String, R> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return BTreeMap::new();
        }
        self.seed
            .iter()
            .map(|record| (record.record_id().to_string(), record.clone()))
            .collect()
    }

    /// Current contents, or `None` when the table has not been touched since the last clear.
    pub async fn snapshot(&self) -> Option<Vec<R>> {
        self.rows
            .read()
            .await
            .as_ref()
            .map(|rows| rows.values().cloned().collect())
    }

    /// Drops the contents without re-arming the seed.
    pub async fn clear(&self) {
        *self.rows.write().await = None;
    }

    async fn with_rows<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, R>) -> Result<T, TierError>,
    ) -> Result<T, TierError> {
        let mut guard = self.rows.write().await;
        let rows = guard.get_or_insert_with(|| self.seeded());
        apply(rows)
    }
}

impl<R: TierRecord> Default for MemoryTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: TierRecord> TierStore<R> for MemoryTable<R> {
    fn kind(&self) -> TierKind {
        TierKind::Tertiary
    }

    async fn read_all(&self) -> Result<Vec<R>, TierError> {
        self.with_rows(|rows| Ok(rows.values().cloned().collect()))
            .await
    }

    async fn read_one(&self, id: &str) -> Result<Option<R>, TierError> {
        self.with_rows(|rows| Ok(rows.get(id).cloned())).await
    }

    async fn write_all(&self, records: &[R]) -> Result<(), TierError> {
        self.with_rows(|rows| apply_batch(rows, records)).await
    }

    async fn upsert(&self, record: &R) -> Result<(), TierError> {
        self.with_rows(|rows| apply_upsert(rows, record)).await
    }

    async fn insert(&self, record: &R) -> Result<(), TierError> {
        self.with_rows(|rows| apply_insert(rows, record)).await
    }

    async fn delete(&self, id: &str) -> Result<bool, TierError> {
        self.with_rows(|rows| Ok(rows.remove(id).is_some())).await
    }

    async fn count(&self) -> Result<usize, TierError> {
        self.with_rows(|rows| Ok(rows.len())).await
    }
}
