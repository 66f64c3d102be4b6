use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::{MemoryTable, TierError, TierKind, TierPolicy, TierRecord, TierStore};

/// Result of a read, tagged with the tier that served it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierRead<T> {
    pub data: T,
    pub tier: TierKind,
}

impl<T> TierRead<T> {
    pub fn degraded(&self) -> bool {
        self.tier.is_degraded()
    }

    pub fn map<U>(self, apply: impl FnOnce(T) -> U) -> TierRead<U> {
        TierRead {
            data: apply(self.data),
            tier: self.tier,
        }
    }
}

/// Result of a write: the authoritative outcome plus every tier that recorded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierWrite<T> {
    pub outcome: T,
    pub recorded_in: Vec<TierKind>,
}

impl<T> TierWrite<T> {
    /// The tier whose answer the caller received.
    pub fn authoritative(&self) -> Option<TierKind> {
        self.recorded_in.first().copied()
    }
}

enum WriteOp<'a, R> {
    WriteAll(&'a [R]),
    Upsert(&'a R),
    Insert(&'a R),
    Delete(&'a str),
}

// Only references inside, so no `R: Copy` bound.
impl<R> Clone for WriteOp<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for WriteOp<'_, R> {}

impl<R> WriteOp<'_, R> {
    fn name(&self) -> &'static str {
        match self {
            WriteOp::WriteAll(_) => "write_all",
            WriteOp::Upsert(_) => "upsert",
            WriteOp::Insert(_) => "insert",
            WriteOp::Delete(_) => "delete",
        }
    }
}

async fn apply<R: TierRecord>(
    store: &dyn TierStore<R>,
    op: WriteOp<'_, R>,
) -> Result<bool, TierError> {
    match op {
        WriteOp::WriteAll(records) => store.write_all(records).await.map(|_| true),
        WriteOp::Upsert(record) => store.upsert(record).await.map(|_| true),
        WriteOp::Insert(record) => store.insert(record).await.map(|_| true),
        WriteOp::Delete(id) => store.delete(id).await,
    }
}

/// Routes reads and writes for one record family across the configured tiers.
///
/// Tier choice is re-evaluated on every call. The tertiary cache belongs to the accessor and
/// is handed in by the caller, so its single-process scope is explicit.
pub struct TierAccessor<R: TierRecord> {
    primary: Option<Arc<dyn TierStore<R>>>,
    secondary: Option<Arc<dyn TierStore<R>>>,
    cache: Arc<MemoryTable<R>>,
    policy: TierPolicy,
    seed: Arc<[R]>,
    last_read: RwLock<Option<TierKind>>,
}

impl<R: TierRecord> TierAccessor<R> {
    pub fn new(cache: Arc<MemoryTable<R>>, policy: TierPolicy) -> Self {
        Self {
            primary: None,
            secondary: None,
            cache,
            policy,
            seed: Arc::from(Vec::new()),
            last_read: RwLock::new(None),
        }
    }

    pub fn with_primary(mut self, store: Arc<dyn TierStore<R>>) -> Self {
        self.primary = Some(store);
        self
    }

    pub fn with_secondary(mut self, store: Arc<dyn TierStore<R>>) -> Self {
        self.secondary = Some(store);
        self
    }

    /// Records the collection is expected to contain; an empty primary read triggers a
    /// bootstrap from this set.
    pub fn with_seed(mut self, seed: impl Into<Arc<[R]>>) -> Self {
        self.seed = seed.into();
        self
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    pub fn seed(&self) -> &[R] {
        &self.seed
    }

    pub fn primary(&self) -> Option<Arc<dyn TierStore<R>>> {
        self.primary.clone()
    }

    pub fn cache(&self) -> &Arc<MemoryTable<R>> {
        &self.cache
    }

    /// Tier used by the most recent successful read, if any.
    pub async fn last_read_tier(&self) -> Option<TierKind> {
        *self.last_read.read().await
    }

    /// Drops cached rows and the remembered read tier so the next read starts from the top.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        *self.last_read.write().await = None;
    }

    fn store(&self, tier: TierKind) -> Option<Arc<dyn TierStore<R>>> {
        match tier {
            TierKind::Primary => self.primary.clone(),
            TierKind::Secondary => self.secondary.clone(),
            TierKind::Tertiary => Some(self.cache.clone() as Arc<dyn TierStore<R>>),
        }
    }

    async fn remember(&self, tier: TierKind) {
        *self.last_read.write().await = Some(tier);
    }

    /// Whether a failure at `tier` ends the call instead of falling through.
    fn halts(&self, tier: TierKind) -> bool {
        tier == TierKind::Primary && self.policy.fails_hard()
    }

    pub async fn read_all(&self) -> Result<TierRead<Vec<R>>, TierError> {
        let mut last_error = None;

        for &tier in self.policy.order() {
            let Some(store) = self.store(tier) else {
                if self.halts(tier) {
                    return Err(TierError::NotConfigured(tier));
                }
                continue;
            };

            let outcome = match tier {
                TierKind::Primary => self.read_primary(store.as_ref()).await,
                // Lower tiers seed themselves; an empty read is an empty collection.
                _ => store.read_all().await,
            };

            match outcome {
                Ok(data) => {
                    debug!(collection = R::COLLECTION, %tier, rows = data.len(), "read served");
                    self.remember(tier).await;
                    return Ok(TierRead { data, tier });
                }
                Err(err) if err.is_unavailable() => {
                    if self.halts(tier) {
                        error!(collection = R::COLLECTION, error = %err, "primary store unavailable and fallback is disabled");
                        return Err(err);
                    }
                    warn!(collection = R::COLLECTION, %tier, error = %err, "tier unavailable; falling back");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        error!(collection = R::COLLECTION, "every tier failed to serve read");
        Err(last_error.unwrap_or(TierError::NotConfigured(TierKind::Tertiary)))
    }

    /// Reads from the primary, bootstrapping it from the seed once when it fails or comes back
    /// empty for a seeded collection, then retrying exactly once.
    async fn read_primary(&self, store: &dyn TierStore<R>) -> Result<Vec<R>, TierError> {
        match store.read_all().await {
            Ok(rows) if !rows.is_empty() || self.seed.is_empty() => return Ok(rows),
            Ok(_) => {
                warn!(collection = R::COLLECTION, "primary store is empty; bootstrapping from seed")
            }
            Err(err) if err.is_unavailable() => {
                warn!(collection = R::COLLECTION, error = %err, "primary read failed; bootstrapping before retry")
            }
            Err(err) => return Err(err),
        }

        if !self.seed.is_empty() {
            match crate::workflows::pipeline::reconciler::seed_missing(store, &self.seed).await {
                Ok(outcome) => {
                    debug!(collection = R::COLLECTION, inserted = outcome.inserted, "primary bootstrap applied")
                }
                Err(err) => {
                    warn!(collection = R::COLLECTION, error = %err, "primary bootstrap failed")
                }
            }
        }

        store.read_all().await
    }

    pub async fn read_one(&self, id: &str) -> Result<TierRead<Option<R>>, TierError> {
        let mut last_error = None;

        for &tier in self.policy.order() {
            let Some(store) = self.store(tier) else {
                if self.halts(tier) {
                    return Err(TierError::NotConfigured(tier));
                }
                continue;
            };

            let mut outcome = store.read_one(id).await;
            if tier == TierKind::Primary {
                if let Err(err) = &outcome {
                    if err.is_unavailable() {
                        warn!(collection = R::COLLECTION, id, error = %err, "primary lookup failed; retrying once");
                        outcome = store.read_one(id).await;
                    }
                }
            }

            match outcome {
                Ok(data) => {
                    self.remember(tier).await;
                    return Ok(TierRead { data, tier });
                }
                Err(err) if err.is_unavailable() => {
                    if self.halts(tier) {
                        error!(collection = R::COLLECTION, id, error = %err, "primary store unavailable and fallback is disabled");
                        return Err(err);
                    }
                    warn!(collection = R::COLLECTION, %tier, id, error = %err, "tier unavailable; falling back");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or(TierError::NotConfigured(TierKind::Tertiary)))
    }

    pub async fn write_all(&self, records: &[R]) -> Result<TierWrite<()>, TierError> {
        self.write(WriteOp::WriteAll(records))
            .await
            .map(|write| TierWrite {
                outcome: (),
                recorded_in: write.recorded_in,
            })
    }

    /// Idempotent on the record id.
    pub async fn upsert(&self, record: &R) -> Result<TierWrite<()>, TierError> {
        self.write(WriteOp::Upsert(record))
            .await
            .map(|write| TierWrite {
                outcome: (),
                recorded_in: write.recorded_in,
            })
    }

    pub async fn insert(&self, record: &R) -> Result<TierWrite<()>, TierError> {
        self.write(WriteOp::Insert(record))
            .await
            .map(|write| TierWrite {
                outcome: (),
                recorded_in: write.recorded_in,
            })
    }

    /// `outcome` reports whether the authoritative tier held the record.
    pub async fn delete(&self, id: &str) -> Result<TierWrite<bool>, TierError> {
        self.write(WriteOp::Delete(id)).await
    }

    /// Attempts the primary first, then every reachable tier at or below the tier of the last
    /// successful read. The first tier that answers is authoritative: its conflicts surface to
    /// the caller, while failures in the tiers after it are logged and skipped.
    async fn write(&self, op: WriteOp<'_, R>) -> Result<TierWrite<bool>, TierError> {
        let floor = self.last_read_tier().await.unwrap_or(TierKind::Primary);
        let mut outcome = None;
        let mut recorded_in = Vec::new();
        let mut last_error = None;

        for &tier in self.policy.order() {
            if tier != TierKind::Primary && tier < floor {
                continue;
            }
            let Some(store) = self.store(tier) else {
                if self.halts(tier) {
                    return Err(TierError::NotConfigured(tier));
                }
                continue;
            };

            match apply(store.as_ref(), op).await {
                Ok(result) => {
                    outcome.get_or_insert(result);
                    recorded_in.push(tier);
                }
                Err(err) if err.is_unavailable() => {
                    if self.halts(tier) {
                        error!(collection = R::COLLECTION, op = op.name(), error = %err, "primary write failed and fallback is disabled");
                        return Err(err);
                    }
                    if tier == TierKind::Primary {
                        error!(collection = R::COLLECTION, op = op.name(), error = %err, "primary write failed; recording in lower tiers only");
                    } else {
                        warn!(collection = R::COLLECTION, %tier, op = op.name(), error = %err, "tier write failed");
                    }
                    last_error = Some(err);
                }
                Err(err) if outcome.is_none() => return Err(err),
                Err(err) => {
                    warn!(collection = R::COLLECTION, %tier, op = op.name(), error = %err, "lower tier rejected write already accepted upstream");
                }
            }
        }

        match outcome {
            Some(outcome) => Ok(TierWrite {
                outcome,
                recorded_in,
            }),
            None => {
                error!(collection = R::COLLECTION, op = op.name(), "no tier accepted the write");
                Err(last_error.unwrap_or(TierError::NotConfigured(TierKind::Tertiary)))
            }
        }
    }
}
