use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::tiers::{TierAccessor, TierError, TierRecord, TierStore};

/// Outcome of an additive seed pass against one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub inserted: usize,
    /// Ids skipped because their slug is held by another record.
    pub conflicts: Vec<String>,
}

/// Upserts every record in `source` whose id is absent from `store`.
///
/// Existing rows are never touched, so edits made directly against the store survive.
pub(crate) async fn seed_missing<R: TierRecord>(
    store: &dyn TierStore<R>,
    source: &[R],
) -> Result<SeedOutcome, TierError> {
    let present: BTreeSet<String> = store
        .read_all()
        .await?
        .iter()
        .map(|record| record.record_id().to_string())
        .collect();

    let mut outcome = SeedOutcome::default();
    for record in source {
        if present.contains(record.record_id()) {
            continue;
        }
        match store.upsert(record).await {
            Ok(()) => outcome.inserted += 1,
            Err(TierError::UniqueViolation { slug }) => {
                warn!(collection = R::COLLECTION, id = record.record_id(), %slug, "seed record skipped; slug already taken");
                outcome.conflicts.push(record.record_id().to_string());
            }
            Err(err) => return Err(err),
        }
    }
    Ok(outcome)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCount {
    pub count: usize,
}

/// Before/after row counts plus a human-readable log of what was done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub before: StoreCount,
    pub after: StoreCount,
    pub actions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("primary store is not configured; nothing to reconcile")]
    PrimaryNotConfigured,
    #[error(transparent)]
    Store(#[from] TierError),
}

/// Repairs an empty or under-populated primary store from the cache or the seed set.
pub struct Reconciler<R: TierRecord> {
    accessor: Arc<TierAccessor<R>>,
    threshold: Option<usize>,
}

impl<R: TierRecord> Reconciler<R> {
    pub fn new(accessor: Arc<TierAccessor<R>>) -> Self {
        Self {
            accessor,
            threshold: None,
        }
    }

    /// Overrides the expected population, which otherwise equals the seed size.
    pub fn with_threshold(mut self, threshold: Option<usize>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
            .unwrap_or_else(|| self.accessor.seed().len())
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let primary = self
            .accessor
            .primary()
            .ok_or(ReconcileError::PrimaryNotConfigured)?;
        let collection = R::COLLECTION;
        let threshold = self.threshold();
        let before = primary.count().await?;
        let mut actions = Vec::new();

        if before < threshold {
            let cached = self
                .accessor
                .cache()
                .snapshot()
                .await
                .filter(|rows| !rows.is_empty());
            let (source, origin) = match cached {
                Some(rows) => (rows, "in-process cache"),
                None => (self.accessor.seed().to_vec(), "seed"),
            };

            if source.is_empty() {
                actions.push(format!(
                    "store holds {before} {collection} below threshold {threshold}; no seed data available"
                ));
            } else {
                let outcome = seed_missing(primary.as_ref(), &source).await?;
                let action = if before == 0 {
                    format!(
                        "populated empty store with {} {collection} from {origin}",
                        outcome.inserted
                    )
                } else {
                    format!(
                        "topped up under-populated store ({before} of {threshold}) with {} {collection} from {origin}",
                        outcome.inserted
                    )
                };
                info!(collection, before, threshold, inserted = outcome.inserted, origin, "reconciled primary store");
                actions.push(action);
                actions.extend(
                    outcome
                        .conflicts
                        .iter()
                        .map(|id| format!("skipped {id}: slug already taken")),
                );
            }
        } else {
            actions.push(format!(
                "store holds {before} {collection} (threshold {threshold}); no action"
            ));
        }

        self.accessor.clear_cache().await;
        actions.push("cleared in-process cache".to_string());

        let after = primary.count().await?;
        info!(collection, before, after, "reconciliation finished");

        Ok(ReconcileReport {
            before: StoreCount { count: before },
            after: StoreCount { count: after },
            actions,
        })
    }
}
