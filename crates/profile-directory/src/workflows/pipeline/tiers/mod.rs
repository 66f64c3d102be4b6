//! Uniform access to the three persistence tiers backing listings and submissions.
//!
//! The primary store is the managed relational database, the secondary store is a JSON file
//! per collection, and the tertiary cache is an in-process table owned by the accessor. Each
//! tier speaks the same [`TierStore`] contract; the [`TierAccessor`] decides per call which one
//! is authoritative according to a [`TierPolicy`].

mod accessor;
pub(crate) mod codec;
mod file;
mod memory;
mod primary;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use accessor::{TierAccessor, TierRead, TierWrite};
pub use file::FileStore;
pub use memory::MemoryTable;
pub use primary::PrimaryStore;

/// Storage locations ordered by durability; later variants sit "below" earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Primary,
    Secondary,
    Tertiary,
}

impl TierKind {
    pub fn label(self) -> &'static str {
        match self {
            TierKind::Primary => "primary",
            TierKind::Secondary => "secondary",
            TierKind::Tertiary => "tertiary",
        }
    }

    /// Anything served from outside the primary store is a degraded read.
    pub fn is_degraded(self) -> bool {
        !matches!(self, TierKind::Primary)
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Behavior when the primary store cannot serve a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Continue down the tier order and tag the result as degraded.
    Degrade,
    /// Surface the primary failure instead of serving from a lower tier.
    FailHard,
}

impl FallbackMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "degrade" | "fallback" => Some(Self::Degrade),
            "fail_hard" | "fail-hard" | "strict" => Some(Self::FailHard),
            _ => None,
        }
    }
}

/// Ordered tiers plus the fallback mode applied to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    order: Vec<TierKind>,
    mode: FallbackMode,
}

impl TierPolicy {
    pub fn new(mut order: Vec<TierKind>, mode: FallbackMode) -> Self {
        order.sort();
        order.dedup();
        Self { order, mode }
    }

    pub fn degrade() -> Self {
        Self::new(
            vec![TierKind::Primary, TierKind::Secondary, TierKind::Tertiary],
            FallbackMode::Degrade,
        )
    }

    pub fn fail_hard() -> Self {
        Self::new(
            vec![TierKind::Primary, TierKind::Secondary, TierKind::Tertiary],
            FallbackMode::FailHard,
        )
    }

    pub fn with_mode(mode: FallbackMode) -> Self {
        match mode {
            FallbackMode::Degrade => Self::degrade(),
            FallbackMode::FailHard => Self::fail_hard(),
        }
    }

    pub fn order(&self) -> &[TierKind] {
        &self.order
    }

    pub fn mode(&self) -> FallbackMode {
        self.mode
    }

    pub fn fails_hard(&self) -> bool {
        matches!(self.mode, FallbackMode::FailHard)
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::degrade()
    }
}

/// Error returned by a single tier call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    #[error("{0} tier is not configured")]
    NotConfigured(TierKind),
    #[error("{tier} tier unavailable: {reason}")]
    Unavailable { tier: TierKind, reason: String },
    #[error("slug '{slug}' is already taken")]
    UniqueViolation { slug: String },
    #[error("record '{0}' already exists")]
    AlreadyExists(String),
}

impl TierError {
    pub fn unavailable(tier: TierKind, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            tier,
            reason: reason.to_string(),
        }
    }

    /// Availability failures move the accessor to the next tier; conflicts never do.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            TierError::NotConfigured(_) | TierError::Unavailable { .. }
        )
    }
}

/// Canonical record shape stored in every tier.
pub trait TierRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name, used for table and file naming.
    const COLLECTION: &'static str;

    fn record_id(&self) -> &str;

    /// Secondary unique key enforced alongside the identifier.
    fn unique_slug(&self) -> Option<&str> {
        None
    }
}

/// One persistence backend for one record family.
///
/// `write_all` is a batch upsert applied all-or-nothing; it never removes records that are
/// absent from the batch.
#[async_trait]
pub trait TierStore<R: TierRecord>: Send + Sync {
    fn kind(&self) -> TierKind;

    async fn read_all(&self) -> Result<Vec<R>, TierError>;

    async fn read_one(&self, id: &str) -> Result<Option<R>, TierError>;

    async fn write_all(&self, records: &[R]) -> Result<(), TierError>;

    async fn upsert(&self, record: &R) -> Result<(), TierError>;

    /// Like `upsert`, but fails with [`TierError::AlreadyExists`] when the id is taken.
    async fn insert(&self, record: &R) -> Result<(), TierError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, TierError>;

    async fn count(&self) -> Result<usize, TierError> {
        Ok(self.read_all().await?.len())
    }
}

/// Applies `record` to an id-keyed table, enforcing slug uniqueness against other ids.
pub(crate) fn apply_upsert<R: TierRecord>(
    table: &mut BTreeMap<String, R>,
    record: &R,
) -> Result<(), TierError> {
    if let Some(slug) = record.unique_slug() {
        let taken = table
            .values()
            .any(|other| other.record_id() != record.record_id() && other.unique_slug() == Some(slug));
        if taken {
            return Err(TierError::UniqueViolation {
                slug: slug.to_string(),
            });
        }
    }
    table.insert(record.record_id().to_string(), record.clone());
    Ok(())
}

/// Batch form of [`apply_upsert`]; the table is untouched if any record conflicts.
pub(crate) fn apply_batch<R: TierRecord>(
    table: &mut BTreeMap<String, R>,
    records: &[R],
) -> Result<(), TierError> {
    let mut staged = table.clone();
    for record in records {
        apply_upsert(&mut staged, record)?;
    }
    *table = staged;
    Ok(())
}

pub(crate) fn apply_insert<R: TierRecord>(
    table: &mut BTreeMap<String, R>,
    record: &R,
) -> Result<(), TierError> {
    if table.contains_key(record.record_id()) {
        return Err(TierError::AlreadyExists(record.record_id().to_string()));
    }
    apply_upsert(table, record)
}
