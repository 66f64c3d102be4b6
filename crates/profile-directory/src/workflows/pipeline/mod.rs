//! Submission-to-listing promotion pipeline.
//!
//! Submissions are normalized on intake, stored through a [`TierAccessor`], and moderated by the
//! [`DirectoryService`]. Approval promotes a submission into a published listing; the
//! [`Reconciler`] repairs an under-populated primary store from the cache or the seed set.

pub mod categories;
pub mod domain;
pub mod normalizer;
pub mod notifier;
pub mod promoter;
pub mod reconciler;
pub mod router;
pub mod seed;
pub mod service;
pub mod tiers;

#[cfg(test)]
pub(crate) mod tests;

pub use categories::{CategoryError, CategoryLinks, MemoryCategoryLinks};
pub use domain::{
    Category, Listing, ListingId, ListingMetrics, ProfileFields, Submission, SubmissionId,
    SubmissionStatus,
};
pub use normalizer::{normalize, slugify, FieldIssue, SubmissionPayload, ValidationError};
pub use notifier::{
    DisabledTransport, EmailMessage, EmailTransport, HttpEmailTransport, NotificationFailure,
    Notifier,
};
pub use promoter::{PromotionError, Promoter};
pub use reconciler::{ReconcileError, ReconcileReport, Reconciler, StoreCount};
pub use router::{admin_router, directory_router};
pub use seed::seed_listings;
pub use service::{Approval, DirectoryError, DirectoryService, ListingDraft};
pub use tiers::{
    FallbackMode, FileStore, MemoryTable, PrimaryStore, TierAccessor, TierError, TierKind,
    TierPolicy, TierRead, TierRecord, TierStore, TierWrite,
};
