use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::categories::CategoryLinks;
use super::domain::{
    Listing, ListingId, ListingMetrics, ProfileFields, Submission, SubmissionId, SubmissionStatus,
};
use super::normalizer::{self, is_canonical_slug, SubmissionPayload, ValidationError};
use super::notifier::{
    Notifier, ADMIN_NEW_SUBMISSION, PROFILE_APPROVED, PROFILE_REJECTED, SUBMISSION_RECEIVED,
};
use super::promoter::{PromotionError, Promoter};
use super::reconciler::{ReconcileError, ReconcileReport, Reconciler};
use super::tiers::{TierAccessor, TierError, TierRead};

/// Error raised by the directory service.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("a listing with slug '{slug}' already exists")]
    DuplicateSlug { slug: String },
    #[error("submission was already promoted to listing '{0}'")]
    AlreadyPromoted(String),
    #[error("record '{0}' already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    StoreUnavailable(TierError),
}

impl From<TierError> for DirectoryError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::UniqueViolation { slug } => DirectoryError::DuplicateSlug { slug },
            TierError::AlreadyExists(id) => DirectoryError::AlreadyExists(id),
            other => DirectoryError::StoreUnavailable(other),
        }
    }
}

impl From<PromotionError> for DirectoryError {
    fn from(err: PromotionError) -> Self {
        match err {
            PromotionError::DuplicateSlug { slug } => DirectoryError::DuplicateSlug { slug },
            PromotionError::AlreadyPromoted(id) => DirectoryError::AlreadyPromoted(id),
            PromotionError::Store(err) => DirectoryError::from(err),
        }
    }
}

/// Result of a successful approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approval {
    pub submission_id: SubmissionId,
    pub listing_id: ListingId,
    pub slug: String,
}

/// Administrative edit of a listing. A missing slug is derived from the display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    #[serde(default)]
    pub slug: Option<String>,
    pub profile: ProfileFields,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub metrics: ListingMetrics,
    #[serde(default = "approved_by_default")]
    pub approved: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub featured: bool,
}

fn approved_by_default() -> bool {
    true
}

fn variables<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn by_name(a: &Listing, b: &Listing) -> std::cmp::Ordering {
    a.profile
        .display_name
        .to_lowercase()
        .cmp(&b.profile.display_name.to_lowercase())
        .then_with(|| a.slug.cmp(&b.slug))
}

/// Service composing the normalizer, tier accessors, promoter, reconciler and notifier.
pub struct DirectoryService {
    submissions: Arc<TierAccessor<Submission>>,
    listings: Arc<TierAccessor<Listing>>,
    categories: Arc<dyn CategoryLinks>,
    promoter: Promoter,
    reconciler: Reconciler<Listing>,
    notifier: Notifier,
}

impl DirectoryService {
    pub fn new(
        submissions: Arc<TierAccessor<Submission>>,
        listings: Arc<TierAccessor<Listing>>,
        categories: Arc<dyn CategoryLinks>,
        notifier: Notifier,
    ) -> Self {
        Self {
            promoter: Promoter::new(listings.clone(), categories.clone()),
            reconciler: Reconciler::new(listings.clone()),
            submissions,
            listings,
            categories,
            notifier,
        }
    }

    /// Overrides the listing population below which reconciliation repopulates the primary.
    pub fn with_expected_listings(mut self, expected: Option<usize>) -> Self {
        self.reconciler = Reconciler::new(self.listings.clone()).with_threshold(expected);
        self
    }

    pub fn listings(&self) -> &Arc<TierAccessor<Listing>> {
        &self.listings
    }

    pub fn submissions(&self) -> &Arc<TierAccessor<Submission>> {
        &self.submissions
    }

    /// Validate and store a new submission, then acknowledge it to the applicant and admin.
    pub async fn submit(&self, payload: SubmissionPayload) -> Result<Submission, DirectoryError> {
        let submission = normalizer::normalize(payload, Utc::now())?;

        // Approval publishes under `lst-<id>`; an id whose listing already exists could never
        // be promoted.
        let listing_id = ListingId::for_submission(&submission.id);
        if self.listings.read_one(&listing_id.0).await?.data.is_some() {
            warn!(
                submission_id = %submission.id.0,
                listing_id = %listing_id.0,
                "submission id collides with a published listing"
            );
            return Err(DirectoryError::AlreadyExists(submission.id.0));
        }

        let write = self.submissions.insert(&submission).await?;
        info!(
            submission_id = %submission.id.0,
            slug = %submission.slug,
            tiers = ?write.recorded_in,
            "submission received"
        );

        let name = submission.profile.display_name.as_str();
        self.notifier
            .notify(
                SUBMISSION_RECEIVED,
                &submission.profile.email,
                variables([("display_name", name), ("submission_id", submission.id.0.as_str())]),
            )
            .await;
        if let Some(admin) = self.notifier.admin_email() {
            self.notifier
                .notify(
                    ADMIN_NEW_SUBMISSION,
                    admin,
                    variables([
                        ("display_name", name),
                        ("submission_id", submission.id.0.as_str()),
                        ("company", submission.profile.company.as_str()),
                    ]),
                )
                .await;
        }

        Ok(submission)
    }

    pub async fn get(&self, id: &SubmissionId) -> Result<Submission, DirectoryError> {
        self.submissions
            .read_one(&id.0)
            .await?
            .data
            .ok_or_else(|| DirectoryError::NotFound(format!("submission '{}'", id.0)))
    }

    /// Pending submissions, oldest first.
    pub async fn pending(&self) -> Result<TierRead<Vec<Submission>>, DirectoryError> {
        let read = self.submissions.read_all().await?;
        Ok(read.map(|rows| {
            let mut pending: Vec<Submission> = rows
                .into_iter()
                .filter(|submission| submission.status == SubmissionStatus::Pending)
                .collect();
            pending.sort_by(|a, b| {
                a.submitted_at
                    .cmp(&b.submitted_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            pending
        }))
    }

    /// Promote a pending submission to a listing and remove the submission.
    ///
    /// A failed promotion leaves the submission pending and untouched.
    pub async fn approve(&self, id: &SubmissionId) -> Result<Approval, DirectoryError> {
        let submission = self.pending_submission(id).await?;

        let listing_id = match self.promoter.promote(&submission, Utc::now()).await {
            Ok(listing_id) => listing_id,
            Err(err) => {
                warn!(submission_id = %id.0, error = %err, "approval aborted; submission stays pending");
                return Err(err.into());
            }
        };

        match self.submissions.delete(&id.0).await {
            Ok(_) => info!(submission_id = %id.0, listing_id = %listing_id.0, "submission approved"),
            Err(err) => {
                error!(submission_id = %id.0, listing_id = %listing_id.0, error = %err, "listing published but submission could not be removed")
            }
        }

        let approval = Approval {
            submission_id: submission.id.clone(),
            listing_id,
            slug: normalizer::slugify(&submission.profile.display_name),
        };
        self.notifier
            .notify(
                PROFILE_APPROVED,
                &submission.profile.email,
                variables([
                    ("display_name", submission.profile.display_name.as_str()),
                    ("slug", approval.slug.as_str()),
                ]),
            )
            .await;

        Ok(approval)
    }

    /// Flip a pending submission to rejected. Rejecting twice is a no-op.
    pub async fn reject(&self, id: &SubmissionId) -> Result<Submission, DirectoryError> {
        let mut submission = self.get(id).await?;
        match submission.status {
            SubmissionStatus::Rejected => return Ok(submission),
            SubmissionStatus::Approved => {
                return Err(DirectoryError::NotFound(format!(
                    "pending submission '{}'",
                    id.0
                )))
            }
            SubmissionStatus::Pending => {}
        }

        submission.status = SubmissionStatus::Rejected;
        submission.updated_at = Utc::now();
        self.submissions.upsert(&submission).await?;
        info!(submission_id = %id.0, "submission rejected");

        self.notifier
            .notify(
                PROFILE_REJECTED,
                &submission.profile.email,
                variables([("display_name", submission.profile.display_name.as_str())]),
            )
            .await;

        Ok(submission)
    }

    pub async fn delete_submission(&self, id: &SubmissionId) -> Result<(), DirectoryError> {
        let write = self.submissions.delete(&id.0).await?;
        if !write.outcome {
            return Err(DirectoryError::NotFound(format!("submission '{}'", id.0)));
        }
        info!(submission_id = %id.0, "submission deleted");
        Ok(())
    }

    async fn pending_submission(&self, id: &SubmissionId) -> Result<Submission, DirectoryError> {
        let submission = self.get(id).await?;
        if submission.status.is_terminal() {
            return Err(DirectoryError::NotFound(format!(
                "pending submission '{}'",
                id.0
            )));
        }
        Ok(submission)
    }

    /// Approved, visible listings: featured entries first, then by name.
    pub async fn public_listings(&self) -> Result<TierRead<Vec<Listing>>, DirectoryError> {
        let read = self.listings.read_all().await?;
        Ok(read.map(|rows| {
            let mut visible: Vec<Listing> = rows.into_iter().filter(Listing::is_public).collect();
            visible.sort_by(|a, b| {
                b.featured
                    .cmp(&a.featured)
                    .then_with(|| by_name(a, b))
            });
            visible
        }))
    }

    pub async fn listing_by_slug(&self, slug: &str) -> Result<TierRead<Listing>, DirectoryError> {
        let read = self.listings.read_all().await?;
        let tier = read.tier;
        read.data
            .into_iter()
            .find(|listing| listing.slug == slug && listing.is_public())
            .map(|data| TierRead { data, tier })
            .ok_or_else(|| DirectoryError::NotFound(format!("listing '{slug}'")))
    }

    /// Every listing, including hidden and unapproved ones.
    pub async fn admin_listings(&self) -> Result<TierRead<Vec<Listing>>, DirectoryError> {
        let read = self.listings.read_all().await?;
        Ok(read.map(|mut rows| {
            rows.sort_by(by_name);
            rows
        }))
    }

    /// Create or replace a listing by id.
    pub async fn save_listing(
        &self,
        id: ListingId,
        draft: ListingDraft,
    ) -> Result<Listing, DirectoryError> {
        let slug = match draft.slug {
            Some(slug) if is_canonical_slug(&slug) => slug,
            Some(slug) => {
                return Err(ValidationError::single(
                    "slug",
                    format!("'{slug}' must be lower-kebab-case using only [a-z0-9-]"),
                )
                .into())
            }
            None => normalizer::slugify(&draft.profile.display_name),
        };
        if slug.is_empty() {
            return Err(ValidationError::single(
                "display_name",
                "must contain at least one letter or digit",
            )
            .into());
        }

        let now = Utc::now();
        let created_at = self
            .listings
            .read_one(&id.0)
            .await?
            .data
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let listing = Listing {
            id,
            slug,
            profile: draft.profile,
            category_ids: draft.category_ids,
            metrics: draft.metrics,
            approved: draft.approved,
            hidden: draft.hidden,
            featured: draft.featured,
            created_at,
            updated_at: now,
        };

        self.listings.upsert(&listing).await?;
        info!(listing_id = %listing.id.0, slug = %listing.slug, "listing saved");
        self.relink(&listing).await;
        Ok(listing)
    }

    async fn relink(&self, listing: &Listing) {
        let relinked = async {
            self.categories.unlink_listing(&listing.id).await?;
            if !listing.category_ids.is_empty() {
                self.categories
                    .link_listing(&listing.id, &listing.category_ids)
                    .await?;
            }
            Ok::<(), super::categories::CategoryError>(())
        };
        if let Err(err) = relinked.await {
            warn!(listing_id = %listing.id.0, error = %err, "category links not updated");
        }
    }

    pub async fn delete_listing(&self, id: &ListingId) -> Result<(), DirectoryError> {
        let write = self.listings.delete(&id.0).await?;
        if !write.outcome {
            return Err(DirectoryError::NotFound(format!("listing '{}'", id.0)));
        }
        if let Err(err) = self.categories.unlink_listing(id).await {
            warn!(listing_id = %id.0, error = %err, "category links not removed");
        }
        info!(listing_id = %id.0, "listing deleted");
        Ok(())
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        self.reconciler.reconcile().await
    }
}
