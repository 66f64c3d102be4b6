use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::categories::CategoryLinks;
use super::domain::{Listing, ListingId, Submission};
use super::normalizer::slugify;
use super::tiers::{TierAccessor, TierError};

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("a listing with slug '{slug}' already exists")]
    DuplicateSlug { slug: String },
    #[error("submission was already promoted to listing '{0}'")]
    AlreadyPromoted(String),
    #[error(transparent)]
    Store(TierError),
}

impl From<TierError> for PromotionError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::UniqueViolation { slug } => PromotionError::DuplicateSlug { slug },
            TierError::AlreadyExists(id) => PromotionError::AlreadyPromoted(id),
            other => PromotionError::Store(other),
        }
    }
}

/// Turns approved submissions into published listings.
pub struct Promoter {
    listings: Arc<TierAccessor<Listing>>,
    categories: Arc<dyn CategoryLinks>,
}

impl Promoter {
    pub fn new(listings: Arc<TierAccessor<Listing>>, categories: Arc<dyn CategoryLinks>) -> Self {
        Self {
            listings,
            categories,
        }
    }

    /// Inserts the listing for `submission`, returning its identifier.
    ///
    /// The insert is the only required write: if it fails nothing has been published.
    /// Category links are copied afterwards and a failure there is logged only.
    pub async fn promote(
        &self,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> Result<ListingId, PromotionError> {
        let slug = slugify(&submission.profile.display_name);
        let listing = Listing::from_submission(submission, slug, now);

        let write = self.listings.insert(&listing).await?;
        info!(
            submission_id = %submission.id.0,
            listing_id = %listing.id.0,
            slug = %listing.slug,
            tiers = ?write.recorded_in,
            "submission promoted to listing"
        );

        if !listing.category_ids.is_empty() {
            if let Err(err) = self
                .categories
                .link_listing(&listing.id, &listing.category_ids)
                .await
            {
                warn!(listing_id = %listing.id.0, error = %err, "category links not copied to promoted listing");
            }
        }

        Ok(listing.id)
    }
}
