use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tiers::codec::{lenient_list, lenient_object};
use super::tiers::TierRecord;

/// Identifier wrapper for profile submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

/// Identifier wrapper for published listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl ListingId {
    /// Listings promoted from a submission reuse its identifier so a second promotion of the
    /// same submission collides instead of publishing twice.
    pub fn for_submission(id: &SubmissionId) -> Self {
        Self(format!("lst-{}", id.0))
    }
}

/// Review lifecycle of a submission. Anything other than `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

/// Contact and professional fields shared by submissions and the listings promoted from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub company: String,
    pub job_title: String,
    pub location: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub bio: String,
    #[serde(default)]
    pub years_experience: Option<u16>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub specializations: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub industries: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub achievements: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub languages: Vec<String>,
}

/// Aggregate performance figures shown on a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingMetrics {
    #[serde(default)]
    pub total_placements: u32,
    #[serde(default = "default_time_to_fill")]
    pub avg_time_to_fill_days: u32,
    #[serde(default = "default_satisfaction")]
    pub candidate_satisfaction_pct: u8,
    #[serde(default = "default_satisfaction")]
    pub client_retention_pct: u8,
}

fn default_time_to_fill() -> u32 {
    30
}

fn default_satisfaction() -> u8 {
    90
}

impl Default for ListingMetrics {
    fn default() -> Self {
        Self {
            total_placements: 0,
            avg_time_to_fill_days: default_time_to_fill(),
            candidate_satisfaction_pct: default_satisfaction(),
            client_retention_pct: default_satisfaction(),
        }
    }
}

/// A candidate profile awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub slug: String,
    pub profile: ProfileFields,
    #[serde(default, deserialize_with = "lenient_list")]
    pub category_ids: Vec<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub metrics: Option<ListingMetrics>,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TierRecord for Submission {
    const COLLECTION: &'static str = "submissions";

    fn record_id(&self) -> &str {
        &self.id.0
    }
}

/// A published directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub slug: String,
    pub profile: ProfileFields,
    #[serde(default, deserialize_with = "lenient_list")]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub metrics: ListingMetrics,
    #[serde(default = "published")]
    pub approved: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn published() -> bool {
    true
}

impl Listing {
    /// Builds the published form of an approved submission. Metrics the applicant did not
    /// supply fall back to directory defaults.
    pub fn from_submission(submission: &Submission, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            id: ListingId::for_submission(&submission.id),
            slug,
            profile: submission.profile.clone(),
            category_ids: submission.category_ids.clone(),
            metrics: submission.metrics.unwrap_or_default(),
            approved: true,
            hidden: false,
            featured: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_public(&self) -> bool {
        self.approved && !self.hidden
    }
}

impl TierRecord for Listing {
    const COLLECTION: &'static str = "listings";

    fn record_id(&self) -> &str {
        &self.id.0
    }

    fn unique_slug(&self) -> Option<&str> {
        Some(&self.slug)
    }
}

/// A named tag attached to listings through the join relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
}
