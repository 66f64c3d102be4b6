use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ListingMetrics, ProfileFields, Submission, SubmissionId, SubmissionStatus};

pub const SLUG_MAX_LEN: usize = 50;
pub const BIO_MIN_WORDS: usize = 200;
pub const BIO_MAX_WORDS: usize = 500;

/// Declared `[min, max]` cardinality for each bounded list field.
const SPECIALIZATIONS: (usize, usize) = (1, 5);
const INDUSTRIES: (usize, usize) = (1, 5);
const ACHIEVEMENTS: (usize, usize) = (0, 5);
const LANGUAGES: (usize, usize) = (0, 5);

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id(now: DateTime<Utc>) -> SubmissionId {
    let seq = SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SubmissionId(format!("sub-{}-{seq}", now.timestamp_millis()))
}

/// Raw intake payload as received from the public form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionPayload {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub years_experience: Option<u16>,
    pub specializations: Vec<String>,
    pub industries: Vec<String>,
    pub achievements: Vec<String>,
    pub languages: Vec<String>,
    pub category_ids: Vec<String>,
    pub metrics: Option<ListingMetrics>,
}

/// One violated rule, keyed by the payload field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

/// Every rule a payload violated, collected in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    pub fn issue(&self, field: &str) -> Option<&FieldIssue> {
        self.issues.iter().find(|issue| issue.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submission failed validation")?;
        for (index, issue) in self.issues.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{} {}", issue.field, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Default)]
struct Issues(Vec<FieldIssue>);

impl Issues {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldIssue {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn required(&mut self, field: &str, value: Option<String>) -> String {
        let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
        if value.is_empty() {
            self.push(field, "is required");
        }
        value
    }

    fn bounded(&mut self, field: &str, values: Vec<String>, (min, max): (usize, usize)) -> Vec<String> {
        let values: Vec<String> = values
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
        if values.len() < min || values.len() > max {
            self.push(
                field,
                format!(
                    "must contain between {min} and {max} entries (found {})",
                    values.len()
                ),
            );
        }
        values
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

/// Lower-kebab-case form of a display name, at most [`SLUG_MAX_LEN`] characters.
///
/// Whitespace runs and hyphens become a single hyphen, anything outside `[a-z0-9-]` is
/// dropped, and the result never starts or ends with a hyphen. Names with no ASCII
/// alphanumerics produce an empty slug.
pub fn slugify(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len().min(SLUG_MAX_LEN));
    let mut pending_hyphen = false;

    for ch in display_name.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() || ch == '-' {
            pending_hyphen = true;
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        }
    }

    slug.truncate(SLUG_MAX_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Whether `slug` is already in canonical form.
pub fn is_canonical_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

/// Validates and canonicalizes an intake payload into a pending submission.
pub fn normalize(
    payload: SubmissionPayload,
    now: DateTime<Utc>,
) -> Result<Submission, ValidationError> {
    let mut issues = Issues::default();

    let display_name = issues.required("display_name", payload.display_name);
    let email = issues.required("email", payload.email);
    let company = issues.required("company", payload.company);
    let job_title = issues.required("job_title", payload.job_title);
    let location = issues.required("location", payload.location);
    let bio = issues.required("bio", payload.bio);

    if !email.is_empty() && !plausible_email(&email) {
        issues.push("email", "must be a valid email address");
    }

    if !bio.is_empty() {
        let words = bio.split_whitespace().count();
        if !(BIO_MIN_WORDS..=BIO_MAX_WORDS).contains(&words) {
            issues.push(
                "bio",
                format!(
                    "must contain between {BIO_MIN_WORDS} and {BIO_MAX_WORDS} words (found {words})"
                ),
            );
        }
    }

    let slug = slugify(&display_name);
    if !display_name.is_empty() && slug.is_empty() {
        issues.push("display_name", "must contain at least one letter or digit");
    }

    let specializations = issues.bounded("specializations", payload.specializations, SPECIALIZATIONS);
    let industries = issues.bounded("industries", payload.industries, INDUSTRIES);
    let achievements = issues.bounded("achievements", payload.achievements, ACHIEVEMENTS);
    let languages = issues.bounded("languages", payload.languages, LANGUAGES);

    if let Some(metrics) = &payload.metrics {
        if metrics.candidate_satisfaction_pct > 100 || metrics.client_retention_pct > 100 {
            issues.push("metrics", "percentages must not exceed 100");
        }
    }

    if !issues.0.is_empty() {
        return Err(ValidationError { issues: issues.0 });
    }

    let id = optional(payload.id)
        .map(SubmissionId)
        .unwrap_or_else(|| next_submission_id(now));

    Ok(Submission {
        id,
        slug,
        profile: ProfileFields {
            display_name,
            email,
            phone: optional(payload.phone),
            company,
            job_title,
            location,
            website: optional(payload.website),
            linkedin_url: optional(payload.linkedin_url),
            photo_url: optional(payload.photo_url),
            bio,
            years_experience: payload.years_experience,
            specializations,
            industries,
            achievements,
            languages,
        },
        category_ids: payload
            .category_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect(),
        metrics: payload.metrics,
        status: SubmissionStatus::Pending,
        submitted_at: now,
        updated_at: now,
    })
}
