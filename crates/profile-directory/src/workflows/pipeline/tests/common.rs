use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::workflows::pipeline::categories::{CategoryLinks, MemoryCategoryLinks};
use crate::workflows::pipeline::domain::{
    Listing, ListingId, ListingMetrics, ProfileFields, Submission, SubmissionId, SubmissionStatus,
};
use crate::workflows::pipeline::normalizer::{slugify, SubmissionPayload};
use crate::workflows::pipeline::notifier::{
    EmailMessage, EmailTransport, NotificationFailure, Notifier,
};
use crate::workflows::pipeline::service::DirectoryService;
use crate::workflows::pipeline::tiers::{
    MemoryTable, PrimaryStore, TierAccessor, TierError, TierKind, TierPolicy, TierRecord,
    TierStore,
};

/// Whole-second timestamp so records round-trip through every tier unchanged.
pub(crate) fn fixed_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_717_200_000, 0).expect("valid timestamp")
}

pub(crate) fn bio(words: usize) -> String {
    vec!["recruiting"; words].join(" ")
}

pub(crate) fn profile(display_name: &str) -> ProfileFields {
    ProfileFields {
        display_name: display_name.to_string(),
        email: format!("{}@talentbridge.io", slugify(display_name)),
        phone: None,
        company: "TalentBridge".to_string(),
        job_title: "Senior Recruiter".to_string(),
        location: "Austin, TX".to_string(),
        website: None,
        linkedin_url: None,
        photo_url: None,
        bio: bio(220),
        years_experience: Some(8),
        specializations: vec!["Engineering".to_string()],
        industries: vec!["Fintech".to_string(), "SaaS".to_string()],
        achievements: Vec::new(),
        languages: vec!["English".to_string()],
    }
}

pub(crate) fn listing(id: &str, slug: &str) -> Listing {
    Listing {
        id: ListingId(id.to_string()),
        slug: slug.to_string(),
        profile: profile(&slug.replace('-', " ")),
        category_ids: Vec::new(),
        metrics: ListingMetrics::default(),
        approved: true,
        hidden: false,
        featured: false,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub(crate) fn submission(id: &str, display_name: &str) -> Submission {
    Submission {
        id: SubmissionId(id.to_string()),
        slug: slugify(display_name),
        profile: profile(display_name),
        category_ids: Vec::new(),
        metrics: None,
        status: SubmissionStatus::Pending,
        submitted_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

pub(crate) fn payload(display_name: &str) -> SubmissionPayload {
    let profile = profile(display_name);
    SubmissionPayload {
        display_name: Some(profile.display_name),
        email: Some(profile.email),
        company: Some(profile.company),
        job_title: Some(profile.job_title),
        location: Some(profile.location),
        bio: Some(profile.bio),
        years_experience: profile.years_experience,
        specializations: profile.specializations,
        industries: profile.industries,
        languages: profile.languages,
        ..SubmissionPayload::default()
    }
}

/// Primary store whose every call fails as a transport error.
pub(crate) struct OfflineStore<R> {
    _records: PhantomData<fn() -> R>,
}

impl<R> Default for OfflineStore<R> {
    fn default() -> Self {
        Self {
            _records: PhantomData,
        }
    }
}

impl<R> OfflineStore<R> {
    fn offline() -> TierError {
        TierError::unavailable(TierKind::Primary, "connection refused")
    }
}

#[async_trait]
impl<R: TierRecord> TierStore<R> for OfflineStore<R> {
    fn kind(&self) -> TierKind {
        TierKind::Primary
    }

    async fn read_all(&self) -> Result<Vec<R>, TierError> {
        Err(Self::offline())
    }

    async fn read_one(&self, _id: &str) -> Result<Option<R>, TierError> {
        Err(Self::offline())
    }

    async fn write_all(&self, _records: &[R]) -> Result<(), TierError> {
        Err(Self::offline())
    }

    async fn upsert(&self, _record: &R) -> Result<(), TierError> {
        Err(Self::offline())
    }

    async fn insert(&self, _record: &R) -> Result<(), TierError> {
        Err(Self::offline())
    }

    async fn delete(&self, _id: &str) -> Result<bool, TierError> {
        Err(Self::offline())
    }
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    messages: Mutex<Vec<EmailMessage>>,
}

impl RecordingTransport {
    pub(crate) fn templates(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("transport mutex poisoned")
            .iter()
            .map(|message| message.template.clone())
            .collect()
    }

    pub(crate) fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("transport mutex poisoned").clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationFailure> {
        self.messages
            .lock()
            .expect("transport mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

pub(crate) struct FailingTransport;

#[async_trait]
impl EmailTransport for FailingTransport {
    async fn send(&self, _message: &EmailMessage) -> Result<(), NotificationFailure> {
        Err(NotificationFailure::Rejected { status: 502 })
    }
}

/// Accessor backed only by the in-process cache.
pub(crate) fn memory_accessor<R: TierRecord>(seed: Vec<R>) -> TierAccessor<R> {
    TierAccessor::new(
        Arc::new(MemoryTable::with_seed(seed.clone())),
        TierPolicy::degrade(),
    )
    .with_seed(seed)
}

pub(crate) struct Harness {
    pub(crate) service: DirectoryService,
    pub(crate) transport: Arc<RecordingTransport>,
    pub(crate) categories: Arc<MemoryCategoryLinks>,
}

fn harness(
    submissions: TierAccessor<Submission>,
    listings: TierAccessor<Listing>,
) -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let categories = Arc::new(MemoryCategoryLinks::default());
    let notifier = Notifier::new(transport.clone(), "directory@localhost")
        .with_admin_email(Some("admin@directory.local".to_string()));
    let service = DirectoryService::new(
        Arc::new(submissions),
        Arc::new(listings),
        categories.clone() as Arc<dyn CategoryLinks>,
        notifier,
    );
    Harness {
        service,
        transport,
        categories,
    }
}

/// Service running on cache-only tiers, with `listings` as the listing seed.
pub(crate) fn memory_harness(listings: Vec<Listing>) -> Harness {
    harness(memory_accessor(Vec::new()), memory_accessor(listings))
}

/// Service whose primary tier is an in-memory SQLite database.
pub(crate) async fn primary_harness(seed: Vec<Listing>) -> (Harness, Arc<PrimaryStore>) {
    let store = Arc::new(PrimaryStore::in_memory().await.expect("in-memory store"));
    let submissions = TierAccessor::new(Arc::new(MemoryTable::new()), TierPolicy::degrade())
        .with_primary(store.clone() as Arc<dyn TierStore<Submission>>);
    let listings = TierAccessor::new(
        Arc::new(MemoryTable::with_seed(seed.clone())),
        TierPolicy::degrade(),
    )
    .with_primary(store.clone() as Arc<dyn TierStore<Listing>>)
    .with_seed(seed);
    (harness(submissions, listings), store)
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
