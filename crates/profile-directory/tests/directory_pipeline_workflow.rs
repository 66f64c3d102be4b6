//! End-to-end behavior of the submission-to-listing pipeline through the public service facade,
//! the HTTP routers, and the concrete persistence tiers.

mod common {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use chrono::{DateTime, Utc};
    use serde_json::Value;

    use profile_directory::workflows::pipeline::{
        CategoryLinks, DirectoryService, Listing, ListingId, ListingMetrics, MemoryCategoryLinks,
        MemoryTable, Notifier, ProfileFields, Submission, SubmissionPayload, TierAccessor,
        TierPolicy, TierStore,
    };

    pub(super) fn bio(words: usize) -> String {
        vec!["sourcing"; words].join(" ")
    }

    pub(super) fn payload(display_name: &str) -> SubmissionPayload {
        SubmissionPayload {
            display_name: Some(display_name.to_string()),
            email: Some("candidate@searchpartners.io".to_string()),
            company: Some("Search Partners".to_string()),
            job_title: Some("Recruiting Lead".to_string()),
            location: Some("Denver, CO".to_string()),
            bio: Some(bio(240)),
            specializations: vec!["Data Engineering".to_string()],
            industries: vec!["Healthcare".to_string()],
            ..SubmissionPayload::default()
        }
    }

    pub(super) fn listing(id: &str, slug: &str, name: &str) -> Listing {
        let at = DateTime::<Utc>::from_timestamp(1_717_200_000, 0).expect("valid timestamp");
        Listing {
            id: ListingId(id.to_string()),
            slug: slug.to_string(),
            profile: ProfileFields {
                display_name: name.to_string(),
                email: format!("{slug}@searchpartners.io"),
                phone: None,
                company: "Search Partners".to_string(),
                job_title: "Recruiter".to_string(),
                location: "Denver, CO".to_string(),
                website: None,
                linkedin_url: None,
                photo_url: None,
                bio: "Places data engineers.".to_string(),
                years_experience: None,
                specializations: vec!["Data Engineering".to_string()],
                industries: vec!["Healthcare".to_string()],
                achievements: Vec::new(),
                languages: Vec::new(),
            },
            category_ids: Vec::new(),
            metrics: ListingMetrics::default(),
            approved: true,
            hidden: false,
            featured: false,
            created_at: at,
            updated_at: at,
        }
    }

    pub(super) fn accessor<R>(
        primary: Option<Arc<dyn TierStore<R>>>,
        secondary: Option<Arc<dyn TierStore<R>>>,
        seed: Vec<R>,
    ) -> Arc<TierAccessor<R>>
    where
        R: profile_directory::workflows::pipeline::TierRecord,
    {
        let mut accessor = TierAccessor::new(
            Arc::new(MemoryTable::with_seed(seed.clone())),
            TierPolicy::degrade(),
        )
        .with_seed(seed);
        if let Some(primary) = primary {
            accessor = accessor.with_primary(primary);
        }
        if let Some(secondary) = secondary {
            accessor = accessor.with_secondary(secondary);
        }
        Arc::new(accessor)
    }

    pub(super) fn service(
        submissions: Arc<TierAccessor<Submission>>,
        listings: Arc<TierAccessor<Listing>>,
    ) -> Arc<DirectoryService> {
        let categories: Arc<dyn CategoryLinks> = Arc::new(MemoryCategoryLinks::default());
        Arc::new(DirectoryService::new(
            submissions,
            listings,
            categories,
            Notifier::disabled(),
        ))
    }

    pub(super) fn json_request(method: &str, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
            .expect("request")
    }

    pub(super) fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    pub(super) async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }
}

use std::sync::Arc;

use axum::http::StatusCode;
use tower::ServiceExt;

use common::*;
use profile_directory::workflows::pipeline::{
    admin_router, directory_router, normalize, seed_listings, FileStore, Listing, PrimaryStore,
    Reconciler, Submission, SubmissionStatus, TierKind, TierStore,
};

#[tokio::test]
async fn short_biography_is_rejected_with_actual_word_count() {
    let mut input = payload("Jane Doe");
    input.bio = Some(bio(150));

    let err = normalize(input.clone(), chrono::Utc::now()).expect_err("bio too short");
    let issue = err.issue("bio").expect("bio issue");
    assert!(issue.message.contains("150"));

    let svc = service(
        accessor(None, None, Vec::new()),
        accessor(None, None, Vec::new()),
    );
    let response = directory_router(svc)
        .oneshot(json_request("POST", "/api/v1/submissions", &input))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["fields"][0]["field"], "bio");
}

#[tokio::test]
async fn duplicate_slug_conflict_keeps_submission_pending() {
    let store = Arc::new(PrimaryStore::in_memory().await.expect("in-memory store"));
    let existing = listing("lst-jane", "jane-doe", "Jane Doe");
    TierStore::<Listing>::insert(store.as_ref(), &existing)
        .await
        .expect("existing listing");

    let svc = service(
        accessor(
            Some(store.clone() as Arc<dyn TierStore<Submission>>),
            None,
            Vec::new(),
        ),
        accessor(
            Some(store.clone() as Arc<dyn TierStore<Listing>>),
            None,
            Vec::new(),
        ),
    );

    let response = directory_router(svc.clone())
        .oneshot(json_request("POST", "/api/v1/submissions", &payload("Jane Doe")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = read_json_body(response).await["id"]
        .as_str()
        .expect("submission id")
        .to_string();

    let response = admin_router(svc.clone())
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/admin/submissions/{id}/approve"),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(response).await["details"], "duplicate_slug");

    let stored = TierStore::<Submission>::read_one(store.as_ref(), &id)
        .await
        .expect("read")
        .expect("submission retained");
    assert_eq!(stored.status, SubmissionStatus::Pending);
    assert_eq!(
        TierStore::<Listing>::count(store.as_ref()).await.expect("count"),
        1
    );
}

#[tokio::test]
async fn unreachable_primary_serves_secondary_records_as_degraded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = Arc::new(FileStore::<Listing>::new(dir.path()));
    file.write_all(&[
        listing("lst-1", "ana-silva", "Ana Silva"),
        listing("lst-2", "ben-wu", "Ben Wu"),
        listing("lst-3", "cara-diaz", "Cara Diaz"),
    ])
    .await
    .expect("secondary records");

    let primary = Arc::new(PrimaryStore::in_memory().await.expect("in-memory store"));
    primary.close().await;

    let listings = accessor(
        Some(primary as Arc<dyn TierStore<Listing>>),
        Some(file as Arc<dyn TierStore<Listing>>),
        seed_listings(),
    );
    let read = listings.read_all().await.expect("degraded read");
    assert_eq!(read.tier, TierKind::Secondary);
    assert!(read.degraded());
    assert_eq!(read.data.len(), 3);

    let svc = service(accessor(None, None, Vec::new()), listings);
    let response = directory_router(svc)
        .oneshot(empty_request("GET", "/api/v1/listings"))
        .await
        .expect("response");
    let body = read_json_body(response).await;
    assert_eq!(body["tier"], "secondary");
    assert_eq!(body["degraded"], true);
    assert_eq!(body["listings"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn reconcile_populates_empty_primary_from_seed() {
    let store = Arc::new(PrimaryStore::in_memory().await.expect("in-memory store"));
    let listings = accessor(
        Some(store.clone() as Arc<dyn TierStore<Listing>>),
        None,
        seed_listings(),
    );
    assert_eq!(listings.seed().len(), 8);

    let report = Reconciler::new(listings.clone())
        .reconcile()
        .await
        .expect("reconciled");
    assert_eq!(report.before.count, 0);
    assert_eq!(report.after.count, 8);
    assert!(report
        .actions
        .iter()
        .any(|action| action.contains("populated empty store")));

    let again = Reconciler::new(listings)
        .reconcile()
        .await
        .expect("second run");
    assert_eq!(again.after.count, 8);
}

#[tokio::test]
async fn approval_flow_publishes_listing_through_routes() {
    let store = Arc::new(PrimaryStore::in_memory().await.expect("in-memory store"));
    let svc = service(
        accessor(
            Some(store.clone() as Arc<dyn TierStore<Submission>>),
            None,
            Vec::new(),
        ),
        accessor(
            Some(store.clone() as Arc<dyn TierStore<Listing>>),
            None,
            Vec::new(),
        ),
    );

    let response = directory_router(svc.clone())
        .oneshot(json_request("POST", "/api/v1/submissions", &payload("Maya Brooks")))
        .await
        .expect("response");
    let id = read_json_body(response).await["id"]
        .as_str()
        .expect("submission id")
        .to_string();

    let response = admin_router(svc.clone())
        .oneshot(empty_request("GET", "/api/v1/admin/submissions"))
        .await
        .expect("response");
    let queue = read_json_body(response).await;
    assert_eq!(queue["submissions"].as_array().map(Vec::len), Some(1));
    assert_eq!(queue["tier"], "primary");

    let response = admin_router(svc.clone())
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/admin/submissions/{id}/approve"),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let approval = read_json_body(response).await;
    assert_eq!(approval["slug"], "maya-brooks");

    let response = directory_router(svc)
        .oneshot(empty_request("GET", "/api/v1/listings/maya-brooks"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["listing"]["profile"]["display_name"], "Maya Brooks");
    assert_eq!(body["degraded"], false);

    assert!(TierStore::<Submission>::read_one(store.as_ref(), &id)
        .await
        .expect("read")
        .is_none());
}
