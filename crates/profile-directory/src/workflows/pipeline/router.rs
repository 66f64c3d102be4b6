use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Map, Value};

use super::domain::{ListingId, SubmissionId};
use super::normalizer::{FieldIssue, SubmissionPayload, ValidationError};
use super::reconciler::ReconcileError;
use super::service::{DirectoryError, DirectoryService, ListingDraft};
use super::tiers::TierRead;

/// Public intake and listing routes.
pub fn directory_router(service: Arc<DirectoryService>) -> Router {
    Router::new()
        .route("/api/v1/submissions", post(submit_handler))
        .route("/api/v1/listings", get(public_listings_handler))
        .route("/api/v1/listings/:slug", get(listing_handler))
        .with_state(service)
}

/// Moderation routes. Callers are expected to layer their own access gate on top.
pub fn admin_router(service: Arc<DirectoryService>) -> Router {
    Router::new()
        .route("/api/v1/admin/submissions", get(pending_handler))
        .route(
            "/api/v1/admin/submissions/:id",
            get(submission_handler).delete(delete_submission_handler),
        )
        .route(
            "/api/v1/admin/submissions/:id/approve",
            post(approve_handler),
        )
        .route("/api/v1/admin/submissions/:id/reject", post(reject_handler))
        .route("/api/v1/admin/listings", get(admin_listings_handler))
        .route(
            "/api/v1/admin/listings/:id",
            put(save_listing_handler).delete(delete_listing_handler),
        )
        .route("/api/v1/admin/reconcile", post(reconcile_handler))
        .with_state(service)
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let (status, payload) = match &self {
            DirectoryError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation failed",
                    "fields": err.issues,
                }),
            ),
            DirectoryError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string() }),
            ),
            DirectoryError::DuplicateSlug { slug } => (
                StatusCode::CONFLICT,
                json!({
                    "error": self.to_string(),
                    "details": "duplicate_slug",
                    "slug": slug,
                }),
            ),
            DirectoryError::AlreadyPromoted(listing_id) => (
                StatusCode::CONFLICT,
                json!({
                    "error": self.to_string(),
                    "details": "already_promoted",
                    "listing_id": listing_id,
                }),
            ),
            DirectoryError::AlreadyExists(_) => (
                StatusCode::CONFLICT,
                json!({
                    "error": self.to_string(),
                    "details": "already_exists",
                }),
            ),
            DirectoryError::StoreUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
        };
        (status, Json(payload)).into_response()
    }
}

fn tagged<T: serde::Serialize>(key: &str, read: TierRead<T>) -> Response {
    let degraded = read.degraded();
    let payload = json!({
        key: read.data,
        "tier": read.tier,
        "degraded": degraded,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

/// Decodes an intake body, naming every mistyped field rather than stopping at the first.
fn decode_submission(
    body: Result<Json<Value>, JsonRejection>,
) -> Result<SubmissionPayload, ValidationError> {
    let Json(value) =
        body.map_err(|rejection| ValidationError::single("body", rejection.body_text()))?;
    let err = match serde_json::from_value::<SubmissionPayload>(value.clone()) {
        Ok(payload) => return Ok(payload),
        Err(err) => err,
    };

    let issues: Vec<FieldIssue> = match &value {
        Value::Object(fields) => fields
            .iter()
            .filter_map(|(field, raw)| {
                let mut single = Map::new();
                single.insert(field.clone(), raw.clone());
                serde_json::from_value::<SubmissionPayload>(Value::Object(single))
                    .err()
                    .map(|err| FieldIssue {
                        field: field.clone(),
                        message: err.to_string(),
                    })
            })
            .collect(),
        _ => Vec::new(),
    };

    if issues.is_empty() {
        Err(ValidationError::single("body", err.to_string()))
    } else {
        Err(ValidationError { issues })
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<DirectoryService>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match decode_submission(body) {
        Ok(payload) => payload,
        Err(err) => return DirectoryError::Validation(err).into_response(),
    };

    match service.submit(payload).await {
        Ok(submission) => {
            let payload = json!({
                "id": submission.id,
                "slug": submission.slug,
                "status": submission.status.label(),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn public_listings_handler(State(service): State<Arc<DirectoryService>>) -> Response {
    match service.public_listings().await {
        Ok(read) => tagged("listings", read),
        Err(err) => err.into_response(),
    }
}

async fn listing_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(slug): Path<String>,
) -> Response {
    match service.listing_by_slug(&slug).await {
        Ok(read) => tagged("listing", read),
        Err(err) => err.into_response(),
    }
}

async fn pending_handler(State(service): State<Arc<DirectoryService>>) -> Response {
    match service.pending().await {
        Ok(read) => tagged("submissions", read),
        Err(err) => err.into_response(),
    }
}

async fn submission_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(id): Path<String>,
) -> Response {
    match service.get(&SubmissionId(id)).await {
        Ok(submission) => (StatusCode::OK, Json(submission)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn approve_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(id): Path<String>,
) -> Response {
    match service.approve(&SubmissionId(id)).await {
        Ok(approval) => (StatusCode::OK, Json(approval)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn reject_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(id): Path<String>,
) -> Response {
    match service.reject(&SubmissionId(id)).await {
        Ok(submission) => {
            let payload = json!({
                "id": submission.id,
                "status": submission.status.label(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn delete_submission_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(id): Path<String>,
) -> Response {
    match service.delete_submission(&SubmissionId(id.clone())).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn admin_listings_handler(State(service): State<Arc<DirectoryService>>) -> Response {
    match service.admin_listings().await {
        Ok(read) => tagged("listings", read),
        Err(err) => err.into_response(),
    }
}

async fn save_listing_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(id): Path<String>,
    Json(draft): Json<ListingDraft>,
) -> Response {
    match service.save_listing(ListingId(id), draft).await {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_listing_handler(
    State(service): State<Arc<DirectoryService>>,
    Path(id): Path<String>,
) -> Response {
    match service.delete_listing(&ListingId(id.clone())).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn reconcile_handler(State(service): State<Arc<DirectoryService>>) -> Response {
    match service.reconcile().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(ReconcileError::PrimaryNotConfigured) => {
            let payload = json!({
                "error": ReconcileError::PrimaryNotConfigured.to_string(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        Err(ReconcileError::Store(err)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
