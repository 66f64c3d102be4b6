use crate::infra::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router};
use profile_directory::workflows::pipeline::{admin_router, directory_router, DirectoryService};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub(crate) const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Shared-secret check in front of the moderation routes.
#[derive(Clone, Debug)]
pub(crate) struct AdminGate {
    secret: Option<Arc<str>>,
    production: bool,
}

impl AdminGate {
    pub(crate) fn new(secret: Option<String>, production: bool) -> Self {
        if secret.is_none() {
            if production {
                warn!("ADMIN_SECRET is not set; admin routes are disabled");
            } else {
                warn!("ADMIN_SECRET is not set; admin routes are open outside production");
            }
        }
        Self {
            secret: secret.map(Arc::from),
            production,
        }
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        match &self.secret {
            Some(secret) => {
                let presented = headers
                    .get(ADMIN_SECRET_HEADER)
                    .and_then(|value| value.to_str().ok());
                if presented == Some(secret.as_ref()) {
                    Ok(())
                } else {
                    Err(StatusCode::UNAUTHORIZED)
                }
            }
            None if self.production => Err(StatusCode::SERVICE_UNAVAILABLE),
            None => Ok(()),
        }
    }
}

pub(crate) fn with_directory_routes(service: Arc<DirectoryService>, gate: AdminGate) -> Router {
    let admin = admin_router(service.clone())
        .route_layer(middleware::from_fn_with_state(gate, require_admin));

    directory_router(service)
        .merge(admin)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

async fn require_admin(State(gate): State<AdminGate>, request: Request, next: Next) -> Response {
    match gate.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(status) => {
            let message = if status == StatusCode::UNAUTHORIZED {
                "admin credentials required"
            } else {
                "admin access is not configured"
            };
            (status, Json(json!({ "error": message }))).into_response()
        }
    }
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
