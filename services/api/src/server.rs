use crate::cli::ServeArgs;
use crate::infra::{build_directory, AppState};
use crate::routes::{with_directory_routes, AdminGate};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use profile_directory::config::AppConfig;
use profile_directory::error::AppError;
use profile_directory::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let directory = build_directory(&config)?;
    let gate = AdminGate::new(
        config.admin.shared_secret.clone(),
        config.environment.is_production(),
    );

    let app = with_directory_routes(directory.service.clone(), gate)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "profile directory ready");

    axum::serve(listener, app).await?;

    if let Some(primary) = directory.primary {
        primary.close().await;
    }
    Ok(())
}
