use metrics_exporter_prometheus::PrometheusHandle;
use profile_directory::config::AppConfig;
use profile_directory::error::AppError;
use profile_directory::workflows::pipeline::{
    seed_listings, CategoryLinks, DirectoryService, FileStore, Listing, MemoryCategoryLinks,
    MemoryTable, Notifier, PrimaryStore, Submission, TierAccessor, TierPolicy, TierRecord,
    TierStore,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wired directory service plus the primary store handle, kept so callers can close the pool.
pub(crate) struct Directory {
    pub(crate) service: Arc<DirectoryService>,
    pub(crate) primary: Option<Arc<PrimaryStore>>,
}

pub(crate) fn build_directory(config: &AppConfig) -> Result<Directory, AppError> {
    let primary = match config.storage.primary_url() {
        Some(url) => Some(Arc::new(PrimaryStore::connect_lazy(url)?)),
        None => {
            if config.storage.database_url.is_some() {
                warn!("DATABASE_URL looks like a template value; primary store disabled");
            }
            None
        }
    };
    let data_dir = config.storage.data_dir.as_deref();

    let submissions = tiered::<Submission>(
        primary.as_ref(),
        data_dir,
        TierPolicy::with_mode(config.storage.fallback),
        Vec::new(),
    );
    let listings = tiered::<Listing>(
        primary.as_ref(),
        data_dir,
        TierPolicy::with_mode(config.storage.fallback),
        seed_listings(),
    );
    let categories: Arc<dyn CategoryLinks> = match &primary {
        Some(store) => store.clone(),
        None => Arc::new(MemoryCategoryLinks::default()),
    };

    info!(
        primary = primary.is_some(),
        secondary = data_dir.is_some(),
        fallback = ?config.storage.fallback,
        "directory storage tiers configured"
    );

    let service = DirectoryService::new(
        Arc::new(submissions),
        Arc::new(listings),
        categories,
        Notifier::from_config(&config.notifications),
    )
    .with_expected_listings(config.storage.expected_listings);

    Ok(Directory {
        service: Arc::new(service),
        primary,
    })
}

fn tiered<R>(
    primary: Option<&Arc<PrimaryStore>>,
    data_dir: Option<&Path>,
    policy: TierPolicy,
    seed: Vec<R>,
) -> TierAccessor<R>
where
    R: TierRecord,
    PrimaryStore: TierStore<R>,
{
    let mut accessor = TierAccessor::new(Arc::new(MemoryTable::with_seed(seed.clone())), policy);
    if let Some(store) = primary {
        accessor = accessor.with_primary(store.clone() as Arc<dyn TierStore<R>>);
    }
    if let Some(dir) = data_dir {
        accessor =
            accessor.with_secondary(Arc::new(FileStore::<R>::new(dir).with_seed(seed.clone())));
    }
    accessor.with_seed(seed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use profile_directory::config::{
        AdminConfig, AppEnvironment, LogFormat, NotificationConfig, ServerConfig, StorageConfig,
        TelemetryConfig,
    };
    use profile_directory::workflows::pipeline::{FallbackMode, TierKind};

    pub(crate) fn config(database_url: Option<&str>) -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                format: LogFormat::Compact,
            },
            storage: StorageConfig {
                database_url: database_url.map(str::to_string),
                data_dir: None,
                fallback: FallbackMode::Degrade,
                expected_listings: None,
            },
            notifications: NotificationConfig {
                endpoint: None,
                api_key: None,
                sender: "directory@localhost".to_string(),
                admin_email: None,
                timeout_ms: 1_000,
            },
            admin: AdminConfig {
                shared_secret: None,
            },
        }
    }

    #[tokio::test]
    async fn without_database_listings_come_from_seeded_cache() {
        let directory = build_directory(&config(None)).expect("directory");
        assert!(directory.primary.is_none());

        let read = directory.service.public_listings().await.expect("listings");
        assert_eq!(read.tier, TierKind::Tertiary);
        assert_eq!(read.data.len(), seed_listings().len());
    }

    #[tokio::test]
    async fn data_dir_is_seeded_once_and_keeps_deletions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config(None);
        config.storage.data_dir = Some(dir.path().to_path_buf());

        let directory = build_directory(&config).expect("directory");
        let read = directory.service.admin_listings().await.expect("listings");
        assert_eq!(read.tier, TierKind::Secondary);
        assert_eq!(read.data.len(), seed_listings().len());
        assert!(dir.path().join("listings.json").exists());

        for listing in &read.data {
            directory
                .service
                .delete_listing(&listing.id)
                .await
                .expect("deleted");
        }

        let rebuilt = build_directory(&config).expect("directory");
        let read = rebuilt.service.admin_listings().await.expect("listings");
        assert_eq!(read.tier, TierKind::Secondary);
        assert!(read.data.is_empty());
    }

    #[tokio::test]
    async fn template_database_url_is_ignored() {
        let directory =
            build_directory(&config(Some("postgres://your-user@example.com/db"))).expect("directory");
        assert!(directory.primary.is_none());
    }

    #[tokio::test]
    async fn configured_database_becomes_primary_tier() {
        let directory = build_directory(&config(Some("sqlite::memory:"))).expect("directory");
        assert!(directory.primary.is_some());
    }
}
