//! Registry of published services and service images, backed by SQLite.
//!
//! Documents are stored as JSON bodies in a single `documents` table, keyed
//! by a UUID string and scoped by collection; `model_name` and `task` are
//! mirrored into indexed columns for filtering.
pub mod api;
pub mod document_store;
pub mod migration;
pub mod schema;

pub use document_store::DocumentStore;
pub use migration::MigrationManager;
pub use schema::{AiService, AiServiceImage, CodeContents, DocumentFilter, RegistryDocument, StoredDocument};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;

pub struct RegistryDatabase {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl RegistryDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening registry database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
        }
        info!("Registry database initialized successfully");
        Ok(Self { pool: Arc::new(pool) })
    }

    /// Single-connection pool: every SQLite `:memory:` connection is its own database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn store<T: RegistryDocument>(&self) -> DocumentStore<T> {
        DocumentStore::new(Arc::clone(&self.pool))
    }

    pub fn services(&self) -> DocumentStore<AiService> {
        self.store()
    }

    pub fn images(&self) -> DocumentStore<AiServiceImage> {
        self.store()
    }
}

/// Start the registry API and block until shutdown.
pub async fn run_registry_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let database = match RegistryDatabase::new(&cfg.registry_db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!("Failed to open registry database: {}. Falling back to in-memory.", e);
            Arc::new(RegistryDatabase::new_in_memory()?)
        }
    };

    let addr = cfg.registry_addr()?;
    info!("Starting registry on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_registry_router(database, Duration::from_secs(cfg.request_timeout_seconds));

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::service::shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_registry_router(database: Arc<RegistryDatabase>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        .route(
            "/ai-services/",
            get(api::list::<AiService>).post(api::create::<AiService>),
        )
        .route(
            "/ai-service/:id",
            get(api::get_one::<AiService>)
                .put(api::update::<AiService>)
                .delete(api::delete::<AiService>),
        )
        .route(
            "/ai-service-images/",
            get(api::list::<AiServiceImage>).post(api::create::<AiServiceImage>),
        )
        .route(
            "/ai-service-images/:id",
            get(api::get_one::<AiServiceImage>)
                .put(api::update::<AiServiceImage>)
                .delete(api::delete::<AiServiceImage>),
        )
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(database)
}
