//! HTTP surface of a wrapped model.
//!
//! Every response carries `X-Process-Time` (seconds), `X-NODE-ID` and
//! `X-K8S-POD-NAME`; profiling clients read the node identity from them.
pub mod form;
pub mod handlers;
pub mod run_log;
pub mod state;

pub use run_log::{LatestRun, RunLog, UeRunLog};
pub use state::{NodeIdentity, ServiceState};

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::model_runtime::build_model;
use crate::profiling::Profiler;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";
pub const NODE_ID_HEADER: &str = "x-node-id";
pub const POD_NAME_HEADER: &str = "x-k8s-pod-name";

/// Start the model service and block until shutdown.
pub async fn run_model_service(cfg: Config) -> anyhow::Result<()> {
    let started = Instant::now();
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let profiler = Arc::new(tokio::task::spawn_blocking(Profiler::new).await?);
    info!("Profiling on {} ({})", profiler.device_type(), profiler.device_name());

    let model = build_model(&cfg)?;
    let state = ServiceState::new(&cfg, model, profiler, started);
    let duration = state.mark_initialized();
    info!("AI service loaded in {:.2} seconds", duration);

    let addr = cfg.service_addr()?;
    info!("Starting model service on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let app = build_service_router(
        state,
        cfg.max_upload_bytes(),
        Duration::from_secs(cfg.request_timeout_seconds),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Model service stopped");
    Ok(())
}

pub fn build_service_router(state: ServiceState, max_upload_bytes: usize, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any)
        .expose_headers(Any);

    let mut router = Router::new()
        .route("/run", post(handlers::run))
        .route("/model/run", post(handlers::run))
        .route("/profile_run", post(handlers::profile_run))
        .route("/profile", post(handlers::profile_run))
        .route("/model/profile_run", post(handlers::profile_run));

    if state.supports_xai() {
        router = router
            .route("/xai_model/run", post(handlers::xai_run))
            .route("/xai_model/profile_run", post(handlers::xai_profile_run));
    }

    router
        .route("/help", get(handlers::help))
        .route("/get_ue_log", get(handlers::get_ue_log))
        .route("/initialization_duration", get(handlers::initialization_duration))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), node_headers))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

async fn node_headers(State(state): State<ServiceState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let mut response = next.run(request).await;

    let process_time = start.elapsed().as_secs_f64();
    crate::metrics::inc_request(&route, response.status().as_str());

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&process_time.to_string()) {
        headers.insert(PROCESS_TIME_HEADER, value);
    }
    match HeaderValue::from_str(&state.node.node_id) {
        Ok(value) => {
            headers.insert(NODE_ID_HEADER, value);
        }
        Err(_) => warn!("Node id '{}' is not a valid header value", state.node.node_id),
    }
    if let Ok(value) = HeaderValue::from_str(&state.node.k8s_pod_name) {
        headers.insert(POD_NAME_HEADER, value);
    }
    response
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
