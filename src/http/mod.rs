//! HTTP/JSON surface.

pub mod context;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::auth::TokenAuthority;
use crate::config::Config;
use crate::error::{MarketError, Result};
use crate::store::Store;

pub use context::Identity;
pub use error::{ApiError, ApiResult};

/// Shared, immutable per-process state. Each request opens its own
/// database connection from `store`.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub tokens: TokenAuthority,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let tokens = TokenAuthority::new(config.require_jwt_secret()?);
        let store = Store::new(config.database.clone());
        Ok(Self {
            config,
            store,
            tokens,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/api/tasks", post(routes::create_task))
        .route("/api/tasks/accept", post(routes::accept_task))
        .route("/api/tasks/otp", post(routes::issue_otp).get(routes::verify_otp))
        .route("/api/tasks/status", post(routes::update_status))
        .route("/api/tasks/nearby", get(routes::nearby_tasks))
        .route("/api/tasks/{task_id}", get(routes::get_task))
        .route("/api/events", get(routes::list_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize the database, bind, and serve until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config)?);
    state.store.init()?;

    let listener = tokio::net::TcpListener::bind(state.config.bind.as_str()).await?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        database = %state.store.path().display(),
        version = crate::build_info::version(),
        "taskmarket listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .map_err(MarketError::Io)
}
