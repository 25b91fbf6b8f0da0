//! # Questline HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Summary counts
//! - `POST /achievements` / `GET /achievements` - Configure / list achievements
//! - `GET /achievements/{id}` - Achievement definition
//! - `POST /achievements/{id}/enable` / `disable` - Flip the enabled flag
//! - `GET /achievements/{id}/metadata[/{key}]`, `POST /achievements/{id}/metadata/{key}`
//! - `GET /categories/{category}` - Definitions and totals of a category
//! - `POST /principals/authorize` / `revoke` - Allow-list management
//! - `POST /progress/update` / `observe` / `unlock` - Progress mutations
//! - `GET /progress/{id}/{participant}` - Detailed progress
//! - `GET /participants/{participant}/categories[/{category}]` - Rollups
//! - `GET /participants/{participant}/completed` - Completed achievements
//! - `GET /events` - Recent engine events
//! - `GET /export` - Snapshot export
//!
//! Mutation bodies carry the calling principal in `caller`; the engine's
//! guard decides whether it may act. The API key (below) gates the HTTP
//! surface as a whole.
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `QUESTLINE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `QUESTLINE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `QUESTLINE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::get_api_key_from_env;
pub use handlers::{log_event, log_events_since};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    AchievementListResponse, AchievementResponse, AckResponse, ApiError, ApiResult,
    CallerRequest, CategoryResponse, CompletedResponse, ConfigureRequest,
    DetailedProgressResponse, EventsQuery, EventsResponse, ExportResponse, HealthResponse,
    MetadataEntry, MetadataResponse, MetadataValueResponse, ObserveProgressRequest,
    ParticipantCategoriesResponse, PrincipalRequest, ProgressResponse, SetMetadataRequest,
    StatusResponse, UnlockRequest, UpdateProgressRequest, status_for,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use questline_core::{QuestError, Tracker};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the tracker.
#[derive(Clone)]
pub struct AppState {
    /// The tracker, behind one coarse lock.
    pub tracker: Arc<RwLock<Tracker>>,
}

impl AppState {
    /// Create new app state with a tracker.
    #[must_use]
    pub fn new(tracker: Tracker) -> Self {
        Self {
            tracker: Arc::new(RwLock::new(tracker)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `QUESTLINE_CORS_ORIGINS`:
/// - `*` allows all origins
/// - unset defaults to localhost only
/// - otherwise a comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("QUESTLINE_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (QUESTLINE_CORS_ORIGINS=*). Do not use in production."
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in QUESTLINE_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No QUESTLINE_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - global request budget (if enabled)
/// 4. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let api_key = get_api_key_from_env().map(auth::ApiKey::new);
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible. \
             Set QUESTLINE_API_KEY to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/achievements",
            get(handlers::list_achievements_handler).post(handlers::configure_handler),
        )
        .route("/achievements/{id}", get(handlers::get_achievement_handler))
        .route("/achievements/{id}/enable", post(handlers::enable_handler))
        .route("/achievements/{id}/disable", post(handlers::disable_handler))
        .route(
            "/achievements/{id}/metadata",
            get(handlers::list_metadata_handler),
        )
        .route(
            "/achievements/{id}/metadata/{key}",
            get(handlers::get_metadata_handler).post(handlers::set_metadata_handler),
        )
        .route("/categories/{category}", get(handlers::category_handler))
        .route("/principals/authorize", post(handlers::authorize_handler))
        .route("/principals/revoke", post(handlers::revoke_handler))
        .route("/progress/update", post(handlers::update_progress_handler))
        .route("/progress/observe", post(handlers::observe_progress_handler))
        .route("/progress/unlock", post(handlers::unlock_handler))
        .route(
            "/progress/{id}/{participant}",
            get(handlers::get_progress_handler),
        )
        .route(
            "/participants/{participant}/categories",
            get(handlers::participant_categories_handler),
        )
        .route(
            "/participants/{participant}/categories/{category}",
            get(handlers::participant_category_handler),
        )
        .route(
            "/participants/{participant}/completed",
            get(handlers::completed_handler),
        )
        .route("/events", get(handlers::events_handler))
        .route("/export", get(handlers::export_handler));

    // Innermost: runs last on request
    if let Some(key) = api_key {
        router = router.layer(axum_middleware::from_fn_with_state(
            key,
            auth::api_key_auth_middleware,
        ));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, tracker: Tracker) -> Result<(), QuestError> {
    let state = AppState::new(tracker);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| QuestError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Questline HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| QuestError::IoError(format!("Server error: {}", e)))
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
