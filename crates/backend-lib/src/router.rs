// ============================
// vplan-backend-lib/src/router.rs
// ============================
//! HTTP router.
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::handlers::{authenticate, get_vplan, health, logout};
use crate::AppState;

/// Create the application router.
///
/// When `web.static_dir` points at an existing directory it is served
/// for every path the API does not claim.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/authenticate/{username}", post(authenticate))
        .route("/api/logout", post(logout))
        .route("/api/vplan", get(get_vplan))
        .route("/api/health", get(health));

    match &state.settings.web.static_dir {
        Some(dir) if dir.is_dir() => {
            tracing::info!(dir = %dir.display(), "serving static frontend");
            router = router.fallback_service(ServeDir::new(dir));
        },
        Some(dir) => tracing::warn!(dir = %dir.display(), "static_dir is not a directory, not serving it"),
        None => {},
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
