// ============================
// vplan-backend-lib/src/lib.rs
// ============================
//! Core functionality of the VPlan timetable server.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::auth::{build_provider, AuthProvider, SessionManager, TokenIssuer};
use crate::config::Settings;
use crate::middleware::{RateLimiter, RequestGate};
use crate::storage::{SqliteStorage, Storage};

pub use crate::router::create_router;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Configuration settings
    pub settings: Arc<Settings>,
    /// Storage backend
    pub storage: Arc<dyn Storage>,
    /// Credential validation
    pub auth: Arc<dyn AuthProvider>,
    /// API token issuer
    pub tokens: Arc<TokenIssuer>,
    /// Cookie sessions
    pub sessions: Arc<SessionManager>,
    /// Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
    /// Rate limit + authentication checks
    pub gate: Arc<RequestGate>,
}

impl AppState {
    /// Create a new application state with the provider named in `settings`
    pub fn new(storage: Arc<dyn Storage>, settings: Settings) -> anyhow::Result<Self> {
        let provider = build_provider(&settings.auth)?;
        Ok(Self::with_provider(storage, provider, settings))
    }

    /// Create a new application state around an explicit provider
    pub fn with_provider(
        storage: Arc<dyn Storage>,
        auth: Arc<dyn AuthProvider>,
        settings: Settings,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(Arc::clone(&storage), settings.token_ttl()));
        let sessions = Arc::new(SessionManager::new(Arc::clone(&storage), &settings.sessions));
        let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit.clone()));
        let gate = Arc::new(RequestGate::new(
            Arc::clone(&rate_limiter),
            Arc::clone(&sessions),
            Arc::clone(&tokens),
        ));

        Self {
            settings: Arc::new(settings),
            storage,
            auth,
            tokens,
            sessions,
            rate_limiter,
            gate,
        }
    }

    /// Open the configured SQLite database and build the state on top of it
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let storage = SqliteStorage::open(&settings.database.path)?;
        Self::new(Arc::new(storage), settings)
    }

    /// Drop stale rate limit windows, sessions and tokens
    pub async fn run_maintenance(&self) {
        self.rate_limiter.cleanup();
        match self.storage.purge_expired(Utc::now()).await {
            Ok(0) => {},
            Ok(removed) => tracing::info!(removed, "purged expired sessions and tokens"),
            Err(e) => tracing::warn!(error = %e, "purging expired sessions and tokens failed"),
        }
    }
}

/// Run [`AppState::run_maintenance`] every `period` until aborted
pub fn spawn_maintenance(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            state.run_maintenance().await;
        }
    })
}
