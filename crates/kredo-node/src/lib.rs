//! # kredo-node
//!
//! The Kredo discovery service node: HTTP surface, rate limiting, and
//! trust-analysis serving over the store.
//!
//! Request flow for a write: route -> rate-limit check -> shape
//! validation -> canonical serialization of the signable view -> Ed25519
//! verification -> store transaction (state change + audit row) -> commit
//! hook invalidates affected trust-cache entries -> response. Reads go
//! route -> store / trust engine / profile assembler -> response.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use kredo_store::KredoStore;
use kredo_trust::TrustCache;

use crate::config::Config;
use crate::rate_limit::{RateLimiter, RateLimitBackend, RateLimits};

pub use crate::config::Args;
pub use crate::error::{ApiError, ApiResult};

/// Shared state behind every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The transactional store.
    pub store: KredoStore,
    /// Short-TTL trust cache, invalidated by store commit hooks.
    pub cache: TrustCache,
    /// Windowed rate limiter.
    pub limiter: RateLimiter,
    /// Resolved configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the state together: the store's commit hooks invalidate the
    /// trust cache for every pubkey a write touches.
    #[must_use]
    pub fn new(config: Config, store: KredoStore) -> Self {
        let cache = TrustCache::new(Duration::from_secs(config.trust_cache_ttl_seconds));
        let hook_cache = cache.clone();
        store.on_commit(Box::new(move |event| {
            hook_cache.invalidate_pubkeys(&event.pubkeys);
        }));
        let limiter = RateLimiter::in_memory(config.rate_limits);
        Self {
            store,
            cache,
            limiter,
            config: Arc::new(config),
        }
    }

    /// Same wiring with an external rate-limit backend.
    #[must_use]
    pub fn with_rate_limit_backend(
        config: Config,
        store: KredoStore,
        backend: Arc<dyn RateLimitBackend>,
    ) -> Self {
        let mut state = Self::new(config, store);
        let limits: RateLimits = state.config.rate_limits;
        state.limiter = RateLimiter::with_backend(limits, backend);
        state
    }
}

/// Open the store at the configured path and build the full application.
///
/// # Errors
///
/// Fails when the database cannot be opened or migrated.
pub fn build_app(config: Config) -> anyhow::Result<Router> {
    let store = KredoStore::open(&config.db_path)?;
    Ok(app_with_store(config, store))
}

/// Build the application over an existing store (tests use an in-memory
/// store here).
#[must_use]
pub fn app_with_store(config: Config, store: KredoStore) -> Router {
    let state = AppState::new(config, store);
    routes::build_router(state)
}
