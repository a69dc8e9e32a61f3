//! Short-TTL cache for trust-analysis payloads.
//!
//! The cache is invalidated on any store write touching an affected
//! pubkey; the TTL is a safety floor against pathological read
//! amplification, not a correctness mechanism. Guarded by a
//! reader/writer lock and shared by all workers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;

/// Default cache TTL in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 30;

/// Bounded cache size; the oldest-expiring entry is evicted past this.
const MAX_CACHE_ITEMS: usize = 2048;

/// Cache key for the network-wide ring report.
pub const RINGS_KEY: &str = "trust:rings";

/// Cache key for network health statistics.
pub const NETWORK_HEALTH_KEY: &str = "trust:network-health";

/// Cache key for one subject's analysis.
#[must_use]
pub fn analysis_key(pubkey: &str) -> String {
    format!("trust:analysis:{pubkey}")
}

/// Cache key for one subject's assembled profile.
#[must_use]
pub fn profile_key(pubkey: &str) -> String {
    format!("trust:profile:{pubkey}")
}

/// TTL cache for computed trust payloads.
#[derive(Clone)]
pub struct TrustCache {
    inner: Arc<RwLock<HashMap<String, (Instant, Arc<Value>)>>>,
    ttl: Duration,
}

impl std::fmt::Debug for TrustCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustCache").field("ttl", &self.ttl).finish()
    }
}

impl TrustCache {
    /// Create a cache with the given TTL. A zero TTL disables caching.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Fetch a live entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let (expires, value) = inner.get(key)?;
        if *expires <= Instant::now() {
            return None;
        }
        Some(Arc::clone(value))
    }

    /// Store an entry.
    pub fn put(&self, key: String, value: Value) {
        if self.ttl.is_zero() {
            return;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.len() >= MAX_CACHE_ITEMS {
            if let Some(oldest) = inner
                .iter()
                .min_by_key(|(_, (expires, _))| *expires)
                .map(|(k, _)| k.clone())
            {
                inner.remove(&oldest);
            }
        }
        inner.insert(key, (Instant::now() + self.ttl, Arc::new(value)));
    }

    /// Drop the entries affected by a write touching the given pubkeys.
    /// Global payloads (rings, network health) always drop.
    pub fn invalidate_pubkeys(&self, pubkeys: &[String]) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(RINGS_KEY);
        inner.remove(NETWORK_HEALTH_KEY);
        for pubkey in pubkeys {
            inner.remove(&analysis_key(pubkey));
            inner.remove(&profile_key(pubkey));
        }
    }

    /// Drop everything.
    pub fn invalidate_all(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for TrustCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECONDS))
    }
}
