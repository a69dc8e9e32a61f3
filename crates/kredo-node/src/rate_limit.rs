//! Windowed rate limiting per (endpoint class, key).
//!
//! Counters live behind a pluggable backend so a multi-instance
//! deployment can swap in a shared store; the in-process backend is the
//! default for a single node. Counters are consumed at admission and are
//! not refunded if the request later fails or the client disconnects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;

/// Endpoint classes with independent limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimitClass {
    /// Unsigned `/register`, keyed by source IP.
    Register,
    /// Attestations, revocations, disputes, keyed by submitter pubkey.
    Submission,
    /// Ownership and integrity writes, keyed by submitter pubkey.
    Ownership,
    /// Taxonomy mutations, keyed by submitter pubkey.
    Taxonomy,
}

impl LimitClass {
    fn as_str(self) -> &'static str {
        match self {
            LimitClass::Register => "register",
            LimitClass::Submission => "submission",
            LimitClass::Ownership => "ownership",
            LimitClass::Taxonomy => "taxonomy",
        }
    }
}

/// One class's window and limit. These defaults are contractual.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct LimitRule {
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Admissions per window.
    pub limit: u32,
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            limit: 1,
        }
    }
}

/// Per-class rules, overridable via `RATE_LIMITS_JSON`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimits {
    /// Unsigned registration rule.
    pub register: LimitRule,
    /// Document submission rule.
    pub submission: LimitRule,
    /// Ownership/integrity rule.
    pub ownership: LimitRule,
    /// Taxonomy mutation rule.
    pub taxonomy: LimitRule,
}

impl RateLimits {
    /// The rule for a class.
    #[must_use]
    pub fn rule(&self, class: LimitClass) -> LimitRule {
        match class {
            LimitClass::Register => self.register,
            LimitClass::Submission => self.submission,
            LimitClass::Ownership => self.ownership,
            LimitClass::Taxonomy => self.taxonomy,
        }
    }
}

/// Outcome of an admission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allowed,
    /// The window is exhausted.
    Limited {
        /// Seconds until the window resets.
        retry_after_seconds: u64,
    },
}

impl Decision {
    /// Whether the request was admitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Counter storage behind the limiter. Implementations must be safe to
/// call from any worker.
pub trait RateLimitBackend: Send + Sync {
    /// Consume one admission for `(class_key, window, limit)`, returning
    /// the decision.
    fn hit(&self, class_key: &str, window: Duration, limit: u32) -> Decision;
}

/// In-process backend: a windowed counter per key.
#[derive(Default)]
pub struct InMemoryBackend {
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimitBackend for InMemoryBackend {
    fn hit(&self, class_key: &str, window: Duration, limit: u32) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = windows.entry(class_key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= window {
            *entry = (now, 0);
        }
        if entry.1 < limit {
            entry.1 += 1;
            Decision::Allowed
        } else {
            let elapsed = now.duration_since(entry.0);
            let remaining = window.saturating_sub(elapsed);
            Decision::Limited {
                retry_after_seconds: remaining.as_secs().max(1),
            }
        }
    }
}

/// The rate limiter: rules plus a backend.
#[derive(Clone)]
pub struct RateLimiter {
    limits: RateLimits,
    backend: Arc<dyn RateLimitBackend>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Build with the in-process backend.
    #[must_use]
    pub fn in_memory(limits: RateLimits) -> Self {
        Self {
            limits,
            backend: Arc::new(InMemoryBackend::default()),
        }
    }

    /// Build with an external backend (shared store).
    #[must_use]
    pub fn with_backend(limits: RateLimits, backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { limits, backend }
    }

    /// Attempt to admit a request for `(class, key)`.
    #[must_use]
    pub fn check(&self, class: LimitClass, key: &str) -> Decision {
        let rule = self.limits.rule(class);
        if rule.limit == 0 {
            return Decision::Allowed;
        }
        let class_key = format!("{}:{key}", class.as_str());
        self.backend
            .hit(&class_key, Duration::from_secs(rule.window_seconds), rule.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::in_memory(RateLimits::default())
    }

    #[test]
    fn test_default_rules_are_contractual() {
        let limits = RateLimits::default();
        for class in [
            LimitClass::Register,
            LimitClass::Submission,
            LimitClass::Ownership,
            LimitClass::Taxonomy,
        ] {
            let rule = limits.rule(class);
            assert_eq!(rule.window_seconds, 60);
            assert_eq!(rule.limit, 1);
        }
    }

    #[test]
    fn test_n_plus_one_in_window() {
        let limiter = limiter();
        let first = limiter.check(LimitClass::Submission, "ed25519:aa");
        assert!(first.is_allowed());
        let second = limiter.check(LimitClass::Submission, "ed25519:aa");
        match second {
            Decision::Limited { retry_after_seconds } => {
                assert!(retry_after_seconds >= 1 && retry_after_seconds <= 60);
            }
            Decision::Allowed => panic!("second request within window must be limited"),
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter();
        assert!(limiter.check(LimitClass::Submission, "ed25519:aa").is_allowed());
        assert!(limiter.check(LimitClass::Submission, "ed25519:bb").is_allowed());
    }

    #[test]
    fn test_classes_are_independent() {
        let limiter = limiter();
        assert!(limiter.check(LimitClass::Submission, "k").is_allowed());
        assert!(limiter.check(LimitClass::Ownership, "k").is_allowed());
        assert!(limiter.check(LimitClass::Taxonomy, "k").is_allowed());
        assert!(limiter.check(LimitClass::Register, "k").is_allowed());
    }

    #[test]
    fn test_window_expiry_resets_counter() {
        let limits = RateLimits {
            submission: LimitRule { window_seconds: 0, limit: 1 },
            ..RateLimits::default()
        };
        let limiter = RateLimiter::in_memory(limits);
        // Zero-length window: every request starts a fresh window.
        assert!(limiter.check(LimitClass::Submission, "k").is_allowed());
        assert!(limiter.check(LimitClass::Submission, "k").is_allowed());
    }

    #[test]
    fn test_overrides_parse_from_json() {
        let json = r#"{"submission": {"window_seconds": 10, "limit": 5}}"#;
        let limits: RateLimits = serde_json::from_str(json).unwrap();
        assert_eq!(limits.submission, LimitRule { window_seconds: 10, limit: 5 });
        // Unspecified classes keep the defaults.
        assert_eq!(limits.register, LimitRule::default());
    }

    #[test]
    fn test_zero_limit_disables_class() {
        let limits = RateLimits {
            submission: LimitRule { window_seconds: 60, limit: 0 },
            ..RateLimits::default()
        };
        let limiter = RateLimiter::in_memory(limits);
        for _ in 0..5 {
            assert!(limiter.check(LimitClass::Submission, "k").is_allowed());
        }
    }
}
