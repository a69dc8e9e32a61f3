//! Shared helpers for the API integration tests: an in-memory app,
//! keypair actors that sign the way real clients do, and request
//! plumbing over `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ed25519_dalek::{Signer, SigningKey};
use http_body_util::BodyExt;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use tower::ServiceExt;

use kredo_node::config::Config;
use kredo_node::rate_limit::{LimitRule, RateLimits};
use kredo_protocol::canonical::{canonical_value, signable_view};
use kredo_store::KredoStore;

/// A test client identity that signs the way the CLI and browser do.
pub struct Actor {
    key: SigningKey,
    /// `ed25519:`-prefixed pubkey string.
    pub pubkey: String,
    /// Display name used in documents.
    pub name: String,
}

impl Actor {
    pub fn new(name: &str) -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let pubkey = format!("ed25519:{}", hex::encode(key.verifying_key().to_bytes()));
        Self {
            key,
            pubkey,
            name: name.to_string(),
        }
    }

    /// Sign the canonical encoding of a payload map.
    pub fn sign_payload(&self, payload: &Value) -> String {
        let message = canonical_value(payload);
        let sig = self.key.sign(&message);
        format!("ed25519:{}", hex::encode(sig.to_bytes()))
    }

    /// Sign a full document in place: canonicalize its signable view and
    /// set the `signature` field.
    pub fn sign_document(&self, doc: &mut Value) {
        let view = signable_view(doc);
        let signature = self.sign_payload(&view);
        doc["signature"] = Value::String(signature);
    }
}

/// The app under test plus its store handle.
pub struct TestApp {
    pub router: Router,
    pub store: KredoStore,
}

/// Limits loose enough that scenario tests never trip them.
pub fn relaxed_limits() -> RateLimits {
    let loose = LimitRule {
        window_seconds: 60,
        limit: 10_000,
    };
    RateLimits {
        register: loose,
        submission: loose,
        ownership: loose,
        taxonomy: loose,
    }
}

impl TestApp {
    /// An app with relaxed rate limits, for scenario tests.
    pub fn new() -> Self {
        Self::with_limits(relaxed_limits())
    }

    /// An app with the contractual default limits.
    pub fn with_default_limits() -> Self {
        Self::with_limits(RateLimits::default())
    }

    pub fn with_limits(rate_limits: RateLimits) -> Self {
        let config = Config {
            rate_limits,
            ..Config::default()
        };
        let store = KredoStore::open_in_memory().expect("in-memory store");
        let router = kredo_node::app_with_store(config, store.clone());
        Self { router, store }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request should complete");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.post_from(uri, body, "203.0.113.10").await
    }

    /// POST with an explicit client IP (the limiter keys unsigned
    /// registration on it).
    pub async fn post_from(&self, uri: &str, body: &Value, ip: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header("x-forwarded-for", ip)
                .header("user-agent", "kredo-tests/1.0")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header("content-type", "application/json")
                .header("x-forwarded-for", "203.0.113.10")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    /// Register an actor and assert it succeeds.
    pub async fn register(&self, actor: &Actor, actor_type: &str) {
        let (status, body) = self
            .post_from(
                "/register",
                &json!({
                    "pubkey": actor.pubkey,
                    "name": actor.name,
                    "type": actor_type,
                }),
                // Distinct IP per key so registration limits never collide.
                &format!("198.51.100.{}", (actor.pubkey.as_bytes()[12] % 200) + 1),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    }
}

/// Build and sign a skill attestation document.
pub fn skill_attestation(
    attestor: &Actor,
    subject: &Actor,
    domain: &str,
    specific: &str,
    proficiency: u8,
    context: &str,
    artifacts: &[&str],
) -> Value {
    let issued = kredo_protocol::time::now();
    let expires = issued + chrono::Duration::days(365);
    let mut doc = json!({
        "kredo": "1.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "type": "skill_attestation",
        "subject": { "pubkey": subject.pubkey, "name": subject.name },
        "attestor": { "pubkey": attestor.pubkey, "name": attestor.name, "type": "human" },
        "skill": { "domain": domain, "specific": specific, "proficiency": proficiency },
        "evidence": {
            "context": context,
            "artifacts": artifacts,
            "outcome": "merged",
        },
        "issued": kredo_protocol::time::format(issued),
        "expires": kredo_protocol::time::format(expires),
    });
    attestor.sign_document(&mut doc);
    doc
}

/// Build and sign a behavioral warning.
pub fn behavioral_warning(
    attestor: &Actor,
    subject: &Actor,
    category: &str,
    context: &str,
    artifacts: &[&str],
) -> Value {
    let issued = kredo_protocol::time::now();
    let expires = issued + chrono::Duration::days(365);
    let mut doc = json!({
        "kredo": "1.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "type": "behavioral_warning",
        "subject": { "pubkey": subject.pubkey, "name": subject.name },
        "attestor": { "pubkey": attestor.pubkey, "name": attestor.name, "type": "human" },
        "warning_category": category,
        "evidence": {
            "context": context,
            "artifacts": artifacts,
            "outcome": "",
        },
        "issued": kredo_protocol::time::format(issued),
        "expires": kredo_protocol::time::format(expires),
    });
    attestor.sign_document(&mut doc);
    doc
}

/// Build and sign a revocation for an attestation.
pub fn revocation(revoker: &Actor, attestation_id: &str, reason: &str) -> Value {
    let mut doc = json!({
        "kredo": "1.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "attestation_id": attestation_id,
        "revoker": { "pubkey": revoker.pubkey, "name": revoker.name },
        "reason": reason,
        "issued": kredo_protocol::time::format(kredo_protocol::time::now()),
    });
    revoker.sign_document(&mut doc);
    doc
}

/// Build and sign a dispute against a warning.
pub fn dispute(disputor: &Actor, warning_id: &str, response: &str) -> Value {
    let mut doc = json!({
        "kredo": "1.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "warning_id": warning_id,
        "disputor": { "pubkey": disputor.pubkey, "name": disputor.name },
        "response": response,
        "issued": kredo_protocol::time::format(kredo_protocol::time::now()),
    });
    disputor.sign_document(&mut doc);
    doc
}

/// A context string that scores well: long, specific, entity-bearing.
pub fn strong_context(reference: &str) -> String {
    format!(
        "Reviewed the code end to end for {reference}, traced the session expiry \
         regression to the cache invalidation path, and replayed the full login \
         flow against the staging environment across 3 regions before signoff. \
         The change shipped in release 2026.24 with zero rollbacks and the \
         follow-up audit confirmed the fix held under peak load."
    )
}

/// Sorted `{path, sha256}` manifest entries from `(path, seed)` pairs.
pub fn manifest(entries: &[(&str, u8)]) -> Value {
    let mut list: Vec<Value> = entries
        .iter()
        .map(|(path, seed)| {
            json!({
                "path": path,
                "sha256": hex::encode([*seed; 32]),
            })
        })
        .collect();
    list.sort_by_key(|v| v["path"].as_str().map(String::from));
    Value::Array(list)
}
