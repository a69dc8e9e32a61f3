//! API-level tests for the contract properties: registration immutability,
//! signature gating, permission checks, rate limits, cache freshness, the
//! ownership state machine, and the error envelope.

mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::{
    dispute, revocation, skill_attestation, strong_context, Actor, TestApp,
};

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_unsigned_reregistration_never_overwrites() {
    let app = TestApp::new();
    let actor = Actor::new("Alice");

    let (status, _) = app
        .post_from(
            "/register",
            &json!({ "pubkey": actor.pubkey, "name": "Alice", "type": "human" }),
            "203.0.113.1",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post_from(
            "/register",
            &json!({ "pubkey": actor.pubkey, "name": "Mallory", "type": "agent" }),
            "203.0.113.2",
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["details"]["registration"]["name"], "Alice");
    assert_eq!(body["details"]["registration"]["type"], "human");

    let (_, agent) = app.get(&format!("/agents/{}", actor.pubkey)).await;
    assert_eq!(agent["name"], "Alice");
}

#[tokio::test]
async fn test_register_update_requires_matching_signature() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let mallory = Actor::new("Mallory");
    app.register(&alice, "human").await;

    // Signed by the wrong key: rejected, row untouched.
    let payload = json!({
        "action": "register_update",
        "pubkey": alice.pubkey,
        "name": "Hacked",
        "type": "agent",
    });
    let (status, body) = app
        .post(
            "/register/update",
            &json!({
                "pubkey": alice.pubkey,
                "name": "Hacked",
                "type": "agent",
                "signature": mallory.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "signature_invalid");

    let (_, agent) = app.get(&format!("/agents/{}", alice.pubkey)).await;
    assert_eq!(agent["name"], "Alice");

    // Signed by the key itself: applied.
    let (status, body) = app
        .post(
            "/register/update",
            &json!({
                "pubkey": alice.pubkey,
                "name": "Hacked",
                "type": "agent",
                "signature": alice.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "update failed: {body}");
    let (_, agent) = app.get(&format!("/agents/{}", alice.pubkey)).await;
    assert_eq!(agent["name"], "Hacked");
}

#[tokio::test]
async fn test_register_update_unknown_key_is_404() {
    let app = TestApp::new();
    let ghost = Actor::new("Ghost");
    let payload = json!({
        "action": "register_update",
        "pubkey": ghost.pubkey,
        "name": "Ghost",
        "type": "agent",
    });
    let (status, body) = app
        .post(
            "/register/update",
            &json!({
                "pubkey": ghost.pubkey,
                "name": "Ghost",
                "type": "agent",
                "signature": ghost.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

// ============================================================================
// Signature and permission gating
// ============================================================================

#[tokio::test]
async fn test_tampered_attestation_rejected() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    let mut doc = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        3,
        &strong_context("pr:plan-1"),
        &["pr:plan-1"],
    );
    // Mutate after signing.
    doc["skill"]["proficiency"] = json!(5);

    let (status, body) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "signature_invalid");
}

#[tokio::test]
async fn test_unknown_domain_rejected() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    let doc = skill_attestation(
        &alice,
        &bob,
        "underwater-basketry",
        "weaving",
        3,
        &strong_context("pr:basket-1"),
        &["pr:basket-1"],
    );
    let (status, body) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_revocation_by_non_attestor_denied() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    let eve = Actor::new("Eve");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;
    app.register(&eve, "human").await;

    let doc = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        3,
        &strong_context("pr:plan-2"),
        &["pr:plan-2"],
    );
    let (status, _) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CREATED);

    let rev = revocation(&eve, doc["id"].as_str().unwrap(), "I disagree with it");
    let (status, body) = app.post("/revoke", &rev).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_error");

    // Target unchanged.
    let (_, stored) = app
        .get(&format!("/attestations/{}", doc["id"].as_str().unwrap()))
        .await;
    assert_eq!(stored["_meta"]["is_revoked"], false);
}

#[tokio::test]
async fn test_dispute_permission_and_target_rules() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    let eve = Actor::new("Eve");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;
    app.register(&eve, "agent").await;

    // Dispute against a skill attestation is a validation error.
    let skill = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        3,
        &strong_context("pr:plan-3"),
        &["pr:plan-3"],
    );
    app.post("/attestations", &skill).await;
    let disp = dispute(&bob, skill["id"].as_str().unwrap(), "not a warning at all");
    let (status, body) = app.post("/dispute", &disp).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    // Dispute by a non-subject is forbidden.
    let warning = support::behavioral_warning(
        &alice,
        &bob,
        "deception",
        "Agent presented fabricated benchmark results in 3 separate sessions \
         on 2026-07-22; the reported numbers did not reproduce under the \
         published harness and the agent repeated the claim after correction. \
         Logs attached.",
        &["log:session-2201"],
    );
    app.post("/attestations", &warning).await;
    let disp = dispute(&eve, warning["id"].as_str().unwrap(), "I dispute on his behalf");
    let (status, body) = app.post("/dispute", &disp).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_error");
}

#[tokio::test]
async fn test_weak_warning_evidence_insufficient() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    // Long-but-ancient warning: recency and specificity collapse the
    // composite below the 0.4 floor.
    let issued = kredo_protocol::time::now();
    let old_interaction = issued - chrono::Duration::days(690);
    // 104 chars of filler, one qualifying artifact among noise, stale
    // interaction: specificity, verifiability, and recency all collapse.
    let context = "bad bot ".repeat(13);
    let mut doc = json!({
        "kredo": "1.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "type": "behavioral_warning",
        "subject": { "pubkey": bob.pubkey, "name": bob.name },
        "attestor": { "pubkey": alice.pubkey, "name": alice.name, "type": "human" },
        "warning_category": "spam",
        "evidence": {
            "context": context,
            "artifacts": ["log:x", "nothing", "nope", "still nothing", "more noise"],
            "outcome": "",
            "interaction_date": kredo_protocol::time::format(old_interaction),
        },
        "issued": kredo_protocol::time::format(issued),
        "expires": kredo_protocol::time::format(issued + chrono::Duration::days(30)),
    });
    alice.sign_document(&mut doc);

    let (status, body) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body: {body}");
    assert_eq!(body["error"], "evidence_insufficient");
}

// ============================================================================
// Rate limiting (contractual defaults)
// ============================================================================

#[tokio::test]
async fn test_register_rate_limited_per_ip() {
    let app = TestApp::with_default_limits();
    let a = Actor::new("A");
    let b = Actor::new("B");

    let (status, _) = app
        .post_from(
            "/register",
            &json!({ "pubkey": a.pubkey, "name": "A", "type": "agent" }),
            "198.51.100.77",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Second registration from the same IP within the window.
    let (status, body) = app
        .post_from(
            "/register",
            &json!({ "pubkey": b.pubkey, "name": "B", "type": "agent" }),
            "198.51.100.77",
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");
    let retry = body["details"]["retry_after_seconds"].as_u64().unwrap();
    assert!(retry >= 1 && retry <= 60);

    // A different IP is unaffected.
    let (status, _) = app
        .post_from(
            "/register",
            &json!({ "pubkey": b.pubkey, "name": "B", "type": "agent" }),
            "198.51.100.78",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_submission_rate_limited_per_pubkey() {
    let app = TestApp::with_default_limits();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    // Register from distinct IPs under the default limits.
    let (status, _) = app
        .post_from(
            "/register",
            &json!({ "pubkey": alice.pubkey, "name": "Alice", "type": "human" }),
            "198.51.100.81",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post_from(
            "/register",
            &json!({ "pubkey": bob.pubkey, "name": "Bob", "type": "agent" }),
            "198.51.100.82",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let first = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        3,
        &strong_context("pr:plan-9"),
        &["pr:plan-9"],
    );
    let (status, _) = app.post("/attestations", &first).await;
    assert_eq!(status, StatusCode::CREATED);

    let second = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        3,
        &strong_context("pr:plan-10"),
        &["pr:plan-10"],
    );
    let (status, body) = app.post("/attestations", &second).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Reads stay unlimited.
    for _ in 0..5 {
        let (status, _) = app.get("/search").await;
        assert_eq!(status, StatusCode::OK);
    }
}

// ============================================================================
// Trust cache freshness
// ============================================================================

#[tokio::test]
async fn test_analysis_reflects_writes_immediately() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    // Prime the cache with the empty analysis.
    let (_, before) = app.get(&format!("/trust/analysis/{}", bob.pubkey)).await;
    assert_eq!(before["reputation_score"].as_f64().unwrap(), 0.0);

    let doc = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        4,
        &strong_context("pr:plan-4"),
        &["pr:plan-4"],
    );
    let (status, _) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CREATED);

    // No stale response: the accepting write invalidated bob's entry.
    let (_, after) = app.get(&format!("/trust/analysis/{}", bob.pubkey)).await;
    assert!(after["reputation_score"].as_f64().unwrap() > 0.0);
    assert_eq!(after["attestation_weights"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Ownership state machine
// ============================================================================

async fn file_claim(app: &TestApp, agent: &Actor, human: &Actor, claim_id: &str) -> StatusCode {
    let payload = json!({
        "action": "ownership_claim",
        "claim_id": claim_id,
        "agent_pubkey": agent.pubkey,
        "human_pubkey": human.pubkey,
    });
    let (status, _) = app
        .post(
            "/ownership/claim",
            &json!({
                "claim_id": claim_id,
                "agent_pubkey": agent.pubkey,
                "human_pubkey": human.pubkey,
                "signature": agent.sign_payload(&payload),
            }),
        )
        .await;
    status
}

async fn confirm_claim(app: &TestApp, agent: &Actor, human: &Actor, claim_id: &str) -> (StatusCode, serde_json::Value) {
    let payload = json!({
        "action": "ownership_confirm",
        "claim_id": claim_id,
        "agent_pubkey": agent.pubkey,
        "human_pubkey": human.pubkey,
    });
    app.post(
        "/ownership/confirm",
        &json!({
            "claim_id": claim_id,
            "human_pubkey": human.pubkey,
            "signature": human.sign_payload(&payload),
        }),
    )
    .await
}

#[tokio::test]
async fn test_ownership_transitions_are_exclusive() {
    let app = TestApp::new();
    let agent = Actor::new("Worker");
    let human = Actor::new("Hana");
    let other = Actor::new("Olga");
    app.register(&agent, "agent").await;
    app.register(&human, "human").await;
    app.register(&other, "human").await;

    // Confirming a nonexistent claim: not found.
    let (status, _) = confirm_claim(&app, &agent, &human, "own-missing-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(file_claim(&app, &agent, &human, "own-sm-00001").await, StatusCode::OK);

    // Confirmation by a different human than named: forbidden.
    let (status, body) = confirm_claim(&app, &agent, &other, "own-sm-00001").await;
    assert_eq!(status, StatusCode::FORBIDDEN, "body: {body}");

    let (status, _) = confirm_claim(&app, &agent, &human, "own-sm-00001").await;
    assert_eq!(status, StatusCode::OK);

    // Second confirm: conflict.
    let (status, _) = confirm_claim(&app, &agent, &human, "own-sm-00001").await;
    assert_eq!(status, StatusCode::CONFLICT);

    // New claim while one is active: conflict.
    assert_eq!(
        file_claim(&app, &agent, &other, "own-sm-00002").await,
        StatusCode::CONFLICT
    );

    // Revoke by the agent, then the path reopens.
    let revoke_payload = json!({
        "action": "ownership_revoke",
        "claim_id": "own-sm-00001",
        "agent_pubkey": agent.pubkey,
        "human_pubkey": human.pubkey,
        "revoker_pubkey": agent.pubkey,
        "reason": "rotating to a new owner",
    });
    let (status, _) = app
        .post(
            "/ownership/revoke",
            &json!({
                "claim_id": "own-sm-00001",
                "revoker_pubkey": agent.pubkey,
                "reason": "rotating to a new owner",
                "signature": agent.sign_payload(&revoke_payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        file_claim(&app, &agent, &other, "own-sm-00003").await,
        StatusCode::OK
    );

    let (_, history) = app
        .get(&format!("/ownership/agent/{}", agent.pubkey))
        .await;
    assert_eq!(history["claims"].as_array().unwrap().len(), 2);
    assert!(history["active_owner"].is_null());
}

// ============================================================================
// Integrity permissions
// ============================================================================

#[tokio::test]
async fn test_baseline_requires_active_owner() {
    let app = TestApp::new();
    let agent = Actor::new("Worker");
    let human = Actor::new("Hana");
    let outsider = Actor::new("Oscar");
    app.register(&agent, "agent").await;
    app.register(&human, "human").await;
    app.register(&outsider, "human").await;

    let files = support::manifest(&[("bin/agent", 1)]);

    // No ownership link at all: forbidden.
    let payload = json!({
        "action": "integrity_set_baseline",
        "baseline_id": "bl-perm-0001",
        "agent_pubkey": agent.pubkey,
        "owner_pubkey": human.pubkey,
        "file_hashes": files,
    });
    let (status, body) = app
        .post(
            "/integrity/baseline/set",
            &json!({
                "baseline_id": "bl-perm-0001",
                "agent_pubkey": agent.pubkey,
                "owner_pubkey": human.pubkey,
                "file_hashes": files,
                "signature": human.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "body: {body}");
    assert_eq!(body["error"], "permission_error");

    // Link hana, then an outsider still cannot set the baseline.
    assert_eq!(file_claim(&app, &agent, &human, "own-perm-0001").await, StatusCode::OK);
    let (status, _) = confirm_claim(&app, &agent, &human, "own-perm-0001").await;
    assert_eq!(status, StatusCode::OK);

    let payload = json!({
        "action": "integrity_set_baseline",
        "baseline_id": "bl-perm-0002",
        "agent_pubkey": agent.pubkey,
        "owner_pubkey": outsider.pubkey,
        "file_hashes": files,
    });
    let (status, _) = app
        .post(
            "/integrity/baseline/set",
            &json!({
                "baseline_id": "bl-perm-0002",
                "agent_pubkey": agent.pubkey,
                "owner_pubkey": outsider.pubkey,
                "file_hashes": files,
                "signature": outsider.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The active owner can.
    let payload = json!({
        "action": "integrity_set_baseline",
        "baseline_id": "bl-perm-0003",
        "agent_pubkey": agent.pubkey,
        "owner_pubkey": human.pubkey,
        "file_hashes": files,
    });
    let (status, body) = app
        .post(
            "/integrity/baseline/set",
            &json!({
                "baseline_id": "bl-perm-0003",
                "agent_pubkey": agent.pubkey,
                "owner_pubkey": human.pubkey,
                "file_hashes": files,
                "signature": human.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
}

// ============================================================================
// /verify, search, taxonomy, risk
// ============================================================================

#[tokio::test]
async fn test_verify_detects_type_and_validity() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");

    let doc = skill_attestation(
        &alice,
        &bob,
        "reasoning",
        "planning",
        3,
        &strong_context("pr:plan-5"),
        &["pr:plan-5"],
    );
    let (status, body) = app.post("/verify", &doc).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["type"], "attestation");
    assert_eq!(body["expired"], false);

    // Tampered: still 200, but valid=false with a reason.
    let mut tampered = doc.clone();
    tampered["skill"]["proficiency"] = json!(5);
    let (status, body) = app.post("/verify", &tampered).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert!(body["reason"].is_string());

    // Undetectable shape: validation error.
    let (status, body) = app.post("/verify", &json!({ "whatever": 1 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    // Revocation shape detected.
    let rev = revocation(&alice, "att-unknown", "withdrawn for accuracy");
    let (status, body) = app.post("/verify", &rev).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "revocation");
    assert_eq!(body["valid"], true);
    assert_eq!(body["target_known"], false);
}

#[tokio::test]
async fn test_search_filters_and_pagination() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    let carol = Actor::new("Carol");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;
    app.register(&carol, "agent").await;

    for (subject, specific, proficiency) in [
        (&bob, "code-review", 4),
        (&bob, "refactoring", 2),
        (&carol, "code-review", 5),
    ] {
        let doc = skill_attestation(
            &alice,
            subject,
            "code-generation",
            specific,
            proficiency,
            &strong_context("pr:core-1"),
            &["pr:core-1"],
        );
        let (status, _) = app.post("/attestations", &doc).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, all) = app.get("/search?domain=code-generation").await;
    assert_eq!(all["total"], 3);

    let (_, by_subject) = app
        .get(&format!("/search?subject={}&min_proficiency=3", bob.pubkey))
        .await;
    assert_eq!(by_subject["total"], 1);
    assert_eq!(
        by_subject["attestations"][0]["skill"]["specific"],
        "code-review"
    );

    let (_, by_skill) = app.get("/search?skill=code-review").await;
    assert_eq!(by_skill["total"], 2);

    let (_, paged) = app.get("/search?limit=2&offset=2").await;
    assert_eq!(paged["total"], 3);
    assert_eq!(paged["attestations"].as_array().unwrap().len(), 1);

    let (_, who) = app.get(&format!("/trust/who-attested/{}", bob.pubkey)).await;
    assert_eq!(who["count"], 1);
    let (_, attested) = app
        .get(&format!("/trust/attested-by/{}", alice.pubkey))
        .await;
    assert_eq!(attested["count"], 2);
}

#[tokio::test]
async fn test_taxonomy_read_and_signed_mutation() {
    let app = TestApp::new();
    let creator = Actor::new("Creator");
    let other = Actor::new("Other");
    app.register(&creator, "agent").await;
    app.register(&other, "agent").await;

    let (_, full) = app.get("/taxonomy").await;
    assert_eq!(full["version"], "1.0");
    assert_eq!(full["domains"].as_object().unwrap().len(), 7);

    let (_, domain) = app.get("/taxonomy/code-generation").await;
    assert!(domain["skills"]
        .as_array()
        .unwrap()
        .contains(&json!("code-review")));

    let (status, _) = app.get("/taxonomy/not-a-domain").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Signed domain creation.
    let payload = json!({
        "action": "create_domain",
        "id": "vise-operations",
        "label": "Vise Operations",
        "pubkey": creator.pubkey,
    });
    let (status, body) = app
        .post(
            "/taxonomy/domains",
            &json!({
                "id": "vise-operations",
                "label": "Vise Operations",
                "pubkey": creator.pubkey,
                "signature": creator.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    // Bad slug rejected before anything else.
    let (status, _) = app
        .post(
            "/taxonomy/domains",
            &json!({
                "id": "Bad Slug",
                "label": "Nope",
                "pubkey": creator.pubkey,
                "signature": format!("ed25519:{}", "a".repeat(128)),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Signed skill creation in the new domain.
    let payload = json!({
        "action": "create_skill",
        "domain": "vise-operations",
        "id": "chain-orchestration",
        "pubkey": creator.pubkey,
    });
    let (status, _) = app
        .post(
            "/taxonomy/domains/vise-operations/skills",
            &json!({
                "id": "chain-orchestration",
                "pubkey": creator.pubkey,
                "signature": creator.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Deletion by a non-creator is forbidden.
    let payload = json!({
        "action": "delete_domain",
        "domain": "vise-operations",
        "pubkey": other.pubkey,
    });
    let (status, body) = app
        .delete(
            "/taxonomy/domains/vise-operations",
            &json!({
                "pubkey": other.pubkey,
                "signature": other.sign_payload(&payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "body: {body}");

    // The new skill is usable in attestations.
    let subject = Actor::new("Subject");
    app.register(&subject, "agent").await;
    let doc = skill_attestation(
        &creator,
        &subject,
        "vise-operations",
        "chain-orchestration",
        3,
        &strong_context("pr:vise-1"),
        &["pr:vise-1"],
    );
    let (status, _) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_source_anomalies_flags_burst() {
    let app = TestApp::new();
    // Ten registrations from one IP under distinct keys.
    for i in 0..10 {
        let actor = Actor::new(&format!("burst-{i}"));
        let (status, _) = app
            .post_from(
                "/register",
                &json!({ "pubkey": actor.pubkey, "name": actor.name, "type": "agent" }),
                "203.0.113.99",
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .get("/risk/source-anomalies?hours=24&min_events=8&min_unique_actors=4")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cluster_count"], 1);
    assert_eq!(body["clusters"][0]["event_count"], 10);
    assert_eq!(body["clusters"][0]["registration_count"], 10);
}

#[tokio::test]
async fn test_health_and_error_envelope() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());

    // Envelope shape on a strict lookup miss.
    let missing = format!("ed25519:{}", "0".repeat(64));
    let (status, body) = app.get(&format!("/agents/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert!(body["message"].is_string());
}
