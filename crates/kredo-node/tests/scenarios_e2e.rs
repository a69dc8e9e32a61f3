//! End-to-end scenario tests driving the full HTTP surface: register,
//! attest, revoke, dispute, rings, ownership, and the integrity gate.

mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::{
    behavioral_warning, dispute, manifest, revocation, skill_attestation, strong_context, Actor,
    TestApp,
};

// ============================================================================
// E1: Happy path — register, attest, profile
// ============================================================================

#[tokio::test]
async fn test_register_attest_and_profile() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    let doc = skill_attestation(
        &alice,
        &bob,
        "code-generation",
        "code-review",
        4,
        &strong_context("pr:auth-47"),
        &["pr:auth-47"],
    );
    let (status, body) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CREATED, "submit failed: {body}");
    assert_eq!(body["status"], "accepted");
    let composite = body["evidence_score"]["composite"].as_f64().unwrap();
    assert!(composite >= 0.6, "composite {composite} below 0.6");

    let (status, profile) = app
        .get(&format!("/agents/{}/profile", bob.pubkey))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["name"], "Bob");
    assert_eq!(profile["attestation_count"]["total"], 1);
    assert_eq!(profile["attestation_count"]["by_humans"], 1);

    let skills = profile["skills"].as_array().unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0]["domain"], "code-generation");
    assert_eq!(skills[0]["specific"], "code-review");
    let weighted = skills[0]["weighted_avg_proficiency"].as_f64().unwrap();
    assert!((weighted - 4.0).abs() < 0.01, "weighted avg {weighted}");

    let reputation = profile["trust_analysis"]["reputation_score"]
        .as_f64()
        .unwrap();
    assert!(reputation > 0.0);

    // Unlinked agent with no baseline: deployability is gated to zero.
    assert_eq!(profile["accountability"]["tier"], "unlinked");
    assert_eq!(profile["integrity"]["traffic_light"], "red");
}

// ============================================================================
// E2: Duplicate submission
// ============================================================================

#[tokio::test]
async fn test_duplicate_attestation_conflicts() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    let doc = skill_attestation(
        &alice,
        &bob,
        "code-generation",
        "code-review",
        4,
        &strong_context("pr:auth-47"),
        &["pr:auth-47"],
    );
    let (status, _) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // The first document is unchanged.
    let (status, stored) = app
        .get(&format!("/attestations/{}", doc["id"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["attestor"]["pubkey"], alice.pubkey.as_str());
}

// ============================================================================
// E3: Revocation clears the profile
// ============================================================================

#[tokio::test]
async fn test_revocation_resets_profile_and_reputation() {
    let app = TestApp::new();
    let alice = Actor::new("Alice");
    let bob = Actor::new("Bob");
    app.register(&alice, "human").await;
    app.register(&bob, "agent").await;

    let doc = skill_attestation(
        &alice,
        &bob,
        "code-generation",
        "code-review",
        4,
        &strong_context("pr:auth-47"),
        &["pr:auth-47"],
    );
    let (status, _) = app.post("/attestations", &doc).await;
    assert_eq!(status, StatusCode::CREATED);

    // Warm the caches so invalidation is actually exercised.
    let (_, before) = app.get(&format!("/agents/{}/profile", bob.pubkey)).await;
    assert_eq!(before["attestation_count"]["total"], 1);

    let rev = revocation(&alice, doc["id"].as_str().unwrap(), "issued in error");
    let (status, body) = app.post("/revoke", &rev).await;
    assert_eq!(status, StatusCode::OK, "revoke failed: {body}");
    assert_eq!(body["status"], "revoked");

    let (status, profile) = app.get(&format!("/agents/{}/profile", bob.pubkey)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["attestation_count"]["total"], 0);
    assert_eq!(
        profile["trust_analysis"]["reputation_score"].as_f64().unwrap(),
        0.0
    );
}

// ============================================================================
// E4: Warning plus dispute
// ============================================================================

#[tokio::test]
async fn test_warning_and_dispute_flow() {
    let app = TestApp::new();
    let carol = Actor::new("Carol");
    let bob = Actor::new("Bob");
    app.register(&carol, "human").await;
    app.register(&bob, "agent").await;

    let context = format!(
        "Observed repeated unsolicited bulk messages from this agent between \
         2026-07-28 and 2026-07-30 across 4 channels; message bodies were \
         near-identical and linked the same payload host. Full session logs \
         and content hashes attached. {}",
        "Delivery continued after two explicit stop requests."
    );
    let warning = behavioral_warning(
        &carol,
        &bob,
        "spam",
        &context,
        &["hash:3a7bd3e2360a3d29eea436fcfb7e44c7", "hash:9f86d081884c7d659a2f"],
    );
    let (status, body) = app.post("/attestations", &warning).await;
    assert_eq!(status, StatusCode::CREATED, "warning rejected: {body}");

    let disp = dispute(
        &bob,
        warning["id"].as_str().unwrap(),
        "These were the scheduled maintenance notifications the channel owners \
         opted into; the opt-in records are linked from my profile.",
    );
    let (status, body) = app.post("/dispute", &disp).await;
    assert_eq!(status, StatusCode::OK, "dispute rejected: {body}");
    assert_eq!(body["status"], "disputed");

    let (_, profile) = app.get(&format!("/agents/{}/profile", bob.pubkey)).await;
    let warnings = profile["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["category"], "spam");
    assert_eq!(warnings[0]["dispute_count"], 1);
    assert_eq!(warnings[0]["is_revoked"], false);
}

// ============================================================================
// E5: Ring of three
// ============================================================================

#[tokio::test]
async fn test_three_key_ring_detected_and_discounted() {
    let app = TestApp::new();
    let actors = [Actor::new("X"), Actor::new("Y"), Actor::new("Z")];
    for actor in &actors {
        app.register(actor, "agent").await;
    }

    for attestor in &actors {
        for subject in &actors {
            if attestor.pubkey == subject.pubkey {
                continue;
            }
            let doc = skill_attestation(
                attestor,
                subject,
                "reasoning",
                "planning",
                3,
                &strong_context("pr:plan-12"),
                &["pr:plan-12"],
            );
            let (status, body) = app.post("/attestations", &doc).await;
            assert_eq!(status, StatusCode::CREATED, "submit failed: {body}");
        }
    }

    let (status, rings) = app.get("/trust/rings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rings["ring_count"], 1, "expected one clique: {rings}");
    let ring = &rings["rings"][0];
    assert_eq!(ring["ring_type"], "clique");
    let mut members: Vec<String> = ring["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect();
    members.sort();
    let mut expected: Vec<String> = actors.iter().map(|a| a.pubkey.clone()).collect();
    expected.sort();
    assert_eq!(members, expected);

    // Every attestation in the clique carries the 0.3 discount.
    for actor in &actors {
        let (_, analysis) = app
            .get(&format!("/trust/analysis/{}", actor.pubkey))
            .await;
        let weights = analysis["attestation_weights"].as_array().unwrap();
        assert_eq!(weights.len(), 2);
        for weight in weights {
            assert_eq!(weight["ring_discount"].as_f64().unwrap(), 0.3);
            assert!(weight["flags"]
                .as_array()
                .unwrap()
                .contains(&json!("ring_member")));
        }
    }

    let (_, health) = app.get("/trust/network-health").await;
    assert_eq!(health["clique_count"], 1);
    assert_eq!(health["agents_in_rings"], 3);
}

// ============================================================================
// E6: Ownership then integrity gate
// ============================================================================

#[tokio::test]
async fn test_ownership_link_and_integrity_gate() {
    let app = TestApp::new();
    let agent = Actor::new("Worker");
    let human = Actor::new("Hana");
    app.register(&agent, "agent").await;
    app.register(&human, "human").await;

    // Agent claims, human confirms.
    let claim_id = "own-e2e-0001";
    let claim_payload = json!({
        "action": "ownership_claim",
        "claim_id": claim_id,
        "agent_pubkey": agent.pubkey,
        "human_pubkey": human.pubkey,
    });
    let (status, body) = app
        .post(
            "/ownership/claim",
            &json!({
                "claim_id": claim_id,
                "agent_pubkey": agent.pubkey,
                "human_pubkey": human.pubkey,
                "signature": agent.sign_payload(&claim_payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "claim failed: {body}");
    assert_eq!(body["status"], "pending");

    let confirm_payload = json!({
        "action": "ownership_confirm",
        "claim_id": claim_id,
        "agent_pubkey": agent.pubkey,
        "human_pubkey": human.pubkey,
    });
    let (status, body) = app
        .post(
            "/ownership/confirm",
            &json!({
                "claim_id": claim_id,
                "human_pubkey": human.pubkey,
                "signature": human.sign_payload(&confirm_payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "confirm failed: {body}");
    assert_eq!(body["status"], "active");

    let (_, profile) = app.get(&format!("/agents/{}/profile", agent.pubkey)).await;
    assert_eq!(profile["accountability"]["tier"], "human-linked");
    assert_eq!(profile["accountability"]["multiplier"], 1.0);
    assert_eq!(
        profile["accountability"]["owner"]["pubkey"],
        human.pubkey.as_str()
    );

    // Owner sets a two-file baseline.
    let files = manifest(&[("bin/agent", 1), ("config.toml", 2)]);
    let baseline_id = "bl-e2e-0001";
    let baseline_payload = json!({
        "action": "integrity_set_baseline",
        "baseline_id": baseline_id,
        "agent_pubkey": agent.pubkey,
        "owner_pubkey": human.pubkey,
        "file_hashes": files,
    });
    let (status, body) = app
        .post(
            "/integrity/baseline/set",
            &json!({
                "baseline_id": baseline_id,
                "agent_pubkey": agent.pubkey,
                "owner_pubkey": human.pubkey,
                "file_hashes": files,
                "signature": human.sign_payload(&baseline_payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "baseline failed: {body}");
    assert_eq!(body["status"], "baseline_set");
    assert_eq!(body["traffic_light"], "yellow");

    // Matching check: green, safe to run.
    let check_payload = json!({
        "action": "integrity_check",
        "agent_pubkey": agent.pubkey,
        "file_hashes": files,
    });
    let (status, body) = app
        .post(
            "/integrity/check",
            &json!({
                "agent_pubkey": agent.pubkey,
                "file_hashes": files,
                "signature": agent.sign_payload(&check_payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "check failed: {body}");
    assert_eq!(body["traffic_light"], "green");
    assert_eq!(body["recommended_action"], "safe_to_run");
    assert_eq!(body["requires_owner_reapproval"], false);

    let (_, status_body) = app
        .get(&format!("/integrity/status/{}", agent.pubkey))
        .await;
    assert_eq!(status_body["traffic_light"], "green");

    // One hash differs: red, block run.
    let tampered = manifest(&[("bin/agent", 9), ("config.toml", 2)]);
    let check_payload = json!({
        "action": "integrity_check",
        "agent_pubkey": agent.pubkey,
        "file_hashes": tampered,
    });
    let (status, body) = app
        .post(
            "/integrity/check",
            &json!({
                "agent_pubkey": agent.pubkey,
                "file_hashes": tampered,
                "signature": agent.sign_payload(&check_payload),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["traffic_light"], "red");
    assert_eq!(body["recommended_action"], "block_run");
    assert_eq!(body["diff"]["changed"], json!(["bin/agent"]));

    // The profile now gates deployability to zero.
    let (_, profile) = app.get(&format!("/agents/{}/profile", agent.pubkey)).await;
    assert_eq!(profile["integrity"]["traffic_light"], "red");
    assert_eq!(profile["deployability_score"], 0.0);
}
