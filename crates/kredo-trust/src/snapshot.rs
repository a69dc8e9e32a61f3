//! Read snapshot of the attestation graph.
//!
//! The trust engine is a pure computation over an immutable snapshot of
//! non-revoked attestations; it never touches storage. Expired
//! attestations are dropped at snapshot construction so every downstream
//! computation sees the same input set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use kredo_protocol::{AttestationType, Evidence, Skill};

/// One attestation as the trust engine sees it.
#[derive(Clone, Debug)]
pub struct TrustAttestation {
    /// Document id.
    pub id: String,
    /// What kind of claim it makes.
    pub attestation_type: AttestationType,
    /// Signing pubkey.
    pub attestor_pubkey: String,
    /// Subject pubkey.
    pub subject_pubkey: String,
    /// Skill claim, absent for warnings.
    pub skill: Option<Skill>,
    /// Supporting evidence.
    pub evidence: Evidence,
    /// Issue time.
    pub issued: DateTime<Utc>,
    /// Expiry time.
    pub expires: DateTime<Utc>,
}

/// An immutable view of all live attestations at one instant.
#[derive(Clone, Debug)]
pub struct TrustSnapshot {
    attestations: Vec<TrustAttestation>,
    by_subject: HashMap<String, Vec<usize>>,
    now: DateTime<Utc>,
}

impl TrustSnapshot {
    /// Build a snapshot from non-revoked attestations, dropping any that
    /// have expired as of `now`.
    #[must_use]
    pub fn new(attestations: Vec<TrustAttestation>, now: DateTime<Utc>) -> Self {
        let attestations: Vec<TrustAttestation> = attestations
            .into_iter()
            .filter(|a| a.expires > now)
            .collect();
        let mut by_subject: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, att) in attestations.iter().enumerate() {
            by_subject
                .entry(att.subject_pubkey.clone())
                .or_default()
                .push(idx);
        }
        Self {
            attestations,
            by_subject,
            now,
        }
    }

    /// The evaluation instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// All live attestations.
    #[must_use]
    pub fn all(&self) -> &[TrustAttestation] {
        &self.attestations
    }

    /// Live attestations whose subject is `pubkey`.
    pub fn for_subject<'a>(
        &'a self,
        pubkey: &str,
    ) -> impl Iterator<Item = &'a TrustAttestation> + 'a {
        self.by_subject
            .get(pubkey)
            .into_iter()
            .flatten()
            .map(|&idx| &self.attestations[idx])
    }

    /// Distinct directed `(attestor, subject)` edges.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut seen = std::collections::HashSet::new();
        let mut edges = Vec::new();
        for att in &self.attestations {
            let edge = (att.attestor_pubkey.clone(), att.subject_pubkey.clone());
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        kredo_protocol::time::parse("2026-06-01T00:00:00Z").unwrap()
    }

    fn att(id: &str, attestor: &str, subject: &str, expires_in_days: i64) -> TrustAttestation {
        TrustAttestation {
            id: id.into(),
            attestation_type: AttestationType::SkillAttestation,
            attestor_pubkey: attestor.into(),
            subject_pubkey: subject.into(),
            skill: None,
            evidence: Evidence {
                context: "ctx".into(),
                artifacts: vec![],
                outcome: String::new(),
                interaction_date: None,
            },
            issued: now() - Duration::days(1),
            expires: now() + Duration::days(expires_in_days),
        }
    }

    #[test]
    fn test_expired_dropped_at_construction() {
        let snapshot = TrustSnapshot::new(
            vec![att("a", "k1", "k2", 30), att("b", "k1", "k3", -1)],
            now(),
        );
        assert_eq!(snapshot.all().len(), 1);
        assert_eq!(snapshot.for_subject("k3").count(), 0);
    }

    #[test]
    fn test_subject_index() {
        let snapshot = TrustSnapshot::new(
            vec![
                att("a", "k1", "k2", 30),
                att("b", "k3", "k2", 30),
                att("c", "k1", "k3", 30),
            ],
            now(),
        );
        assert_eq!(snapshot.for_subject("k2").count(), 2);
        assert_eq!(snapshot.for_subject("k3").count(), 1);
    }

    #[test]
    fn test_edges_deduplicated() {
        let snapshot = TrustSnapshot::new(
            vec![att("a", "k1", "k2", 30), att("b", "k1", "k2", 30)],
            now(),
        );
        assert_eq!(snapshot.edges().len(), 1);
    }
}
