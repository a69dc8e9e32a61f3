//! Ring detection on the attestation graph.
//!
//! Two patterns are flagged: *mutual pairs* (A attests B and B attests A)
//! and *cliques* of three or more keys that all mutually attest, found
//! with Bron–Kerbosch on the undirected mutual-edge graph. Rings are
//! flagged and discounted, never blocked; the raw attestations stay
//! visible for auditability.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::snapshot::TrustSnapshot;

/// Discount for attestations inside a mutual pair.
pub const MUTUAL_PAIR_DISCOUNT: f64 = 0.5;

/// Discount for attestations inside a clique of three or more.
pub const CLIQUE_DISCOUNT: f64 = 0.3;

/// Minimum clique size worth reporting.
pub const MIN_CLIQUE_SIZE: usize = 3;

/// Safety valve: skip clique enumeration on absurdly dense graphs.
pub const MAX_EDGES_FOR_CLIQUE_DETECTION: usize = 10_000;

/// What kind of ring a flag describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingType {
    /// Exactly two keys attesting each other.
    MutualPair,
    /// Three or more keys all mutually attesting.
    Clique,
}

/// A detected ring.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingInfo {
    /// Member pubkeys, sorted.
    pub members: Vec<String>,
    /// Member count.
    pub size: usize,
    /// Pair or clique.
    pub ring_type: RingType,
    /// The attestation ids forming the ring's edges.
    pub attestation_ids: Vec<String>,
}

impl RingInfo {
    /// Whether both keys are members of this ring.
    #[must_use]
    pub fn covers(&self, a: &str, b: &str) -> bool {
        self.members.iter().any(|m| m == a) && self.members.iter().any(|m| m == b)
    }
}

fn attestation_ids_between(snapshot: &TrustSnapshot, members: &[String]) -> Vec<String> {
    let member_set: HashSet<&str> = members.iter().map(String::as_str).collect();
    let mut ids: Vec<String> = snapshot
        .all()
        .iter()
        .filter(|att| {
            member_set.contains(att.attestor_pubkey.as_str())
                && member_set.contains(att.subject_pubkey.as_str())
        })
        .map(|att| att.id.clone())
        .collect();
    ids.sort_unstable();
    ids
}

/// Detect all mutual pairs in the snapshot.
#[must_use]
pub fn detect_mutual_pairs(snapshot: &TrustSnapshot) -> Vec<RingInfo> {
    let edges = snapshot.edges();
    let edge_set: HashSet<(&str, &str)> = edges
        .iter()
        .map(|(a, b)| (a.as_str(), b.as_str()))
        .collect();

    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    for (a, b) in &edges {
        if a == b {
            continue;
        }
        if edge_set.contains(&(b.as_str(), a.as_str())) {
            let key = if a < b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            seen.insert(key);
        }
    }

    seen.into_iter()
        .map(|(a, b)| {
            let members = vec![a, b];
            let attestation_ids = attestation_ids_between(snapshot, &members);
            RingInfo {
                size: members.len(),
                members,
                ring_type: RingType::MutualPair,
                attestation_ids,
            }
        })
        .collect()
}

/// Detect maximal cliques of size >= [`MIN_CLIQUE_SIZE`] in the mutual
/// attestation graph.
#[must_use]
pub fn detect_cliques(snapshot: &TrustSnapshot) -> Vec<RingInfo> {
    let edges = snapshot.edges();
    if edges.len() > MAX_EDGES_FOR_CLIQUE_DETECTION {
        tracing::warn!(
            edge_count = edges.len(),
            "skipping clique detection on oversized graph"
        );
        return Vec::new();
    }

    let edge_set: HashSet<(&str, &str)> = edges
        .iter()
        .map(|(a, b)| (a.as_str(), b.as_str()))
        .collect();

    // Undirected graph of mutual edges only.
    let mut graph: HashMap<String, HashSet<String>> = HashMap::new();
    for (a, b) in &edges {
        if a != b && edge_set.contains(&(b.as_str(), a.as_str())) {
            graph.entry(a.clone()).or_default().insert(b.clone());
            graph.entry(b.clone()).or_default().insert(a.clone());
        }
    }
    if graph.is_empty() {
        return Vec::new();
    }

    let mut cliques: Vec<BTreeSet<String>> = Vec::new();
    bron_kerbosch(
        BTreeSet::new(),
        graph.keys().cloned().collect(),
        BTreeSet::new(),
        &graph,
        &mut cliques,
    );

    let mut results: Vec<RingInfo> = cliques
        .into_iter()
        .filter(|clique| clique.len() >= MIN_CLIQUE_SIZE)
        .map(|clique| {
            let members: Vec<String> = clique.into_iter().collect();
            let attestation_ids = attestation_ids_between(snapshot, &members);
            RingInfo {
                size: members.len(),
                members,
                ring_type: RingType::Clique,
                attestation_ids,
            }
        })
        .collect();
    results.sort_by(|a, b| a.members.cmp(&b.members));
    results
}

/// Bron–Kerbosch maximal clique enumeration (no pivoting; the mutual
/// graph stays small by construction).
fn bron_kerbosch(
    r: BTreeSet<String>,
    mut p: BTreeSet<String>,
    mut x: BTreeSet<String>,
    graph: &HashMap<String, HashSet<String>>,
    cliques: &mut Vec<BTreeSet<String>>,
) {
    if p.is_empty() && x.is_empty() {
        if r.len() >= 2 {
            cliques.push(r);
        }
        return;
    }
    while let Some(v) = p.iter().next().cloned() {
        let neighbors = graph.get(&v).cloned().unwrap_or_default();
        let mut next_r = r.clone();
        next_r.insert(v.clone());
        let next_p = p
            .iter()
            .filter(|n| neighbors.contains(*n))
            .cloned()
            .collect();
        let next_x = x
            .iter()
            .filter(|n| neighbors.contains(*n))
            .cloned()
            .collect();
        bron_kerbosch(next_r, next_p, next_x, graph, cliques);
        p.remove(&v);
        x.insert(v);
    }
}

/// Combined ring detection: pairs plus cliques. Pairs wholly inside a
/// clique are subsumed by it and not reported separately.
#[must_use]
pub fn detect_rings(snapshot: &TrustSnapshot) -> Vec<RingInfo> {
    let cliques = detect_cliques(snapshot);
    let mut rings: Vec<RingInfo> = detect_mutual_pairs(snapshot)
        .into_iter()
        .filter(|pair| {
            !cliques
                .iter()
                .any(|c| c.covers(&pair.members[0], &pair.members[1]))
        })
        .collect();
    rings.extend(cliques);
    rings
}

/// Discount for one attestation edge given the detected rings.
///
/// Cliques take precedence over pairs (overlapping flags take the
/// smaller value); 1.0 when no ring covers the edge.
#[must_use]
pub fn ring_discount(subject: &str, attestor: &str, rings: &[RingInfo]) -> f64 {
    if rings
        .iter()
        .any(|r| r.ring_type == RingType::Clique && r.covers(subject, attestor))
    {
        return CLIQUE_DISCOUNT;
    }
    if rings
        .iter()
        .any(|r| r.ring_type == RingType::MutualPair && r.covers(subject, attestor))
    {
        return MUTUAL_PAIR_DISCOUNT;
    }
    1.0
}
