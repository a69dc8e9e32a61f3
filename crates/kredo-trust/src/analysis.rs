//! Per-subject trust analysis and network-wide statistics.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::reputation::{attestation_weight, attestor_reputation, AttestationWeight};
use crate::rings::{detect_rings, RingInfo, RingType};
use crate::snapshot::TrustSnapshot;

/// Aggregated view of one `(domain, specific)` skill cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightedSkill {
    /// Taxonomy domain.
    pub domain: String,
    /// Specific skill.
    pub specific: String,
    /// Highest claimed proficiency.
    pub max_proficiency: u8,
    /// Unweighted mean proficiency.
    pub avg_proficiency: f64,
    /// Proficiency weighted by effective attestation weight.
    pub weighted_avg_proficiency: f64,
    /// How many live attestations claim this skill.
    pub attestation_count: u64,
}

/// Full trust analysis for one subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubjectAnalysis {
    /// The analyzed pubkey.
    pub pubkey: String,
    /// Depth-3 recursive reputation, in [0, 1].
    pub reputation_score: f64,
    /// Weight breakdown per live attestation about this subject.
    pub attestation_weights: Vec<AttestationWeight>,
    /// Rings this subject participates in.
    pub rings_involved: Vec<RingInfo>,
    /// Skill clusters with weighted averages.
    pub weighted_skills: Vec<WeightedSkill>,
    /// When the analysis ran.
    pub analysis_timestamp: String,
}

/// Network-wide graph statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkHealth {
    /// Distinct pubkeys appearing in the graph.
    pub total_agents_in_graph: u64,
    /// Distinct directed edges.
    pub total_directed_edges: u64,
    /// Detected mutual pairs.
    pub mutual_pair_count: u64,
    /// Detected cliques of three or more.
    pub clique_count: u64,
    /// Pubkeys inside at least one ring.
    pub agents_in_rings: u64,
    /// `agents_in_rings / total_agents_in_graph`.
    pub ring_participation_rate: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Run the full analysis for one subject over a snapshot.
#[must_use]
pub fn analyze_subject(snapshot: &TrustSnapshot, pubkey: &str) -> SubjectAnalysis {
    let rings = detect_rings(snapshot);

    let reputation_score = attestor_reputation(snapshot, pubkey, &rings);

    let attestation_weights: Vec<AttestationWeight> = snapshot
        .for_subject(pubkey)
        .map(|att| attestation_weight(snapshot, att, &rings))
        .collect();

    let rings_involved: Vec<RingInfo> = rings
        .iter()
        .filter(|r| r.members.iter().any(|m| m == pubkey))
        .cloned()
        .collect();

    let weighted_skills = aggregate_weighted_skills(snapshot, pubkey, &attestation_weights);

    SubjectAnalysis {
        pubkey: pubkey.to_string(),
        reputation_score: round4(reputation_score),
        attestation_weights,
        rings_involved,
        weighted_skills,
        analysis_timestamp: kredo_protocol::time::format(snapshot.now()),
    }
}

fn aggregate_weighted_skills(
    snapshot: &TrustSnapshot,
    pubkey: &str,
    weights: &[AttestationWeight],
) -> Vec<WeightedSkill> {
    struct Cluster {
        domain: String,
        specific: String,
        proficiencies: Vec<u8>,
        weights: Vec<f64>,
    }

    let weight_by_id: BTreeMap<&str, f64> = weights
        .iter()
        .map(|w| (w.attestation_id.as_str(), w.effective_weight))
        .collect();

    let mut clusters: BTreeMap<String, Cluster> = BTreeMap::new();
    for att in snapshot.for_subject(pubkey) {
        let Some(skill) = &att.skill else { continue };
        let key = format!("{}:{}", skill.domain, skill.specific);
        let cluster = clusters.entry(key).or_insert_with(|| Cluster {
            domain: skill.domain.clone(),
            specific: skill.specific.clone(),
            proficiencies: Vec::new(),
            weights: Vec::new(),
        });
        cluster.proficiencies.push(skill.proficiency);
        cluster
            .weights
            .push(weight_by_id.get(att.id.as_str()).copied().unwrap_or(0.0));
    }

    let mut results: Vec<WeightedSkill> = clusters
        .into_values()
        .map(|cluster| {
            let count = cluster.proficiencies.len();
            let avg = cluster.proficiencies.iter().map(|&p| f64::from(p)).sum::<f64>()
                / count as f64;
            let total_weight: f64 = cluster.weights.iter().sum();
            let weighted_avg = if total_weight > 0.0 {
                cluster
                    .proficiencies
                    .iter()
                    .zip(&cluster.weights)
                    .map(|(&p, &w)| f64::from(p) * w)
                    .sum::<f64>()
                    / total_weight
            } else {
                avg
            };
            WeightedSkill {
                domain: cluster.domain,
                specific: cluster.specific,
                max_proficiency: cluster.proficiencies.iter().copied().max().unwrap_or(0),
                avg_proficiency: round2(avg),
                weighted_avg_proficiency: round2(weighted_avg),
                attestation_count: count as u64,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.max_proficiency
            .cmp(&a.max_proficiency)
            .then(b.attestation_count.cmp(&a.attestation_count))
            .then(a.domain.cmp(&b.domain))
            .then(a.specific.cmp(&b.specific))
    });
    results
}

/// Compute network-wide statistics over a snapshot.
#[must_use]
pub fn network_health(snapshot: &TrustSnapshot) -> NetworkHealth {
    let rings = detect_rings(snapshot);
    let edges = snapshot.edges();

    let mut agents: HashSet<&str> = HashSet::new();
    for (a, b) in &edges {
        agents.insert(a);
        agents.insert(b);
    }

    let mutual_pair_count = rings
        .iter()
        .filter(|r| r.ring_type == RingType::MutualPair)
        .count() as u64;
    let clique_count = rings
        .iter()
        .filter(|r| r.ring_type == RingType::Clique)
        .count() as u64;

    let ring_agents: HashSet<&str> = rings
        .iter()
        .flat_map(|r| r.members.iter().map(String::as_str))
        .collect();

    let total_agents = agents.len() as u64;
    let participation = if total_agents > 0 {
        round4(ring_agents.len() as f64 / total_agents as f64)
    } else {
        0.0
    };

    NetworkHealth {
        total_agents_in_graph: total_agents,
        total_directed_edges: edges.len() as u64,
        mutual_pair_count,
        clique_count,
        agents_in_rings: ring_agents.len() as u64,
        ring_participation_rate: participation,
    }
}
