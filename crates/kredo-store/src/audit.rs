//! Append-only audit log and source-anomaly signals.
//!
//! Every write request produces exactly one audit row, success or failure.
//! Accepted writes get their audit row inside the same transaction as the
//! state change; rejected requests are recorded standalone (there is no
//! state change to couple to). Source IPs are stored alongside a truncated
//! SHA-256 so clustering can run without exposing raw addresses.

use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::store::{now_str, AuditContext, KredoStore};

/// Truncated-hash length for source IPs (24 hex chars = 96 bits).
const IP_HASH_LEN: usize = 24;

/// One audit row.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    /// Row id.
    pub id: i64,
    /// When the event was recorded.
    pub timestamp: String,
    /// Action name, e.g. `attestation.submit`.
    pub action: String,
    /// Acting pubkey, when known.
    pub actor_pubkey: Option<String>,
    /// Truncated SHA-256 of the source IP.
    pub source_ip_hash: Option<String>,
    /// User-Agent header.
    pub user_agent: Option<String>,
    /// `accepted`, `rejected`, or `existing`.
    pub outcome: String,
    /// Structured request context.
    pub details: Option<serde_json::Value>,
}

/// Filters for audit queries.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    /// Restrict to one action name.
    pub action: Option<String>,
    /// Restrict to one actor pubkey.
    pub actor_pubkey: Option<String>,
    /// Restrict to one outcome.
    pub outcome: Option<String>,
    /// Maximum rows (clamped to 500).
    pub limit: u32,
}

/// A source cluster flagged by the anomaly query.
#[derive(Clone, Debug, Serialize)]
pub struct SourceAnomaly {
    /// Truncated source IP hash identifying the cluster.
    pub source_ip_hash: String,
    /// Total write events from this source in the window.
    pub event_count: u64,
    /// Distinct acting pubkeys from this source.
    pub unique_actor_count: u64,
    /// Distinct action names from this source.
    pub action_type_count: u64,
    /// Registrations from this source.
    pub registration_count: u64,
    /// Attestation submissions from this source.
    pub attestation_count: u64,
    /// Most recent event timestamp.
    pub last_seen: String,
}

/// Hash an IP for storage: truncated lowercase SHA-256 hex.
#[must_use]
pub fn hash_ip(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    hex::encode(digest)[..IP_HASH_LEN].to_string()
}

/// Insert one audit row using the given connection (works inside a
/// transaction via deref).
pub(crate) fn insert_audit_row(
    conn: &Connection,
    ctx: &AuditContext,
    outcome: &str,
) -> Result<()> {
    let ip_hash = ctx.source_ip.as_deref().map(hash_ip);
    conn.execute(
        "INSERT INTO audit_events
         (timestamp, action, actor_pubkey, source_ip, source_ip_hash, user_agent, outcome, details_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            now_str(),
            ctx.action,
            ctx.actor_pubkey,
            ctx.source_ip,
            ip_hash,
            ctx.user_agent,
            outcome,
            ctx.details.as_ref().map(std::string::ToString::to_string),
        ],
    )?;
    Ok(())
}

impl KredoStore {
    /// Record an audit row outside any write transaction (rejected
    /// requests, rate-limit denials).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn append_audit(&self, ctx: &AuditContext, outcome: &str) -> Result<()> {
        self.read(|conn| insert_audit_row(conn, ctx, outcome))
    }

    /// List audit rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        self.read(|conn| {
            let mut conditions = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(action) = &filter.action {
                conditions.push("action = ?");
                params_vec.push(Box::new(action.clone()));
            }
            if let Some(actor) = &filter.actor_pubkey {
                conditions.push("actor_pubkey = ?");
                params_vec.push(Box::new(actor.clone()));
            }
            if let Some(outcome) = &filter.outcome {
                conditions.push("outcome = ?");
                params_vec.push(Box::new(outcome.clone()));
            }
            let where_clause = if conditions.is_empty() {
                String::from("1=1")
            } else {
                conditions.join(" AND ")
            };
            let limit = if filter.limit == 0 { 100 } else { filter.limit.min(500) };
            params_vec.push(Box::new(limit));

            let sql = format!(
                "SELECT id, timestamp, action, actor_pubkey, source_ip_hash, user_agent, outcome, details_json
                 FROM audit_events WHERE {where_clause}
                 ORDER BY id DESC LIMIT ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                |row| {
                    let details: Option<String> = row.get(7)?;
                    Ok(AuditEvent {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        action: row.get(2)?,
                        actor_pubkey: row.get(3)?,
                        source_ip_hash: row.get(4)?,
                        user_agent: row.get(5)?,
                        outcome: row.get(6)?,
                        details: details.and_then(|d| serde_json::from_str(&d).ok()),
                    })
                },
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Cluster recent write events by hashed source IP and flag unusual
    /// concentration. This is a risk signal only, never sole enforcement
    /// proof.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn source_anomalies(
        &self,
        hours: u32,
        min_events: u32,
        min_unique_actors: u32,
        limit: u32,
    ) -> Result<Vec<SourceAnomaly>> {
        let hours = hours.clamp(1, 24 * 30);
        let min_events = min_events.max(1);
        let min_unique_actors = min_unique_actors.max(1);
        let limit = limit.clamp(1, 500);

        let cutoff = kredo_protocol::time::format(
            kredo_protocol::time::now() - chrono::Duration::hours(i64::from(hours)),
        );

        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_ip_hash,
                        COUNT(*) AS event_count,
                        COUNT(DISTINCT COALESCE(actor_pubkey, '')) AS unique_actor_count,
                        COUNT(DISTINCT action) AS action_type_count,
                        SUM(CASE WHEN action = 'registration.create' THEN 1 ELSE 0 END) AS registration_count,
                        SUM(CASE WHEN action = 'attestation.submit' THEN 1 ELSE 0 END) AS attestation_count,
                        MAX(timestamp) AS last_seen
                 FROM audit_events
                 WHERE timestamp >= ?1 AND source_ip_hash IS NOT NULL
                 GROUP BY source_ip_hash
                 HAVING COUNT(*) >= ?2
                    AND COUNT(DISTINCT COALESCE(actor_pubkey, '')) >= ?3
                 ORDER BY event_count DESC, unique_actor_count DESC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![cutoff, min_events, min_unique_actors, limit],
                |row| {
                    Ok(SourceAnomaly {
                        source_ip_hash: row.get(0)?,
                        event_count: row.get::<_, i64>(1)? as u64,
                        unique_actor_count: row.get::<_, i64>(2)? as u64,
                        action_type_count: row.get::<_, i64>(3)? as u64,
                        registration_count: row.get::<_, i64>(4)? as u64,
                        attestation_count: row.get::<_, i64>(5)? as u64,
                        last_seen: row.get(6)?,
                    })
                },
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_from(ip: &str, actor: &str, action: &str) -> AuditContext {
        AuditContext::new(action)
            .actor(actor)
            .source(Some(ip.to_string()), Some("test-agent/1.0".into()))
    }

    #[test]
    fn test_hash_ip_is_stable_and_truncated() {
        let a = hash_ip("203.0.113.7");
        let b = hash_ip("203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(a.len(), IP_HASH_LEN);
        assert_ne!(a, hash_ip("203.0.113.8"));
    }

    #[test]
    fn test_append_and_list() {
        let store = KredoStore::open_in_memory().unwrap();
        store
            .append_audit(&ctx_from("10.0.0.1", "ed25519:aa", "attestation.submit"), "rejected")
            .unwrap();
        store
            .append_audit(&ctx_from("10.0.0.1", "ed25519:bb", "registration.create"), "accepted")
            .unwrap();

        let all = store.list_audit(&AuditFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].action, "registration.create");

        let rejected = store
            .list_audit(&AuditFilter {
                outcome: Some("rejected".into()),
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].actor_pubkey.as_deref(), Some("ed25519:aa"));
    }

    #[test]
    fn test_source_anomalies_flags_concentration() {
        let store = KredoStore::open_in_memory().unwrap();
        // Eight registrations from one IP under four different actors.
        for i in 0..8 {
            let actor = format!("ed25519:{:02x}", i % 4);
            store
                .append_audit(&ctx_from("198.51.100.9", &actor, "registration.create"), "accepted")
                .unwrap();
        }
        // Quiet source below thresholds.
        store
            .append_audit(&ctx_from("198.51.100.10", "ed25519:ff", "registration.create"), "accepted")
            .unwrap();

        let anomalies = store.source_anomalies(24, 8, 4, 100).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].event_count, 8);
        assert_eq!(anomalies[0].unique_actor_count, 4);
        assert_eq!(anomalies[0].registration_count, 8);
        assert_eq!(anomalies[0].source_ip_hash, hash_ip("198.51.100.9"));
    }

    #[test]
    fn test_anomaly_window_excludes_old_events() {
        let store = KredoStore::open_in_memory().unwrap();
        // Insert an old event directly.
        store
            .read(|conn| {
                conn.execute(
                    "INSERT INTO audit_events
                     (timestamp, action, actor_pubkey, source_ip, source_ip_hash, user_agent, outcome)
                     VALUES ('2020-01-01T00:00:00Z', 'registration.create', 'ed25519:aa',
                             '10.1.1.1', ?1, 'ua', 'accepted')",
                    params![hash_ip("10.1.1.1")],
                )?;
                Ok(())
            })
            .unwrap();
        let anomalies = store.source_anomalies(24, 1, 1, 100).unwrap();
        assert!(anomalies.is_empty());
    }
}
