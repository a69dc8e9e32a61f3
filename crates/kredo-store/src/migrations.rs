//! Versioned schema migrations.
//!
//! Migrations are monotonic: a `schema_migrations` table records
//! `(version, applied_at)`, and applying version N requires version N-1 to
//! be present. Each migration runs inside its own transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// One schema migration step.
struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: "
CREATE TABLE known_keys (
    pubkey TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL DEFAULT 'agent',
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE TABLE attestations (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    attestor_pubkey TEXT NOT NULL,
    subject_pubkey TEXT NOT NULL,
    domain TEXT,
    specific_skill TEXT,
    proficiency INTEGER,
    warning_category TEXT,
    evidence_context TEXT,
    evidence_artifacts TEXT,
    evidence_outcome TEXT,
    evidence_interaction_date TEXT,
    issued TEXT NOT NULL,
    expires TEXT NOT NULL,
    signature TEXT NOT NULL,
    raw_json TEXT NOT NULL,
    evidence_specificity REAL NOT NULL,
    evidence_verifiability REAL NOT NULL,
    evidence_relevance REAL NOT NULL,
    evidence_recency REAL NOT NULL,
    evidence_composite REAL NOT NULL,
    is_revoked INTEGER NOT NULL DEFAULT 0,
    revoked_at TEXT,
    revoker_pubkey TEXT,
    stored_at TEXT NOT NULL
);

CREATE INDEX idx_attestations_subject ON attestations(subject_pubkey);
CREATE INDEX idx_attestations_attestor ON attestations(attestor_pubkey);
CREATE INDEX idx_attestations_domain ON attestations(domain);
CREATE INDEX idx_attestations_type ON attestations(type);
CREATE INDEX idx_attestations_issued ON attestations(issued);

CREATE TABLE revocations (
    id TEXT PRIMARY KEY,
    attestation_id TEXT NOT NULL,
    revoker_pubkey TEXT NOT NULL,
    reason TEXT NOT NULL,
    issued TEXT NOT NULL,
    signature TEXT NOT NULL,
    raw_json TEXT NOT NULL,
    FOREIGN KEY (attestation_id) REFERENCES attestations(id)
);

CREATE INDEX idx_revocations_attestation ON revocations(attestation_id);

CREATE TABLE disputes (
    id TEXT PRIMARY KEY,
    warning_id TEXT NOT NULL,
    disputor_pubkey TEXT NOT NULL,
    response TEXT NOT NULL,
    evidence_json TEXT,
    issued TEXT NOT NULL,
    signature TEXT NOT NULL,
    raw_json TEXT NOT NULL,
    FOREIGN KEY (warning_id) REFERENCES attestations(id)
);

CREATE INDEX idx_disputes_warning ON disputes(warning_id);
",
    },
    Migration {
        version: 2,
        sql: "
CREATE TABLE ownership_links (
    id TEXT PRIMARY KEY,
    agent_pubkey TEXT NOT NULL,
    human_pubkey TEXT NOT NULL,
    status TEXT NOT NULL,
    agent_signature TEXT NOT NULL,
    human_signature TEXT,
    claim_payload_json TEXT NOT NULL,
    confirm_payload_json TEXT,
    claimed_at TEXT NOT NULL,
    confirmed_at TEXT,
    revoked_at TEXT,
    revoked_by TEXT,
    revoke_reason TEXT
);

CREATE INDEX idx_ownership_agent_status ON ownership_links(agent_pubkey, status);
CREATE INDEX idx_ownership_human_status ON ownership_links(human_pubkey, status);

CREATE TABLE audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    action TEXT NOT NULL,
    actor_pubkey TEXT,
    source_ip TEXT,
    source_ip_hash TEXT,
    user_agent TEXT,
    outcome TEXT NOT NULL,
    details_json TEXT
);

CREATE INDEX idx_audit_events_timestamp ON audit_events(timestamp);
CREATE INDEX idx_audit_events_action ON audit_events(action);
CREATE INDEX idx_audit_events_ip_hash ON audit_events(source_ip_hash);
CREATE INDEX idx_audit_events_actor ON audit_events(actor_pubkey);
",
    },
    Migration {
        version: 3,
        sql: "
CREATE TABLE integrity_baselines (
    id TEXT PRIMARY KEY,
    agent_pubkey TEXT NOT NULL,
    owner_pubkey TEXT NOT NULL,
    manifest_json TEXT NOT NULL,
    signature TEXT NOT NULL,
    status TEXT NOT NULL,
    set_at TEXT NOT NULL
);

CREATE INDEX idx_integrity_baselines_agent_status
    ON integrity_baselines(agent_pubkey, status);

CREATE TABLE integrity_checks (
    id TEXT PRIMARY KEY,
    agent_pubkey TEXT NOT NULL,
    baseline_id TEXT,
    status TEXT NOT NULL,
    diff_json TEXT NOT NULL,
    manifest_json TEXT NOT NULL,
    signature TEXT NOT NULL,
    checked_at TEXT NOT NULL
);

CREATE INDEX idx_integrity_checks_agent ON integrity_checks(agent_pubkey, checked_at);
",
    },
    Migration {
        version: 4,
        sql: "
CREATE TABLE custom_domains (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE custom_skills (
    id TEXT NOT NULL,
    domain_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (domain_id, id)
);
",
    },
    Migration {
        version: 5,
        sql: "
CREATE TABLE document_pins (
    cid TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    document_type TEXT NOT NULL,
    provider TEXT NOT NULL,
    pinned_at TEXT NOT NULL
);

CREATE INDEX idx_document_pins_document ON document_pins(document_id);
",
    },
];

/// Apply all pending migrations to a freshly opened connection.
pub(crate) fn run(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        if migration.version != latest_applied(conn)? + 1 {
            return Err(StoreError::InvalidInput(format!(
                "migration {} requires {} to be applied first",
                migration.version,
                migration.version - 1
            )));
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![
                migration.version,
                kredo_protocol::time::format(kredo_protocol::time::now())
            ],
        )?;
        tx.commit()?;
        tracing::debug!(version = migration.version, "applied schema migration");
    }

    Ok(())
}

fn latest_applied(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_cleanly() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();

        let version: i64 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn test_migrations_are_idempotent_across_reopens() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_versions_are_contiguous_from_one() {
        for (i, m) in MIGRATIONS.iter().enumerate() {
            assert_eq!(m.version, i as i64 + 1);
        }
    }
}
