//! Integrity baselines and runtime checks.
//!
//! A baseline is the owner-approved manifest of `{path, sha256}` pairs for
//! an agent; at most one is `active` per agent, and setting a new one
//! supersedes the previous. Checks are agent-signed measurements diffed
//! against the active baseline; the diff and resulting status are stored
//! with the check.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::audit;
use crate::error::{Result, StoreError};
use crate::store::{now_str, AuditContext, CommitEvent, KredoStore};

/// One `{path, sha256}` manifest entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    /// File path, unique within a manifest.
    pub path: String,
    /// SHA-256 of the file contents, 64 lowercase hex characters.
    pub sha256: String,
}

/// Diff of a measured manifest against the active baseline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityDiff {
    /// Paths present in the measurement but not the baseline.
    pub added: Vec<String>,
    /// Paths present in the baseline but missing from the measurement.
    pub removed: Vec<String>,
    /// Paths whose hash differs from the baseline.
    pub changed: Vec<String>,
}

impl IntegrityDiff {
    /// Whether the measurement matches the baseline exactly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// A stored baseline row.
#[derive(Clone, Debug, Serialize)]
pub struct IntegrityBaseline {
    /// Baseline id.
    pub baseline_id: String,
    /// The agent this baseline measures.
    pub agent_pubkey: String,
    /// The owner who approved it.
    pub owner_pubkey: String,
    /// Sorted manifest entries.
    pub file_hashes: Vec<FileHash>,
    /// `active` or `superseded`.
    pub status: String,
    /// When the baseline was set.
    pub set_at: String,
}

/// A stored check row.
#[derive(Clone, Debug, Serialize)]
pub struct IntegrityCheck {
    /// Check id.
    pub check_id: String,
    /// The measured agent.
    pub agent_pubkey: String,
    /// The baseline the check was diffed against, if one was active.
    pub baseline_id: Option<String>,
    /// `green`, `yellow`, or `red`.
    pub status: String,
    /// The stored diff.
    pub diff: IntegrityDiff,
    /// When the check ran.
    pub checked_at: String,
}

fn manifest_to_json(hashes: &[FileHash]) -> Result<String> {
    serde_json::to_string(hashes).map_err(|e| StoreError::InvalidInput(e.to_string()))
}

fn manifest_from_json(json: &str) -> Result<Vec<FileHash>> {
    serde_json::from_str(json).map_err(|e| StoreError::CorruptDocument(e.to_string()))
}

fn baseline_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(IntegrityBaseline, String)> {
    Ok((
        IntegrityBaseline {
            baseline_id: row.get(0)?,
            agent_pubkey: row.get(1)?,
            owner_pubkey: row.get(2)?,
            file_hashes: Vec::new(),
            status: row.get(4)?,
            set_at: row.get(5)?,
        },
        row.get(3)?,
    ))
}

const BASELINE_COLUMNS: &str = "id, agent_pubkey, owner_pubkey, manifest_json, status, set_at";

pub(crate) fn active_baseline_tx(
    conn: &Connection,
    agent_pubkey: &str,
) -> Result<Option<IntegrityBaseline>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {BASELINE_COLUMNS} FROM integrity_baselines
                 WHERE agent_pubkey = ?1 AND status = 'active'
                 ORDER BY set_at DESC LIMIT 1"
            ),
            params![agent_pubkey],
            baseline_from_row,
        )
        .optional()?;
    row.map(|(mut baseline, manifest_json)| {
        baseline.file_hashes = manifest_from_json(&manifest_json)?;
        Ok(baseline)
    })
    .transpose()
}

impl KredoStore {
    /// Set a new active baseline, superseding any previous one. The
    /// caller has already verified the owner's signature and that the
    /// owner holds the active ownership claim.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the baseline id is taken.
    pub fn set_integrity_baseline(
        &self,
        baseline_id: &str,
        agent_pubkey: &str,
        owner_pubkey: &str,
        file_hashes: &[FileHash],
        signature: &str,
        audit_ctx: &AuditContext,
    ) -> Result<IntegrityBaseline> {
        let manifest_json = manifest_to_json(file_hashes)?;
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![agent_pubkey.to_string(), owner_pubkey.to_string()],
        };
        self.write(event, |tx| {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM integrity_baselines WHERE id = ?1",
                    params![baseline_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!(
                    "integrity baseline already exists: {baseline_id}"
                )));
            }
            tx.execute(
                "UPDATE integrity_baselines SET status = 'superseded'
                 WHERE agent_pubkey = ?1 AND status = 'active'",
                params![agent_pubkey],
            )?;
            tx.execute(
                "INSERT INTO integrity_baselines
                 (id, agent_pubkey, owner_pubkey, manifest_json, signature, status, set_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)",
                params![
                    baseline_id,
                    agent_pubkey,
                    owner_pubkey,
                    manifest_json,
                    signature,
                    now_str(),
                ],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            active_baseline_tx(tx, agent_pubkey)?.ok_or_else(|| StoreError::NotFound {
                kind: "integrity baseline",
                id: baseline_id.to_string(),
            })
        })
    }

    /// Record an agent-signed integrity check with its computed diff.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn record_integrity_check(
        &self,
        check_id: &str,
        agent_pubkey: &str,
        baseline_id: Option<&str>,
        status: &str,
        diff: &IntegrityDiff,
        file_hashes: &[FileHash],
        signature: &str,
        audit_ctx: &AuditContext,
    ) -> Result<IntegrityCheck> {
        let manifest_json = manifest_to_json(file_hashes)?;
        let diff_json =
            serde_json::to_string(diff).map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![agent_pubkey.to_string()],
        };
        self.write(event, |tx| {
            tx.execute(
                "INSERT INTO integrity_checks
                 (id, agent_pubkey, baseline_id, status, diff_json, manifest_json, signature, checked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    check_id,
                    agent_pubkey,
                    baseline_id,
                    status,
                    diff_json,
                    manifest_json,
                    signature,
                    now_str(),
                ],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            Ok(IntegrityCheck {
                check_id: check_id.to_string(),
                agent_pubkey: agent_pubkey.to_string(),
                baseline_id: baseline_id.map(String::from),
                status: status.to_string(),
                diff: diff.clone(),
                checked_at: now_str(),
            })
        })
    }

    /// The active baseline for an agent, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn active_integrity_baseline(
        &self,
        agent_pubkey: &str,
    ) -> Result<Option<IntegrityBaseline>> {
        self.read(|conn| active_baseline_tx(conn, agent_pubkey))
    }

    /// The most recent integrity check for an agent, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn latest_integrity_check(&self, agent_pubkey: &str) -> Result<Option<IntegrityCheck>> {
        self.read(|conn| latest_check_tx(conn, agent_pubkey))
    }
}

pub(crate) fn latest_check_tx(
    conn: &Connection,
    agent_pubkey: &str,
) -> Result<Option<IntegrityCheck>> {
    let row = conn
        .query_row(
            "SELECT id, agent_pubkey, baseline_id, status, diff_json, checked_at
             FROM integrity_checks WHERE agent_pubkey = ?1
             ORDER BY checked_at DESC, id DESC LIMIT 1",
            params![agent_pubkey],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;
    row.map(|(check_id, agent, baseline_id, status, diff_json, checked_at)| {
        let diff = serde_json::from_str(&diff_json)
            .map_err(|e| StoreError::CorruptDocument(e.to_string()))?;
        Ok(IntegrityCheck {
            check_id,
            agent_pubkey: agent,
            baseline_id,
            status,
            diff,
            checked_at,
        })
    })
    .transpose()
}

/// Compute the diff of a measured manifest against a baseline manifest.
/// Output path lists are sorted.
#[must_use]
pub fn diff_manifests(baseline: &[FileHash], measured: &[FileHash]) -> IntegrityDiff {
    use std::collections::BTreeMap;

    let base: BTreeMap<&str, &str> = baseline
        .iter()
        .map(|f| (f.path.as_str(), f.sha256.as_str()))
        .collect();
    let meas: BTreeMap<&str, &str> = measured
        .iter()
        .map(|f| (f.path.as_str(), f.sha256.as_str()))
        .collect();

    let mut diff = IntegrityDiff::default();
    for (path, hash) in &meas {
        match base.get(path) {
            None => diff.added.push((*path).to_string()),
            Some(base_hash) if base_hash != hash => diff.changed.push((*path).to_string()),
            Some(_) => {}
        }
    }
    for path in base.keys() {
        if !meas.contains_key(path) {
            diff.removed.push((*path).to_string());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(n: u8) -> String {
        format!("ed25519:{}", hex::encode([n; 32]))
    }

    fn sig() -> String {
        format!("ed25519:{}", "c".repeat(128))
    }

    fn ctx(action: &str) -> AuditContext {
        AuditContext::new(action)
    }

    fn fh(path: &str, seed: u8) -> FileHash {
        FileHash {
            path: path.into(),
            sha256: hex::encode([seed; 32]),
        }
    }

    #[test]
    fn test_diff_empty_when_identical() {
        let manifest = vec![fh("bin/agent", 1), fh("config.toml", 2)];
        let diff = diff_manifests(&manifest, &manifest);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_classifies_changes() {
        let baseline = vec![fh("a", 1), fh("b", 2), fh("c", 3)];
        let measured = vec![fh("a", 1), fh("b", 9), fh("d", 4)];
        let diff = diff_manifests(&baseline, &measured);
        assert_eq!(diff.added, vec!["d"]);
        assert_eq!(diff.removed, vec!["c"]);
        assert_eq!(diff.changed, vec!["b"]);
    }

    #[test]
    fn test_baseline_supersession() {
        let store = KredoStore::open_in_memory().unwrap();
        store
            .set_integrity_baseline(
                "bl-1",
                &pk(1),
                &pk(2),
                &[fh("a", 1)],
                &sig(),
                &ctx("integrity.baseline.set"),
            )
            .unwrap();
        store
            .set_integrity_baseline(
                "bl-2",
                &pk(1),
                &pk(2),
                &[fh("a", 2)],
                &sig(),
                &ctx("integrity.baseline.set"),
            )
            .unwrap();

        let active = store.active_integrity_baseline(&pk(1)).unwrap().unwrap();
        assert_eq!(active.baseline_id, "bl-2");

        let superseded: i64 = store
            .read(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT COUNT(*) FROM integrity_baselines WHERE status = 'superseded'",
                        [],
                        |row| row.get(0),
                    )
                    .unwrap())
            })
            .unwrap();
        assert_eq!(superseded, 1);
    }

    #[test]
    fn test_duplicate_baseline_id_conflicts() {
        let store = KredoStore::open_in_memory().unwrap();
        store
            .set_integrity_baseline(
                "bl-1",
                &pk(1),
                &pk(2),
                &[fh("a", 1)],
                &sig(),
                &ctx("integrity.baseline.set"),
            )
            .unwrap();
        let err = store
            .set_integrity_baseline(
                "bl-1",
                &pk(3),
                &pk(4),
                &[fh("a", 1)],
                &sig(),
                &ctx("integrity.baseline.set"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_check_recorded_and_latest_wins() {
        let store = KredoStore::open_in_memory().unwrap();
        let diff = IntegrityDiff::default();
        store
            .record_integrity_check(
                "chk-1",
                &pk(1),
                Some("bl-1"),
                "green",
                &diff,
                &[fh("a", 1)],
                &sig(),
                &ctx("integrity.check"),
            )
            .unwrap();
        let red_diff = IntegrityDiff {
            changed: vec!["a".into()],
            ..IntegrityDiff::default()
        };
        store
            .record_integrity_check(
                "chk-2",
                &pk(1),
                Some("bl-1"),
                "red",
                &red_diff,
                &[fh("a", 9)],
                &sig(),
                &ctx("integrity.check"),
            )
            .unwrap();

        let latest = store.latest_integrity_check(&pk(1)).unwrap().unwrap();
        assert_eq!(latest.check_id, "chk-2");
        assert_eq!(latest.status, "red");
        assert_eq!(latest.diff.changed, vec!["a"]);
    }
}
