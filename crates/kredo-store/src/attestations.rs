//! Attestation, revocation, and dispute persistence.
//!
//! Attestations are append-only: a row is inserted once, never replaced,
//! and revocation only flips the revocation markers. Filtered queries and
//! pagination run in SQL, never as in-memory scans of full tables.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use kredo_protocol::{Attestation, Dispute, Revocation};

use crate::audit;
use crate::error::{Result, StoreError};
use crate::registry::touch_known_key_tx;
use crate::store::{now_str, ts_str, AuditContext, CommitEvent, EvidenceScores, KredoStore, Page};

/// An attestation as stored: the signed document plus server-derived
/// metadata.
#[derive(Clone, Debug, Serialize)]
pub struct StoredAttestation {
    /// The signed document as submitted.
    #[serde(flatten)]
    pub document: Attestation,
    /// Evidence scores computed at accept time.
    pub evidence_score: EvidenceScores,
    /// Whether a revocation has been accepted for this attestation.
    pub is_revoked: bool,
    /// When the revocation was accepted.
    pub revoked_at: Option<String>,
    /// Who revoked (always the original attestor).
    pub revoker_pubkey: Option<String>,
    /// When the service accepted the document.
    pub stored_at: String,
}

/// SQL-side filters for attestation queries.
#[derive(Clone, Debug, Default)]
pub struct AttestationFilter {
    /// Subject pubkey.
    pub subject: Option<String>,
    /// Attestor pubkey.
    pub attestor: Option<String>,
    /// Taxonomy domain.
    pub domain: Option<String>,
    /// Specific skill slug.
    pub skill: Option<String>,
    /// Attestation type wire string.
    pub attestation_type: Option<String>,
    /// Minimum proficiency (1-5).
    pub min_proficiency: Option<u8>,
    /// Include revoked rows.
    pub include_revoked: bool,
}

impl AttestationFilter {
    /// Filter to all non-revoked attestations about one subject.
    #[must_use]
    pub fn for_subject(pubkey: &str) -> Self {
        Self {
            subject: Some(pubkey.to_string()),
            ..Self::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(v) = &self.subject {
            conditions.push("subject_pubkey = ?");
            params_vec.push(Box::new(v.clone()));
        }
        if let Some(v) = &self.attestor {
            conditions.push("attestor_pubkey = ?");
            params_vec.push(Box::new(v.clone()));
        }
        if let Some(v) = &self.domain {
            conditions.push("domain = ?");
            params_vec.push(Box::new(v.clone()));
        }
        if let Some(v) = &self.skill {
            conditions.push("specific_skill = ?");
            params_vec.push(Box::new(v.clone()));
        }
        if let Some(v) = &self.attestation_type {
            conditions.push("type = ?");
            params_vec.push(Box::new(v.clone()));
        }
        if let Some(v) = self.min_proficiency {
            conditions.push("COALESCE(proficiency, 0) >= ?");
            params_vec.push(Box::new(i64::from(v)));
        }
        if !self.include_revoked {
            conditions.push("is_revoked = 0");
        }
        let clause = if conditions.is_empty() {
            String::from("1=1")
        } else {
            conditions.join(" AND ")
        };
        (clause, params_vec)
    }
}

/// One attestor of a subject, with how many of their attestations stand.
#[derive(Clone, Debug, Serialize)]
pub struct AttestorSummary {
    /// The attestor's pubkey.
    pub pubkey: String,
    /// Non-revoked attestations they signed for the subject.
    pub attestation_count: u64,
}

/// One subject an attestor has signed for.
#[derive(Clone, Debug, Serialize)]
pub struct SubjectSummary {
    /// The subject's pubkey.
    pub pubkey: String,
    /// Non-revoked attestations the attestor signed for them.
    pub attestation_count: u64,
}

const STORED_COLUMNS: &str = "raw_json, evidence_specificity, evidence_verifiability, \
     evidence_relevance, evidence_recency, evidence_composite, is_revoked, revoked_at, \
     revoker_pubkey, stored_at";

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, StoredAttestationMeta)> {
    Ok((
        row.get(0)?,
        StoredAttestationMeta {
            evidence_score: EvidenceScores {
                specificity: row.get(1)?,
                verifiability: row.get(2)?,
                relevance: row.get(3)?,
                recency: row.get(4)?,
                composite: row.get(5)?,
            },
            is_revoked: row.get::<_, i64>(6)? != 0,
            revoked_at: row.get(7)?,
            revoker_pubkey: row.get(8)?,
            stored_at: row.get(9)?,
        },
    ))
}

struct StoredAttestationMeta {
    evidence_score: EvidenceScores,
    is_revoked: bool,
    revoked_at: Option<String>,
    revoker_pubkey: Option<String>,
    stored_at: String,
}

fn assemble(raw_json: &str, meta: StoredAttestationMeta) -> Result<StoredAttestation> {
    let document: Attestation = serde_json::from_str(raw_json)
        .map_err(|e| StoreError::CorruptDocument(e.to_string()))?;
    Ok(StoredAttestation {
        document,
        evidence_score: meta.evidence_score,
        is_revoked: meta.is_revoked,
        revoked_at: meta.revoked_at,
        revoker_pubkey: meta.revoker_pubkey,
        stored_at: meta.stored_at,
    })
}

pub(crate) fn get_attestation_tx(conn: &Connection, id: &str) -> Result<Option<StoredAttestation>> {
    let row = conn
        .query_row(
            &format!("SELECT {STORED_COLUMNS} FROM attestations WHERE id = ?1"),
            params![id],
            row_to_stored,
        )
        .optional()?;
    row.map(|(raw, meta)| assemble(&raw, meta)).transpose()
}

pub(crate) fn search_tx(
    conn: &Connection,
    filter: &AttestationFilter,
    page: Page,
) -> Result<Vec<StoredAttestation>> {
    let (where_clause, mut params_vec) = filter.where_clause();
    params_vec.push(Box::new(page.limit));
    params_vec.push(Box::new(page.offset));
    let sql = format!(
        "SELECT {STORED_COLUMNS} FROM attestations WHERE {where_clause}
         ORDER BY issued DESC, id ASC LIMIT ? OFFSET ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
        row_to_stored,
    )?;
    rows.map(|r| {
        let (raw, meta) = r?;
        assemble(&raw, meta)
    })
    .collect()
}

pub(crate) fn all_active_tx(conn: &Connection) -> Result<Vec<StoredAttestation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STORED_COLUMNS} FROM attestations WHERE is_revoked = 0
         ORDER BY issued DESC, id ASC"
    ))?;
    let rows = stmt.query_map([], row_to_stored)?;
    rows.map(|r| {
        let (raw, meta) = r?;
        assemble(&raw, meta)
    })
    .collect()
}

pub(crate) fn attestors_for_tx(conn: &Connection, subject: &str) -> Result<Vec<AttestorSummary>> {
    let mut stmt = conn.prepare(
        "SELECT attestor_pubkey, COUNT(*) FROM attestations
         WHERE subject_pubkey = ?1 AND is_revoked = 0
         GROUP BY attestor_pubkey ORDER BY COUNT(*) DESC, attestor_pubkey ASC",
    )?;
    let rows = stmt.query_map(params![subject], |row| {
        Ok(AttestorSummary {
            pubkey: row.get(0)?,
            attestation_count: row.get::<_, i64>(1)? as u64,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl KredoStore {
    /// Insert a verified attestation with its accept-time evidence scores.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateAttestation`] when the id was already used;
    /// database errors otherwise.
    pub fn insert_attestation(
        &self,
        doc: &Attestation,
        scores: EvidenceScores,
        audit_ctx: &AuditContext,
    ) -> Result<StoredAttestation> {
        let raw_json = serde_json::to_string(doc)
            .map_err(|e| StoreError::InvalidInput(format!("unserializable document: {e}")))?;
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![doc.attestor.pubkey.clone(), doc.subject.pubkey.clone()],
        };
        self.write(event, |tx| {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM attestations WHERE id = ?1",
                    params![doc.id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::DuplicateAttestation(doc.id.clone()));
            }

            let skill = doc.skill.as_ref();
            tx.execute(
                "INSERT INTO attestations
                 (id, type, attestor_pubkey, subject_pubkey, domain, specific_skill,
                  proficiency, warning_category, evidence_context, evidence_artifacts,
                  evidence_outcome, evidence_interaction_date, issued, expires, signature,
                  raw_json, evidence_specificity, evidence_verifiability, evidence_relevance,
                  evidence_recency, evidence_composite, is_revoked, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, 0, ?22)",
                params![
                    doc.id,
                    doc.attestation_type.as_str(),
                    doc.attestor.pubkey,
                    doc.subject.pubkey,
                    skill.map(|s| s.domain.clone()),
                    skill.map(|s| s.specific.clone()),
                    skill.map(|s| i64::from(s.proficiency)),
                    doc.warning_category.map(|c| c.as_str()),
                    doc.evidence.context,
                    serde_json::to_string(&doc.evidence.artifacts)
                        .map_err(|e| StoreError::InvalidInput(e.to_string()))?,
                    doc.evidence.outcome,
                    doc.evidence.interaction_date.map(ts_str),
                    ts_str(doc.issued),
                    ts_str(doc.expires),
                    doc.signature,
                    raw_json,
                    scores.specificity,
                    scores.verifiability,
                    scores.relevance,
                    scores.recency,
                    scores.composite,
                    now_str(),
                ],
            )?;

            // Auto-register referenced pubkeys so the directory stays
            // complete; never overwrites signed registrations.
            touch_known_key_tx(
                tx,
                &doc.attestor.pubkey,
                &doc.attestor.name,
                doc.attestor.actor_type.as_str(),
            )?;
            touch_known_key_tx(tx, &doc.subject.pubkey, &doc.subject.name, "agent")?;

            audit::insert_audit_row(tx, audit_ctx, "accepted")?;

            get_attestation_tx(tx, &doc.id)?.ok_or_else(|| StoreError::NotFound {
                kind: "attestation",
                id: doc.id.clone(),
            })
        })
    }

    /// Get one attestation with its stored metadata.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn get_attestation(&self, id: &str) -> Result<Option<StoredAttestation>> {
        self.read(|conn| get_attestation_tx(conn, id))
    }

    /// Search attestations with all filters pushed to SQL, sorted
    /// `issued DESC, id ASC`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn search_attestations(
        &self,
        filter: &AttestationFilter,
        page: Page,
    ) -> Result<Vec<StoredAttestation>> {
        self.read(|conn| search_tx(conn, filter, page))
    }

    /// Count attestations matching a filter.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn count_attestations(&self, filter: &AttestationFilter) -> Result<u64> {
        self.read(|conn| {
            let (where_clause, params_vec) = filter.where_clause();
            let sql = format!("SELECT COUNT(*) FROM attestations WHERE {where_clause}");
            let count: i64 = conn.query_row(
                &sql,
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// All non-revoked attestations, for trust-engine snapshots.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn all_active_attestations(&self) -> Result<Vec<StoredAttestation>> {
        self.read(all_active_tx)
    }

    /// Minimal `(attestor, subject)` directed edges over non-revoked
    /// attestations, for ring detection.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn attestation_edges(&self) -> Result<Vec<(String, String)>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT attestor_pubkey, subject_pubkey
                 FROM attestations WHERE is_revoked = 0",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// All attestors who signed for a subject, with counts.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn attestors_for(&self, subject: &str) -> Result<Vec<AttestorSummary>> {
        self.read(|conn| attestors_for_tx(conn, subject))
    }

    /// All subjects an attestor has signed for, with counts.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn attested_by(&self, attestor: &str) -> Result<Vec<SubjectSummary>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT subject_pubkey, COUNT(*) FROM attestations
                 WHERE attestor_pubkey = ?1 AND is_revoked = 0
                 GROUP BY subject_pubkey ORDER BY COUNT(*) DESC, subject_pubkey ASC",
            )?;
            let rows = stmt.query_map(params![attestor], |row| {
                Ok(SubjectSummary {
                    pubkey: row.get(0)?,
                    attestation_count: row.get::<_, i64>(1)? as u64,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Accept a revocation: only the original attestor may revoke, the
    /// target must exist and not already be revoked.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for a missing target,
    /// [`StoreError::PermissionDenied`] for the wrong revoker,
    /// [`StoreError::Conflict`] when already revoked.
    pub fn revoke_attestation(
        &self,
        revocation: &Revocation,
        audit_ctx: &AuditContext,
    ) -> Result<()> {
        let raw_json = serde_json::to_string(revocation)
            .map_err(|e| StoreError::InvalidInput(format!("unserializable document: {e}")))?;
        // The subject's derived views change too; resolve it up front so the
        // commit event can invalidate both keys. The transaction re-checks
        // everything.
        let mut pubkeys = vec![revocation.revoker.pubkey.clone()];
        if let Some(subject) = self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT subject_pubkey FROM attestations WHERE id = ?1",
                    params![revocation.attestation_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?)
        })? {
            pubkeys.push(subject);
        }
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys,
        };
        self.write(
            event,
            |tx| {
                let target: Option<(String, String, i64)> = tx
                    .query_row(
                        "SELECT attestor_pubkey, subject_pubkey, is_revoked
                         FROM attestations WHERE id = ?1",
                        params![revocation.attestation_id],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let (attestor, _subject, is_revoked) =
                    target.ok_or_else(|| StoreError::NotFound {
                        kind: "attestation",
                        id: revocation.attestation_id.clone(),
                    })?;
                if attestor != revocation.revoker.pubkey {
                    return Err(StoreError::PermissionDenied(
                        "only the original attestor can revoke an attestation".into(),
                    ));
                }
                if is_revoked != 0 {
                    return Err(StoreError::Conflict(format!(
                        "attestation already revoked: {}",
                        revocation.attestation_id
                    )));
                }

                tx.execute(
                    "INSERT INTO revocations
                     (id, attestation_id, revoker_pubkey, reason, issued, signature, raw_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        revocation.id,
                        revocation.attestation_id,
                        revocation.revoker.pubkey,
                        revocation.reason,
                        ts_str(revocation.issued),
                        revocation.signature,
                        raw_json,
                    ],
                )?;
                tx.execute(
                    "UPDATE attestations
                     SET is_revoked = 1, revoked_at = ?1, revoker_pubkey = ?2
                     WHERE id = ?3",
                    params![now_str(), revocation.revoker.pubkey, revocation.attestation_id],
                )?;
                audit::insert_audit_row(tx, audit_ctx, "accepted")?;
                Ok(())
            },
        )
    }

    /// Accept a dispute against a behavioral warning: the target must be
    /// a warning and the disputor must be its subject.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for a missing warning,
    /// [`StoreError::InvalidInput`] when the target is not a warning,
    /// [`StoreError::PermissionDenied`] for the wrong disputor.
    pub fn insert_dispute(&self, dispute: &Dispute, audit_ctx: &AuditContext) -> Result<()> {
        let raw_json = serde_json::to_string(dispute)
            .map_err(|e| StoreError::InvalidInput(format!("unserializable document: {e}")))?;
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![dispute.disputor.pubkey.clone()],
        };
        self.write(event, |tx| {
            let target: Option<(String, String)> = tx
                .query_row(
                    "SELECT type, subject_pubkey FROM attestations WHERE id = ?1",
                    params![dispute.warning_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (att_type, subject) = target.ok_or_else(|| StoreError::NotFound {
                kind: "warning",
                id: dispute.warning_id.clone(),
            })?;
            if att_type != "behavioral_warning" {
                return Err(StoreError::InvalidInput(
                    "disputes can only be filed against behavioral warnings".into(),
                ));
            }
            if subject != dispute.disputor.pubkey {
                return Err(StoreError::PermissionDenied(
                    "only the subject of a warning can dispute it".into(),
                ));
            }

            tx.execute(
                "INSERT INTO disputes
                 (id, warning_id, disputor_pubkey, response, evidence_json, issued, signature, raw_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    dispute.id,
                    dispute.warning_id,
                    dispute.disputor.pubkey,
                    dispute.response,
                    dispute
                        .evidence
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()
                        .map_err(|e| StoreError::InvalidInput(e.to_string()))?,
                    ts_str(dispute.issued),
                    dispute.signature,
                    raw_json,
                ],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            Ok(())
        })
    }

    /// Count disputes filed against a warning.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn count_disputes_for(&self, warning_id: &str) -> Result<u64> {
        self.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM disputes WHERE warning_id = ?1",
                params![warning_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// All disputes filed against a warning, as raw documents.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn disputes_for(&self, warning_id: &str) -> Result<Vec<Dispute>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT raw_json FROM disputes WHERE warning_id = ?1 ORDER BY issued ASC",
            )?;
            let rows = stmt.query_map(params![warning_id], |row| row.get::<_, String>(0))?;
            rows.map(|r| {
                serde_json::from_str(&r?).map_err(|e| StoreError::CorruptDocument(e.to_string()))
            })
            .collect()
        })
    }
}
