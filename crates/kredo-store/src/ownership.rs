//! Ownership claim state machine.
//!
//! `pending → active → revoked` are the only legal transitions, each gated
//! by a signature checked at the router. At most one claim per agent may
//! be `active` at a time; a new claim while another is active fails with a
//! conflict rather than silently superseding it.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::audit;
use crate::error::{Result, StoreError};
use crate::store::{now_str, AuditContext, CommitEvent, KredoStore};

/// Ownership claim status values.
pub mod status {
    /// Claimed by the agent, awaiting the human's confirmation.
    pub const PENDING: &str = "pending";
    /// Confirmed by the named human.
    pub const ACTIVE: &str = "active";
    /// Revoked by either party.
    pub const REVOKED: &str = "revoked";
}

/// One ownership claim row.
#[derive(Clone, Debug, Serialize)]
pub struct OwnershipClaim {
    /// Claim id (client-provided or server-generated).
    pub claim_id: String,
    /// The agent being claimed.
    pub agent_pubkey: String,
    /// The human named as owner.
    pub human_pubkey: String,
    /// Current state: `pending`, `active`, or `revoked`.
    pub status: String,
    /// When the agent filed the claim.
    pub claimed_at: String,
    /// When the human confirmed, if they have.
    pub confirmed_at: Option<String>,
    /// When the claim was revoked, if it was.
    pub revoked_at: Option<String>,
    /// Who revoked it.
    pub revoked_by: Option<String>,
    /// Why it was revoked.
    pub revoke_reason: Option<String>,
}

fn row_to_claim(row: &rusqlite::Row<'_>) -> rusqlite::Result<OwnershipClaim> {
    Ok(OwnershipClaim {
        claim_id: row.get(0)?,
        agent_pubkey: row.get(1)?,
        human_pubkey: row.get(2)?,
        status: row.get(3)?,
        claimed_at: row.get(4)?,
        confirmed_at: row.get(5)?,
        revoked_at: row.get(6)?,
        revoked_by: row.get(7)?,
        revoke_reason: row.get(8)?,
    })
}

const CLAIM_COLUMNS: &str =
    "id, agent_pubkey, human_pubkey, status, claimed_at, confirmed_at, revoked_at, revoked_by, revoke_reason";

fn get_claim_tx(conn: &Connection, claim_id: &str) -> Result<Option<OwnershipClaim>> {
    Ok(conn
        .query_row(
            &format!("SELECT {CLAIM_COLUMNS} FROM ownership_links WHERE id = ?1"),
            params![claim_id],
            row_to_claim,
        )
        .optional()?)
}

pub(crate) fn active_owner_tx(
    conn: &Connection,
    agent_pubkey: &str,
) -> Result<Option<OwnershipClaim>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {CLAIM_COLUMNS} FROM ownership_links
                 WHERE agent_pubkey = ?1 AND status = 'active'
                 ORDER BY confirmed_at DESC, claimed_at DESC LIMIT 1"
            ),
            params![agent_pubkey],
            row_to_claim,
        )
        .optional()?)
}

impl KredoStore {
    /// File a pending ownership claim (agent-signed).
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the claim id is taken, when the agent
    /// already has an active owner, or when an identical pending claim is
    /// open.
    pub fn create_ownership_claim(
        &self,
        claim_id: &str,
        agent_pubkey: &str,
        human_pubkey: &str,
        agent_signature: &str,
        claim_payload_json: &str,
        audit_ctx: &AuditContext,
    ) -> Result<OwnershipClaim> {
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![agent_pubkey.to_string(), human_pubkey.to_string()],
        };
        self.write(event, |tx| {
            if get_claim_tx(tx, claim_id)?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "ownership claim already exists: {claim_id}"
                )));
            }
            if active_owner_tx(tx, agent_pubkey)?.is_some() {
                return Err(StoreError::Conflict(
                    "agent already has an active owner; revoke it before filing a new claim"
                        .into(),
                ));
            }
            tx.execute(
                "INSERT INTO ownership_links
                 (id, agent_pubkey, human_pubkey, status, agent_signature,
                  claim_payload_json, claimed_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6)",
                params![
                    claim_id,
                    agent_pubkey,
                    human_pubkey,
                    agent_signature,
                    claim_payload_json,
                    now_str(),
                ],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            get_claim_tx(tx, claim_id)?.ok_or_else(|| StoreError::NotFound {
                kind: "ownership claim",
                id: claim_id.to_string(),
            })
        })
    }

    /// Confirm a pending claim (human-signed), activating it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown claim,
    /// [`StoreError::PermissionDenied`] when the confirmer is not the
    /// named human, [`StoreError::Conflict`] when the claim is not
    /// pending or another claim became active in the meantime.
    pub fn confirm_ownership_claim(
        &self,
        claim_id: &str,
        human_pubkey: &str,
        human_signature: &str,
        confirm_payload_json: &str,
        audit_ctx: &AuditContext,
    ) -> Result<OwnershipClaim> {
        // The agent's accountability tier flips on confirmation; resolve the
        // agent pubkey up front so its cache entry is invalidated too.
        let agent = self
            .read(|conn| get_claim_tx(conn, claim_id))?
            .map(|c| c.agent_pubkey);
        let mut pubkeys = vec![human_pubkey.to_string()];
        pubkeys.extend(agent);
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys,
        };
        let claim = self.write(
            event,
            |tx| {
                let claim = get_claim_tx(tx, claim_id)?.ok_or_else(|| StoreError::NotFound {
                    kind: "ownership claim",
                    id: claim_id.to_string(),
                })?;
                if claim.human_pubkey != human_pubkey {
                    return Err(StoreError::PermissionDenied(
                        "only the designated human key can confirm this ownership claim".into(),
                    ));
                }
                if claim.status != status::PENDING {
                    return Err(StoreError::Conflict(format!(
                        "ownership claim must be pending to confirm (current: {})",
                        claim.status
                    )));
                }
                if active_owner_tx(tx, &claim.agent_pubkey)?.is_some() {
                    return Err(StoreError::Conflict(
                        "agent already has an active owner".into(),
                    ));
                }
                tx.execute(
                    "UPDATE ownership_links
                     SET status = 'active', human_signature = ?1,
                         confirm_payload_json = ?2, confirmed_at = ?3
                     WHERE id = ?4",
                    params![human_signature, confirm_payload_json, now_str(), claim_id],
                )?;
                audit::insert_audit_row(tx, audit_ctx, "accepted")?;
                get_claim_tx(tx, claim_id)?.ok_or_else(|| StoreError::NotFound {
                    kind: "ownership claim",
                    id: claim_id.to_string(),
                })
            },
        )?;
        Ok(claim)
    }

    /// Revoke a claim (signed by either party).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown claim,
    /// [`StoreError::PermissionDenied`] when the revoker is neither
    /// party, [`StoreError::Conflict`] when already revoked.
    pub fn revoke_ownership_claim(
        &self,
        claim_id: &str,
        revoker_pubkey: &str,
        reason: &str,
        audit_ctx: &AuditContext,
    ) -> Result<OwnershipClaim> {
        let mut pubkeys = vec![revoker_pubkey.to_string()];
        if let Some(claim) = self.read(|conn| get_claim_tx(conn, claim_id))? {
            pubkeys.push(claim.agent_pubkey);
            pubkeys.push(claim.human_pubkey);
        }
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys,
        };
        self.write(event, |tx| {
            let claim = get_claim_tx(tx, claim_id)?.ok_or_else(|| StoreError::NotFound {
                kind: "ownership claim",
                id: claim_id.to_string(),
            })?;
            if revoker_pubkey != claim.agent_pubkey && revoker_pubkey != claim.human_pubkey {
                return Err(StoreError::PermissionDenied(
                    "only the linked agent or human owner can revoke this claim".into(),
                ));
            }
            if claim.status == status::REVOKED {
                return Err(StoreError::Conflict(format!(
                    "ownership claim already revoked: {claim_id}"
                )));
            }
            tx.execute(
                "UPDATE ownership_links
                 SET status = 'revoked', revoked_at = ?1, revoked_by = ?2, revoke_reason = ?3
                 WHERE id = ?4",
                params![now_str(), revoker_pubkey, reason, claim_id],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            get_claim_tx(tx, claim_id)?.ok_or_else(|| StoreError::NotFound {
                kind: "ownership claim",
                id: claim_id.to_string(),
            })
        })
    }

    /// Get one claim by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn get_ownership_claim(&self, claim_id: &str) -> Result<Option<OwnershipClaim>> {
        self.read(|conn| get_claim_tx(conn, claim_id))
    }

    /// The currently active ownership claim for an agent, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn active_owner(&self, agent_pubkey: &str) -> Result<Option<OwnershipClaim>> {
        self.read(|conn| active_owner_tx(conn, agent_pubkey))
    }

    /// Full claim history for an agent, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn ownership_history(&self, agent_pubkey: &str) -> Result<Vec<OwnershipClaim>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLAIM_COLUMNS} FROM ownership_links
                 WHERE agent_pubkey = ?1 ORDER BY claimed_at DESC, id ASC"
            ))?;
            let rows = stmt.query_map(params![agent_pubkey], row_to_claim)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}
