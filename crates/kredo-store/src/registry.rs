//! Known-key registry.
//!
//! Every pubkey the service has seen gets a row: created by unsigned
//! `/register`, or implicitly when a signed document references a new key.
//! Unsigned registration never overwrites existing `name`/`type`; only a
//! signed `register_update` from the key itself may change them.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::audit;
use crate::error::{Result, StoreError};
use crate::store::{now_str, AuditContext, CommitEvent, KredoStore, Page};

/// One registry row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationView {
    /// `ed25519:`-prefixed public key.
    pub pubkey: String,
    /// Display name (may be empty).
    pub name: String,
    /// `agent` or `human`.
    #[serde(rename = "type")]
    pub actor_type: String,
    /// First time this key was seen.
    pub first_seen: String,
    /// Most recent time this key was referenced.
    pub last_seen: String,
}

/// Outcome of an unsigned registration attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The key was not previously known; a row was created.
    Created(RegistrationView),
    /// The key already existed; the stored row is returned unchanged
    /// (apart from `last_seen`).
    Existing(RegistrationView),
}

fn row_to_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegistrationView> {
    Ok(RegistrationView {
        pubkey: row.get(0)?,
        name: row.get(1)?,
        actor_type: row.get(2)?,
        first_seen: row.get(3)?,
        last_seen: row.get(4)?,
    })
}

const VIEW_COLUMNS: &str = "pubkey, name, type, first_seen, last_seen";

pub(crate) fn get_known_key_tx(
    conn: &Connection,
    pubkey: &str,
) -> Result<Option<RegistrationView>> {
    Ok(conn
        .query_row(
            &format!("SELECT {VIEW_COLUMNS} FROM known_keys WHERE pubkey = ?1"),
            params![pubkey],
            row_to_view,
        )
        .optional()?)
}

/// Insert-or-touch a known key inside an open transaction. Never
/// overwrites `name`/`type`; only refreshes `last_seen`.
pub(crate) fn touch_known_key_tx(
    conn: &Connection,
    pubkey: &str,
    name: &str,
    actor_type: &str,
) -> Result<()> {
    let now = now_str();
    conn.execute(
        "INSERT INTO known_keys (pubkey, name, type, first_seen, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(pubkey) DO UPDATE SET last_seen = excluded.last_seen",
        params![pubkey, name, actor_type, now],
    )?;
    Ok(())
}

impl KredoStore {
    /// Unsigned registration: create the row on first sight.
    ///
    /// Returns [`RegisterOutcome::Existing`] with the stored, unchanged
    /// registration when the pubkey is already known.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn register_unsigned(
        &self,
        pubkey: &str,
        name: &str,
        actor_type: &str,
        audit_ctx: &AuditContext,
    ) -> Result<RegisterOutcome> {
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![pubkey.to_string()],
        };
        self.write(event, |tx| {
            let existing = get_known_key_tx(tx, pubkey)?;
            touch_known_key_tx(tx, pubkey, name, actor_type)?;
            let stored = get_known_key_tx(tx, pubkey)?.ok_or_else(|| StoreError::NotFound {
                kind: "registration",
                id: pubkey.to_string(),
            })?;
            let outcome = if existing.is_some() { "existing" } else { "accepted" };
            audit::insert_audit_row(tx, audit_ctx, outcome)?;
            Ok(match existing {
                Some(_) => RegisterOutcome::Existing(stored),
                None => RegisterOutcome::Created(stored),
            })
        })
    }

    /// Signed metadata update from the key itself. Signature verification
    /// happens at the router; this only applies the change.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the pubkey has never been seen.
    pub fn register_update(
        &self,
        pubkey: &str,
        name: &str,
        actor_type: &str,
        audit_ctx: &AuditContext,
    ) -> Result<RegistrationView> {
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![pubkey.to_string()],
        };
        self.write(event, |tx| {
            let updated = tx.execute(
                "UPDATE known_keys SET name = ?1, type = ?2, last_seen = ?3 WHERE pubkey = ?4",
                params![name, actor_type, now_str(), pubkey],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    kind: "registration",
                    id: pubkey.to_string(),
                });
            }
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            get_known_key_tx(tx, pubkey)?.ok_or_else(|| StoreError::NotFound {
                kind: "registration",
                id: pubkey.to_string(),
            })
        })
    }

    /// Get a single known key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn get_known_key(&self, pubkey: &str) -> Result<Option<RegistrationView>> {
        self.read(|conn| get_known_key_tx(conn, pubkey))
    }

    /// List known keys, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn list_known_keys(&self, page: Page) -> Result<Vec<RegistrationView>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIEW_COLUMNS} FROM known_keys
                 ORDER BY first_seen DESC, pubkey ASC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt.query_map(params![page.limit, page.offset], row_to_view)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Count all known keys.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn count_known_keys(&self) -> Result<u64> {
        self.read(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM known_keys", [], |row| {
                row.get::<_, i64>(0)
            })? as u64)
        })
    }
}
