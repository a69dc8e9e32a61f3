//! Document pin index.
//!
//! Maps protocol documents to content ids on an external pinning service.
//! The pinning helper itself lives outside this service; the index is
//! store state so documents and their pins survive together.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::store::{now_str, KredoStore};

/// One pin record.
#[derive(Clone, Debug, Serialize)]
pub struct PinRecord {
    /// Content id on the pinning provider.
    pub cid: String,
    /// The pinned document's id.
    pub document_id: String,
    /// `attestation`, `revocation`, or `dispute`.
    pub document_type: String,
    /// Provider name.
    pub provider: String,
    /// When the pin was recorded.
    pub pinned_at: String,
}

impl KredoStore {
    /// Record (or refresh) a pin for a document.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn record_pin(
        &self,
        cid: &str,
        document_id: &str,
        document_type: &str,
        provider: &str,
    ) -> Result<()> {
        self.read(|conn| {
            conn.execute(
                "INSERT INTO document_pins (cid, document_id, document_type, provider, pinned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(cid) DO UPDATE SET pinned_at = excluded.pinned_at",
                params![cid, document_id, document_type, provider, now_str()],
            )?;
            Ok(())
        })
    }

    /// Look up the pin for a document, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn pin_for_document(&self, document_id: &str) -> Result<Option<PinRecord>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT cid, document_id, document_type, provider, pinned_at
                     FROM document_pins WHERE document_id = ?1
                     ORDER BY pinned_at DESC LIMIT 1",
                    params![document_id],
                    |row| {
                        Ok(PinRecord {
                            cid: row.get(0)?,
                            document_id: row.get(1)?,
                            document_type: row.get(2)?,
                            provider: row.get(3)?,
                            pinned_at: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        })
    }
}
