//! Profile bundle: every raw row a subject profile needs, fetched under
//! one connection hold so the assembler sees a consistent snapshot and
//! never touches SQL itself.

use rusqlite::params;
use serde::Serialize;

use crate::attestations::{
    all_active_tx, attestors_for_tx, get_attestation_tx, search_tx, StoredAttestation,
};
use crate::error::Result;
use crate::integrity::{active_baseline_tx, latest_check_tx, IntegrityBaseline, IntegrityCheck};
use crate::ownership::{active_owner_tx, OwnershipClaim};
use crate::registry::{get_known_key_tx, RegistrationView};
use crate::store::{KredoStore, Page};
use crate::AttestationFilter;

/// One warning against the subject, with its dispute count.
#[derive(Clone, Debug, Serialize)]
pub struct WarningRow {
    /// The warning attestation (revoked ones included).
    pub attestation: StoredAttestation,
    /// Disputes filed against it.
    pub dispute_count: u64,
}

/// One attestor in the subject's trust network.
#[derive(Clone, Debug, Serialize)]
pub struct TrustNetworkEntry {
    /// The attestor's pubkey.
    pub pubkey: String,
    /// The attestor's registered actor type.
    pub actor_type: String,
    /// Their non-revoked attestations for this subject.
    pub attestation_count_for_subject: u64,
    /// Non-revoked attestations about the attestor themselves.
    pub attestor_own_attestation_count: u64,
}

/// All raw rows behind `GET /agents/{pubkey}/profile`.
#[derive(Clone, Debug)]
pub struct ProfileBundle {
    /// Registry row for the subject.
    pub registration: RegistrationView,
    /// Non-revoked attestations about the subject.
    pub attestations: Vec<StoredAttestation>,
    /// Behavioral warnings (revoked included) with dispute counts.
    pub warnings: Vec<WarningRow>,
    /// Who attests for the subject.
    pub trust_network: Vec<TrustNetworkEntry>,
    /// The active ownership claim, if any.
    pub active_owner: Option<OwnershipClaim>,
    /// The owner's registry row, when linked.
    pub owner_registration: Option<RegistrationView>,
    /// The active integrity baseline, if any.
    pub active_baseline: Option<IntegrityBaseline>,
    /// The latest integrity check, if any.
    pub latest_check: Option<IntegrityCheck>,
    /// Every live attestation in the store, for trust analysis.
    pub all_active: Vec<StoredAttestation>,
}

impl KredoStore {
    /// Fetch everything a profile needs in one consistent read.
    ///
    /// Returns `None` when the pubkey has never been seen.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::StoreError) on database failure.
    pub fn profile_bundle(&self, pubkey: &str) -> Result<Option<ProfileBundle>> {
        self.read(|conn| {
            let Some(registration) = get_known_key_tx(conn, pubkey)? else {
                return Ok(None);
            };

            let attestations = search_tx(
                conn,
                &AttestationFilter::for_subject(pubkey),
                Page { limit: crate::MAX_PAGE_LIMIT, offset: 0 },
            )?;

            let warning_filter = AttestationFilter {
                subject: Some(pubkey.to_string()),
                attestation_type: Some("behavioral_warning".to_string()),
                include_revoked: true,
                ..AttestationFilter::default()
            };
            let warnings = search_tx(
                conn,
                &warning_filter,
                Page { limit: crate::MAX_PAGE_LIMIT, offset: 0 },
            )?
            .into_iter()
            .map(|attestation| {
                let dispute_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM disputes WHERE warning_id = ?1",
                    params![attestation.document.id],
                    |row| row.get(0),
                )?;
                Ok(WarningRow {
                    attestation,
                    dispute_count: dispute_count as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

            let trust_network = attestors_for_tx(conn, pubkey)?
                .into_iter()
                .map(|summary| {
                    let actor_type = get_known_key_tx(conn, &summary.pubkey)?
                        .map_or_else(|| "agent".to_string(), |r| r.actor_type);
                    let own_count: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM attestations
                         WHERE subject_pubkey = ?1 AND is_revoked = 0",
                        params![summary.pubkey],
                        |row| row.get(0),
                    )?;
                    Ok(TrustNetworkEntry {
                        pubkey: summary.pubkey,
                        actor_type,
                        attestation_count_for_subject: summary.attestation_count,
                        attestor_own_attestation_count: own_count as u64,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let active_owner = active_owner_tx(conn, pubkey)?;
            let owner_registration = match &active_owner {
                Some(claim) => get_known_key_tx(conn, &claim.human_pubkey)?,
                None => None,
            };
            let active_baseline = active_baseline_tx(conn, pubkey)?;
            let latest_check = latest_check_tx(conn, pubkey)?;
            let all_active = all_active_tx(conn)?;

            Ok(Some(ProfileBundle {
                registration,
                attestations,
                warnings,
                trust_network,
                active_owner,
                owner_registration,
                active_baseline,
                latest_check,
                all_active,
            }))
        })
    }

    /// Whether a document id exists, for `/verify`-style lookups that
    /// only need existence.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::StoreError) on database failure.
    pub fn attestation_exists(&self, id: &str) -> Result<bool> {
        self.read(|conn| Ok(get_attestation_tx(conn, id)?.is_some()))
    }
}
