//! Protocol document models: attestations, revocations, and disputes.
//!
//! Documents are immutable once accepted. Field names and value shapes
//! follow the wire contract: top-level `"kredo": "1.0"`, pubkey on
//! attestor/subject, `skill.specific`, flat `issued`/`expires`/`signature`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::signable_view;
use crate::error::{DocumentError, ProtocolError};
use crate::keys::is_valid_pubkey;
use crate::time;
use crate::verify::verify_signed_value;

/// Protocol version carried by every document.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Maximum attestation validity window (two years, leap-safe).
pub const MAX_VALIDITY_DAYS: i64 = 731;

/// Minimum evidence context length for behavioral warnings.
pub const WARNING_MIN_CONTEXT_CHARS: usize = 100;

/// Artifact categories that qualify as warning evidence.
pub const WARNING_ARTIFACT_CATEGORIES: [&str; 3] = ["log:", "hash:", "payload:"];

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether a peer is an autonomous agent or a human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    /// Autonomous agent.
    Agent,
    /// Human operator.
    Human,
}

impl ActorType {
    /// Wire string for this actor type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Agent => "agent",
            ActorType::Human => "human",
        }
    }
}

/// The kind of claim an attestation makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationType {
    /// Demonstrated skill.
    SkillAttestation,
    /// Intellectual contribution (research, design, analysis).
    IntellectualContribution,
    /// Community contribution.
    CommunityContribution,
    /// Negative report about observed behavior.
    BehavioralWarning,
}

impl AttestationType {
    /// Wire string for this attestation type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationType::SkillAttestation => "skill_attestation",
            AttestationType::IntellectualContribution => "intellectual_contribution",
            AttestationType::CommunityContribution => "community_contribution",
            AttestationType::BehavioralWarning => "behavioral_warning",
        }
    }
}

/// Category of a behavioral warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    /// Unsolicited bulk behavior.
    Spam,
    /// Malicious code distribution.
    Malware,
    /// Deliberately misleading output.
    Deception,
    /// Unauthorized data exfiltration.
    DataExfiltration,
    /// Impersonation of another identity.
    Impersonation,
}

impl WarningCategory {
    /// Wire string for this category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCategory::Spam => "spam",
            WarningCategory::Malware => "malware",
            WarningCategory::Deception => "deception",
            WarningCategory::DataExfiltration => "data_exfiltration",
            WarningCategory::Impersonation => "impersonation",
        }
    }
}

/// The peer an attestation is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// `ed25519:`-prefixed public key.
    pub pubkey: String,
    /// Display name (may be empty).
    #[serde(default)]
    pub name: String,
}

/// The peer making an attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestor {
    /// `ed25519:`-prefixed public key.
    pub pubkey: String,
    /// Display name (may be empty).
    #[serde(default)]
    pub name: String,
    /// Whether the attestor is an agent or human.
    #[serde(rename = "type")]
    pub actor_type: ActorType,
}

/// A skill claim within the shared taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Taxonomy domain slug.
    pub domain: String,
    /// Specific skill slug under the domain.
    pub specific: String,
    /// Proficiency level, 1 (novice) through 5 (authority).
    pub proficiency: u8,
}

/// Evidence supporting an attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Free-text description of the demonstrated behavior.
    pub context: String,
    /// Verifiable artifact references (URLs, `pr:`, `commit:`, `hash:`, ...).
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Outcome of the interaction (may be empty).
    #[serde(default)]
    pub outcome: String,
    /// When the attested interaction happened.
    #[serde(default, with = "time::serde_second_opt")]
    pub interaction_date: Option<DateTime<Utc>>,
}

/// A signed attestation of demonstrated skill or observed behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attestation {
    /// Protocol version, currently `"1.0"`.
    #[serde(default = "default_version")]
    pub kredo: String,
    /// Unique document id (UUID v4). Duplicates are rejected, never replaced.
    #[serde(default = "new_id")]
    pub id: String,
    /// What kind of claim this is.
    #[serde(rename = "type")]
    pub attestation_type: AttestationType,
    /// Who the attestation is about.
    pub subject: Subject,
    /// Who signed it.
    pub attestor: Attestor,
    /// Skill claim; required unless this is a behavioral warning.
    #[serde(default)]
    pub skill: Option<Skill>,
    /// Warning category; required for behavioral warnings.
    #[serde(default)]
    pub warning_category: Option<WarningCategory>,
    /// Supporting evidence.
    pub evidence: Evidence,
    /// Issue time.
    #[serde(default = "time::now", with = "time::serde_second")]
    pub issued: DateTime<Utc>,
    /// Expiry time; must be after `issued` and within two years of it.
    #[serde(with = "time::serde_second")]
    pub expires: DateTime<Utc>,
    /// Detached Ed25519 signature over the canonical signable view.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Attestation {
    /// Validate document shape and business rules (everything except the
    /// taxonomy lookup, which needs store state).
    ///
    /// # Errors
    ///
    /// Returns the first violated [`DocumentError`].
    pub fn validate(&self) -> Result<(), DocumentError> {
        if !is_valid_pubkey(&self.subject.pubkey) {
            return Err(DocumentError::InvalidPubkey { field: "subject.pubkey" });
        }
        if !is_valid_pubkey(&self.attestor.pubkey) {
            return Err(DocumentError::InvalidPubkey { field: "attestor.pubkey" });
        }
        if self.expires <= self.issued {
            return Err(DocumentError::ExpiresBeforeIssued);
        }
        if self.expires - self.issued > Duration::days(MAX_VALIDITY_DAYS) {
            return Err(DocumentError::ExpiryTooFar);
        }

        if self.attestation_type == AttestationType::BehavioralWarning {
            if self.warning_category.is_none() {
                return Err(DocumentError::MissingWarningCategory);
            }
            if self.evidence.context.chars().count() < WARNING_MIN_CONTEXT_CHARS {
                return Err(DocumentError::WarningContextTooShort);
            }
            let has_qualified_artifact = self.evidence.artifacts.iter().any(|a| {
                WARNING_ARTIFACT_CATEGORIES
                    .iter()
                    .any(|prefix| a.starts_with(prefix))
            });
            if !has_qualified_artifact {
                return Err(DocumentError::WarningArtifactMissing);
            }
        } else if self.skill.is_none() {
            return Err(DocumentError::MissingSkill(self.attestation_type.as_str()));
        }

        if let Some(skill) = &self.skill {
            if !(1..=5).contains(&skill.proficiency) {
                return Err(DocumentError::InvalidProficiency);
            }
        }

        Ok(())
    }

    /// The signable view of this attestation (all fields except `signature`).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotRepresentable`] if serialization fails.
    pub fn signable(&self) -> Result<Value, ProtocolError> {
        let value = serde_json::to_value(self)
            .map_err(|e| ProtocolError::NotRepresentable(e.to_string()))?;
        Ok(signable_view(&value))
    }

    /// Verify the attestation's signature against `attestor.pubkey`.
    ///
    /// # Errors
    ///
    /// [`DocumentError::MissingSignature`] when unsigned, otherwise any
    /// [`crate::error::VerifyError`].
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(DocumentError::MissingSignature)?;
        let view = self.signable()?;
        verify_signed_value(&view, &self.attestor.pubkey, signature)?;
        Ok(())
    }

    /// Whether the attestation has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// A signed revocation of a previously issued attestation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revocation {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub kredo: String,
    /// Unique revocation id.
    #[serde(default = "new_id")]
    pub id: String,
    /// The attestation being revoked.
    pub attestation_id: String,
    /// Who is revoking; must match the original attestor.
    pub revoker: Subject,
    /// Why the attestation is being withdrawn.
    pub reason: String,
    /// Issue time.
    #[serde(default = "time::now", with = "time::serde_second")]
    pub issued: DateTime<Utc>,
    /// Detached Ed25519 signature.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Revocation {
    /// Validate document shape.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`DocumentError`].
    pub fn validate(&self) -> Result<(), DocumentError> {
        if !is_valid_pubkey(&self.revoker.pubkey) {
            return Err(DocumentError::InvalidPubkey { field: "revoker.pubkey" });
        }
        Ok(())
    }

    /// The signable view of this revocation.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotRepresentable`] if serialization fails.
    pub fn signable(&self) -> Result<Value, ProtocolError> {
        let value = serde_json::to_value(self)
            .map_err(|e| ProtocolError::NotRepresentable(e.to_string()))?;
        Ok(signable_view(&value))
    }

    /// Verify the revocation's signature against `revoker.pubkey`.
    ///
    /// # Errors
    ///
    /// [`DocumentError::MissingSignature`] when unsigned, otherwise any
    /// [`crate::error::VerifyError`].
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(DocumentError::MissingSignature)?;
        let view = self.signable()?;
        verify_signed_value(&view, &self.revoker.pubkey, signature)?;
        Ok(())
    }
}

/// A signed dispute against a behavioral warning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dispute {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub kredo: String,
    /// Unique dispute id.
    #[serde(default = "new_id")]
    pub id: String,
    /// The behavioral warning being disputed.
    pub warning_id: String,
    /// Who is disputing; must match the warning's subject.
    pub disputor: Subject,
    /// The disputor's account of events.
    pub response: String,
    /// Optional counter-evidence.
    #[serde(default)]
    pub evidence: Option<Evidence>,
    /// Issue time.
    #[serde(default = "time::now", with = "time::serde_second")]
    pub issued: DateTime<Utc>,
    /// Detached Ed25519 signature.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Dispute {
    /// Validate document shape.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`DocumentError`].
    pub fn validate(&self) -> Result<(), DocumentError> {
        if !is_valid_pubkey(&self.disputor.pubkey) {
            return Err(DocumentError::InvalidPubkey { field: "disputor.pubkey" });
        }
        Ok(())
    }

    /// The signable view of this dispute.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotRepresentable`] if serialization fails.
    pub fn signable(&self) -> Result<Value, ProtocolError> {
        let value = serde_json::to_value(self)
            .map_err(|e| ProtocolError::NotRepresentable(e.to_string()))?;
        Ok(signable_view(&value))
    }

    /// Verify the dispute's signature against `disputor.pubkey`.
    ///
    /// # Errors
    ///
    /// [`DocumentError::MissingSignature`] when unsigned, otherwise any
    /// [`crate::error::VerifyError`].
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(DocumentError::MissingSignature)?;
        let view = self.signable()?;
        verify_signed_value(&view, &self.disputor.pubkey, signature)?;
        Ok(())
    }
}

/// Document kinds recognizable from raw JSON shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    /// An [`Attestation`].
    Attestation,
    /// A [`Revocation`].
    Revocation,
    /// A [`Dispute`].
    Dispute,
}

impl DocumentKind {
    /// Detect a document's kind from its fields, for endpoints that accept
    /// any signed document.
    #[must_use]
    pub fn detect(body: &Value) -> Option<Self> {
        let obj = body.as_object()?;
        if obj.contains_key("warning_id") && obj.contains_key("disputor") {
            return Some(DocumentKind::Dispute);
        }
        if obj.contains_key("attestation_id") && obj.contains_key("revoker") {
            return Some(DocumentKind::Revocation);
        }
        if obj.contains_key("attestor") && obj.contains_key("subject") {
            return Some(DocumentKind::Attestation);
        }
        None
    }

    /// Wire string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Attestation => "attestation",
            DocumentKind::Revocation => "revocation",
            DocumentKind::Dispute => "dispute",
        }
    }
}
