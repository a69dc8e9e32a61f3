//! Skill taxonomy: bundled seed plus signed custom entries.
//!
//! The bundled taxonomy ships with the service and never changes at
//! runtime. Custom domains and skills are added through signed mutations
//! and merged into a copy-on-write snapshot; readers hold an `Arc` to an
//! immutable snapshot that is rebuilt after any mutation.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::audit;
use crate::error::{Result, StoreError};
use crate::store::{now_str, AuditContext, CommitEvent, KredoStore};

/// Bundled taxonomy version.
pub const TAXONOMY_VERSION: &str = "1.0";

/// The bundled seed: 7 domains, 54 skills.
const BUNDLED: &[(&str, &str, &[&str])] = &[
    (
        "code-generation",
        "Code Generation",
        &[
            "code-review",
            "api-design",
            "refactoring",
            "debugging",
            "test-authoring",
            "code-documentation",
            "dependency-management",
            "performance-tuning",
        ],
    ),
    (
        "reasoning",
        "Reasoning",
        &[
            "planning",
            "conceptual-analysis",
            "causal-inference",
            "task-decomposition",
            "constraint-solving",
            "hypothesis-testing",
            "analogy",
            "estimation",
        ],
    ),
    (
        "natural-language",
        "Natural Language",
        &[
            "summarization",
            "translation",
            "technical-writing",
            "editing",
            "sentiment-analysis",
            "entity-extraction",
            "question-answering",
            "dialogue",
        ],
    ),
    (
        "data-analysis",
        "Data Analysis",
        &[
            "data-cleaning",
            "statistical-analysis",
            "visualization",
            "anomaly-detection",
            "forecasting",
            "sql-authoring",
            "feature-engineering",
            "reporting",
        ],
    ),
    (
        "security-operations",
        "Security Operations",
        &[
            "incident-triage",
            "threat-hunting",
            "log-analysis",
            "vulnerability-assessment",
            "malware-analysis",
            "forensics",
            "detection-engineering",
            "patch-management",
        ],
    ),
    (
        "tool-use",
        "Tool Use",
        &[
            "web-research",
            "browser-automation",
            "file-management",
            "api-integration",
            "shell-operations",
            "scheduling",
            "retrieval",
        ],
    ),
    (
        "collaboration",
        "Collaboration",
        &[
            "task-delegation",
            "peer-review",
            "mentoring",
            "documentation",
            "community-support",
            "moderation",
            "project-coordination",
        ],
    ),
];

/// One domain in a snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct DomainEntry {
    /// Human-readable label.
    pub label: String,
    /// Skill slugs under this domain.
    pub skills: Vec<String>,
    /// Whether the domain came from a signed mutation.
    pub custom: bool,
}

/// An immutable merged view of the taxonomy.
#[derive(Clone, Debug, Serialize)]
pub struct TaxonomySnapshot {
    /// Bundled taxonomy version.
    pub version: String,
    /// Domains keyed by slug.
    pub domains: BTreeMap<String, DomainEntry>,
}

impl TaxonomySnapshot {
    /// All domain slugs.
    #[must_use]
    pub fn domain_slugs(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    /// Whether a domain exists.
    #[must_use]
    pub fn has_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Whether a `(domain, specific)` pair is valid.
    #[must_use]
    pub fn is_valid_skill(&self, domain: &str, specific: &str) -> bool {
        self.domains
            .get(domain)
            .is_some_and(|d| d.skills.iter().any(|s| s == specific))
    }

    /// Skills for a domain, if it exists.
    #[must_use]
    pub fn skills(&self, domain: &str) -> Option<&[String]> {
        self.domains.get(domain).map(|d| d.skills.as_slice())
    }
}

fn bundled_has_domain(domain: &str) -> bool {
    BUNDLED.iter().any(|(slug, _, _)| *slug == domain)
}

impl KredoStore {
    /// Current merged taxonomy snapshot (bundled + custom), cached
    /// copy-on-write.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub fn taxonomy_snapshot(&self) -> Result<Arc<TaxonomySnapshot>> {
        {
            let cache = self
                .taxonomy_cache
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(snapshot) = cache.as_ref() {
                return Ok(Arc::clone(snapshot));
            }
        }
        let snapshot = Arc::new(self.build_taxonomy_snapshot()?);
        let mut cache = self
            .taxonomy_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cache = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn invalidate_taxonomy_cache(&self) {
        let mut cache = self
            .taxonomy_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *cache = None;
    }

    fn build_taxonomy_snapshot(&self) -> Result<TaxonomySnapshot> {
        let mut domains: BTreeMap<String, DomainEntry> = BUNDLED
            .iter()
            .map(|(slug, label, skills)| {
                (
                    (*slug).to_string(),
                    DomainEntry {
                        label: (*label).to_string(),
                        skills: skills.iter().map(|s| (*s).to_string()).collect(),
                        custom: false,
                    },
                )
            })
            .collect();

        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT id, label FROM custom_domains ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, label) = row?;
                domains.entry(id).or_insert(DomainEntry {
                    label,
                    skills: Vec::new(),
                    custom: true,
                });
            }

            let mut stmt =
                conn.prepare("SELECT domain_id, id FROM custom_skills ORDER BY domain_id, id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (domain_id, skill_id) = row?;
                if let Some(entry) = domains.get_mut(&domain_id) {
                    if !entry.skills.iter().any(|s| *s == skill_id) {
                        entry.skills.push(skill_id);
                    }
                }
            }
            Ok(())
        })?;

        Ok(TaxonomySnapshot {
            version: TAXONOMY_VERSION.to_string(),
            domains,
        })
    }

    /// Create a custom domain.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the slug exists in the bundled or
    /// custom taxonomy.
    pub fn create_custom_domain(
        &self,
        domain_id: &str,
        label: &str,
        creator_pubkey: &str,
        audit_ctx: &AuditContext,
    ) -> Result<()> {
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![creator_pubkey.to_string()],
        };
        self.write(event, |tx| {
            if bundled_has_domain(domain_id) {
                return Err(StoreError::Conflict(format!(
                    "domain '{domain_id}' already exists in the bundled taxonomy"
                )));
            }
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM custom_domains WHERE id = ?1",
                    params![domain_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!(
                    "domain '{domain_id}' already exists"
                )));
            }
            tx.execute(
                "INSERT INTO custom_domains (id, label, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![domain_id, label, creator_pubkey, now_str()],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            Ok(())
        })?;
        self.invalidate_taxonomy_cache();
        Ok(())
    }

    /// Add a custom skill under an existing domain.
    ///
    /// # Errors
    ///
    /// [`StoreError::Taxonomy`] for an unknown domain,
    /// [`StoreError::Conflict`] when the skill already exists.
    pub fn create_custom_skill(
        &self,
        domain_id: &str,
        skill_id: &str,
        creator_pubkey: &str,
        audit_ctx: &AuditContext,
    ) -> Result<()> {
        let snapshot = self.taxonomy_snapshot()?;
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![creator_pubkey.to_string()],
        };
        self.write(event, |tx| {
            if !snapshot.has_domain(domain_id) {
                return Err(StoreError::Taxonomy(format!(
                    "domain '{domain_id}' does not exist"
                )));
            }
            if snapshot.is_valid_skill(domain_id, skill_id) {
                return Err(StoreError::Conflict(format!(
                    "skill '{skill_id}' already exists in domain '{domain_id}'"
                )));
            }
            tx.execute(
                "INSERT INTO custom_skills (id, domain_id, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![skill_id, domain_id, creator_pubkey, now_str()],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!(
                        "skill '{skill_id}' already exists in domain '{domain_id}'"
                    ))
                }
                other => StoreError::Database(other),
            })?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            Ok(())
        })?;
        self.invalidate_taxonomy_cache();
        Ok(())
    }

    /// Delete a custom domain (creator only). Cascades to its skills.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown or bundled domains,
    /// [`StoreError::PermissionDenied`] for non-creators.
    pub fn delete_custom_domain(
        &self,
        domain_id: &str,
        requester_pubkey: &str,
        audit_ctx: &AuditContext,
    ) -> Result<()> {
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![requester_pubkey.to_string()],
        };
        self.write(event, |tx| {
            let created_by: Option<String> = tx
                .query_row(
                    "SELECT created_by FROM custom_domains WHERE id = ?1",
                    params![domain_id],
                    |row| row.get(0),
                )
                .optional()?;
            let created_by = created_by.ok_or_else(|| StoreError::NotFound {
                kind: "custom domain",
                id: domain_id.to_string(),
            })?;
            if created_by != requester_pubkey {
                return Err(StoreError::PermissionDenied(
                    "only the creator can delete this domain".into(),
                ));
            }
            tx.execute(
                "DELETE FROM custom_skills WHERE domain_id = ?1",
                params![domain_id],
            )?;
            tx.execute("DELETE FROM custom_domains WHERE id = ?1", params![domain_id])?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            Ok(())
        })?;
        self.invalidate_taxonomy_cache();
        Ok(())
    }

    /// Delete a custom skill (creator only).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown or bundled skills,
    /// [`StoreError::PermissionDenied`] for non-creators.
    pub fn delete_custom_skill(
        &self,
        domain_id: &str,
        skill_id: &str,
        requester_pubkey: &str,
        audit_ctx: &AuditContext,
    ) -> Result<()> {
        let event = CommitEvent {
            action: audit_ctx.action.clone(),
            pubkeys: vec![requester_pubkey.to_string()],
        };
        self.write(event, |tx| {
            let created_by: Option<String> = tx
                .query_row(
                    "SELECT created_by FROM custom_skills WHERE domain_id = ?1 AND id = ?2",
                    params![domain_id, skill_id],
                    |row| row.get(0),
                )
                .optional()?;
            let created_by = created_by.ok_or_else(|| StoreError::NotFound {
                kind: "custom skill",
                id: format!("{domain_id}/{skill_id}"),
            })?;
            if created_by != requester_pubkey {
                return Err(StoreError::PermissionDenied(
                    "only the creator can delete this skill".into(),
                ));
            }
            tx.execute(
                "DELETE FROM custom_skills WHERE domain_id = ?1 AND id = ?2",
                params![domain_id, skill_id],
            )?;
            audit::insert_audit_row(tx, audit_ctx, "accepted")?;
            Ok(())
        })?;
        self.invalidate_taxonomy_cache();
        Ok(())
    }
}
