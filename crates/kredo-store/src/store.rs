//! Store core: connection management, transactions, commit hooks.
//!
//! All persistent state is owned by [`KredoStore`]. Every document insert
//! runs (a) uniqueness/state-machine checks, (b) the row insert, and
//! (c) the audit row insert inside one transaction; other components only
//! see committed state. On commit, registered hooks are notified with the
//! pubkeys the write touched so derived caches can invalidate.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Maximum write attempts before surfacing a busy database as an error.
const WRITE_ATTEMPTS: u32 = 3;

/// Linear backoff step between write attempts.
const WRITE_BACKOFF: Duration = Duration::from_millis(50);

/// Maximum page size for any listing operation.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// A write commit notification: which action ran and which pubkeys it
/// touched. Used to invalidate trust-analysis cache entries.
#[derive(Clone, Debug)]
pub struct CommitEvent {
    /// The audit action name of the write.
    pub action: String,
    /// Pubkeys whose derived views are affected.
    pub pubkeys: Vec<String>,
}

/// Callback invoked after every committed write.
pub type CommitHook = Box<dyn Fn(&CommitEvent) + Send + Sync>;

/// Pagination window. Limits are clamped to [`MAX_PAGE_LIMIT`].
#[derive(Clone, Copy, Debug)]
pub struct Page {
    /// Maximum rows to return.
    pub limit: u32,
    /// Rows to skip.
    pub offset: u32,
}

impl Page {
    /// Build a page from raw query parameters, clamping the limit.
    #[must_use]
    pub fn clamped(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Evidence quality scores stored with an attestation at accept time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScores {
    /// Context detail score.
    pub specificity: f64,
    /// Artifact verifiability score.
    pub verifiability: f64,
    /// Skill-echo relevance score.
    pub relevance: f64,
    /// Interaction recency score.
    pub recency: f64,
    /// Weighted composite.
    pub composite: f64,
}

/// Request context recorded with every write's audit row.
#[derive(Clone, Debug, Default)]
pub struct AuditContext {
    /// Audit action name, e.g. `attestation.submit`.
    pub action: String,
    /// The pubkey performing the write, when known.
    pub actor_pubkey: Option<String>,
    /// Source IP of the request.
    pub source_ip: Option<String>,
    /// User-Agent header of the request.
    pub user_agent: Option<String>,
    /// Extra structured context.
    pub details: Option<Value>,
}

impl AuditContext {
    /// Build a context for a named action.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Attach the acting pubkey.
    #[must_use]
    pub fn actor(mut self, pubkey: impl Into<String>) -> Self {
        self.actor_pubkey = Some(pubkey.into());
        self
    }

    /// Attach request source metadata.
    #[must_use]
    pub fn source(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.source_ip = ip;
        self.user_agent = user_agent;
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// SQLite-backed store for all Kredo state.
///
/// Cheap to clone; clones share one connection and hook set.
#[derive(Clone)]
pub struct KredoStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) hooks: Arc<RwLock<Vec<CommitHook>>>,
    // Copy-on-write taxonomy snapshot; None until first read and after
    // any taxonomy mutation.
    pub(crate) taxonomy_cache: Arc<RwLock<Option<Arc<crate::taxonomy::TaxonomySnapshot>>>>,
}

impl std::fmt::Debug for KredoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KredoStore").finish_non_exhaustive()
    }
}

impl KredoStore {
    /// Open (or create) the store at the given path and apply pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file cannot be opened or a
    /// migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::InvalidInput(format!("cannot create {parent:?}: {e}")))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Used by tests and ephemeral deployments.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if a migration fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(250))?;
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hooks: Arc::new(RwLock::new(Vec::new())),
            taxonomy_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Register a hook invoked after every committed write.
    pub fn on_commit(&self, hook: CommitHook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub(crate) fn notify(&self, event: &CommitEvent) {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook(event);
        }
    }

    /// Run an operation against the shared connection outside the
    /// write/retry/notify path (reads, plus standalone audit appends that
    /// have no state change to couple to).
    pub(crate) fn read<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        op(&conn)
    }

    /// Run a write operation in a transaction, retrying on a busy
    /// database up to [`WRITE_ATTEMPTS`] times with linear backoff, then
    /// notifying commit hooks.
    pub(crate) fn write<T>(
        &self,
        event: CommitEvent,
        mut op: impl FnMut(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        let value = loop {
            attempt += 1;
            let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let result: Result<T> = (|| {
                let tx = conn.transaction()?;
                let value = op(&tx)?;
                tx.commit()?;
                Ok(value)
            })();
            match result {
                Ok(value) => break value,
                Err(StoreError::Database(e)) if is_busy(&e) && attempt < WRITE_ATTEMPTS => {
                    drop(conn);
                    tracing::warn!(attempt, "database busy, retrying write");
                    std::thread::sleep(WRITE_BACKOFF * attempt);
                }
                Err(e) => return Err(e),
            }
        };
        self.notify(&event);
        Ok(value)
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Current UTC timestamp in the stored text form.
pub(crate) fn now_str() -> String {
    kredo_protocol::time::format(kredo_protocol::time::now())
}

/// Format a timestamp in the stored text form.
pub(crate) fn ts_str(t: DateTime<Utc>) -> String {
    kredo_protocol::time::format(t)
}
