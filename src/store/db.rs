use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::ResultStore;
use crate::directive::{Directive, DirectiveRepository};
use crate::execution::ExecutionRecord;
use crate::phase::Phase;
use crate::selection::{IssuePattern, PatternSource};
use crate::verdict::{Severity, Verdict};

/// Async-safe handle to the gate database.
///
/// Wraps `GateDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<GateDb>>,
}

impl DbHandle {
    pub fn new(db: GateDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(GateDb::new(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(GateDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&GateDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct GateDb {
    conn: Connection,
}

const RECORD_COLUMNS: &str = "id, directive_id, capability_code, phase, session_id, verdict, \
     confidence, severity, issues, warnings, recommendations, analysis, duration_ms, \
     idempotency_key, metadata, synthesized, created_at";

impl GateDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS directives (
                    uuid TEXT PRIMARY KEY,
                    id TEXT NOT NULL UNIQUE,
                    legacy_id TEXT,
                    key TEXT,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS execution_results (
                    id TEXT PRIMARY KEY,
                    directive_id TEXT NOT NULL,
                    capability_code TEXT NOT NULL,
                    phase TEXT NOT NULL,
                    session_id TEXT,
                    verdict TEXT NOT NULL,
                    confidence INTEGER NOT NULL,
                    severity TEXT NOT NULL,
                    issues TEXT NOT NULL DEFAULT '[]',
                    warnings TEXT NOT NULL DEFAULT '[]',
                    recommendations TEXT NOT NULL DEFAULT '[]',
                    analysis TEXT NOT NULL DEFAULT '',
                    duration_ms INTEGER NOT NULL DEFAULT 0,
                    idempotency_key TEXT NOT NULL UNIQUE,
                    metadata TEXT NOT NULL DEFAULT '{}',
                    synthesized INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS issue_patterns (
                    pattern_id TEXT PRIMARY KEY,
                    body TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_directives_legacy ON directives(legacy_id);
                CREATE INDEX IF NOT EXISTS idx_directives_key ON directives(key);
                CREATE INDEX IF NOT EXISTS idx_results_directive ON execution_results(directive_id, created_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Directives ────────────────────────────────────────────────────

    /// Insert or replace a directive, keyed by uuid. A different directive
    /// holding the same id is replaced.
    pub fn upsert_directive(&self, directive: &Directive) -> Result<()> {
        let body = serde_json::to_string(directive).context("Failed to serialize directive")?;
        self.conn
            .execute(
                "DELETE FROM directives WHERE id = ?1 AND uuid != ?2",
                params![directive.id, directive.uuid],
            )
            .context("Failed to clear stale directive")?;
        self.conn
            .execute(
                "INSERT INTO directives (uuid, id, legacy_id, key, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                 ON CONFLICT(uuid) DO UPDATE SET
                    id = excluded.id,
                    legacy_id = excluded.legacy_id,
                    key = excluded.key,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![
                    directive.uuid,
                    directive.id,
                    directive.legacy_id,
                    directive.key,
                    body
                ],
            )
            .with_context(|| format!("Failed to upsert directive {}", directive.id))?;
        Ok(())
    }

    pub fn find_directive(&self, column: DirectiveColumn, value: &str) -> Result<Option<Directive>> {
        let sql = format!("SELECT body FROM directives WHERE {} = ?1 LIMIT 1", column.as_str());
        let body: Option<String> = self
            .conn
            .query_row(&sql, params![value], |row| row.get(0))
            .optional()
            .context("Failed to query directive")?;
        body.map(|b| serde_json::from_str(&b).context("Failed to parse stored directive"))
            .transpose()
    }

    pub fn list_directives(&self) -> Result<Vec<Directive>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM directives ORDER BY id")
            .context("Failed to prepare list_directives")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query directives")?;
        let mut directives = Vec::new();
        for row in rows {
            let body = row.context("Failed to read directive row")?;
            directives.push(serde_json::from_str(&body).context("Failed to parse stored directive")?);
        }
        Ok(directives)
    }

    // ── Execution results ─────────────────────────────────────────────

    /// Returns `false` when the idempotency key is already taken.
    pub fn insert_record(&self, record: &ExecutionRecord) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO execution_results ({}) VALUES
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    RECORD_COLUMNS
                ),
                params![
                    record.id,
                    record.directive_id,
                    record.capability_code,
                    record.phase.as_str(),
                    record.session_id,
                    record.verdict.as_str(),
                    record.confidence as i64,
                    record.severity.as_str(),
                    serde_json::to_string(&record.issues)?,
                    serde_json::to_string(&record.warnings)?,
                    serde_json::to_string(&record.recommendations)?,
                    record.analysis,
                    record.duration_ms as i64,
                    record.idempotency_key,
                    serde_json::to_string(&record.metadata)?,
                    record.synthesized,
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to insert result for {}", record.capability_code))?;
        Ok(changed == 1)
    }

    pub fn find_record_by_key(&self, key: &str) -> Result<Option<ExecutionRecord>> {
        self.query_one_record("idempotency_key", key)
    }

    pub fn find_record(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        self.query_one_record("id", id)
    }

    fn query_one_record(&self, column: &str, value: &str) -> Result<Option<ExecutionRecord>> {
        let sql = format!(
            "SELECT {} FROM execution_results WHERE {} = ?1",
            RECORD_COLUMNS, column
        );
        let row = self
            .conn
            .query_row(&sql, params![value], RecordRow::from_row)
            .optional()
            .context("Failed to query execution result")?;
        row.map(RecordRow::into_record).transpose()
    }

    pub fn list_records_for_directive(&self, directive_id: &str) -> Result<Vec<ExecutionRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM execution_results WHERE directive_id = ?1 ORDER BY created_at, rowid",
                RECORD_COLUMNS
            ))
            .context("Failed to prepare list_records_for_directive")?;
        let rows = stmt
            .query_map(params![directive_id], RecordRow::from_row)
            .context("Failed to query execution results")?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read result row")?.into_record()?);
        }
        Ok(records)
    }

    // ── Issue patterns ────────────────────────────────────────────────

    pub fn upsert_pattern(&self, pattern: &IssuePattern) -> Result<()> {
        let body = serde_json::to_string(pattern).context("Failed to serialize pattern")?;
        self.conn
            .execute(
                "INSERT INTO issue_patterns (pattern_id, body) VALUES (?1, ?2)
                 ON CONFLICT(pattern_id) DO UPDATE SET body = excluded.body",
                params![pattern.pattern_id, body],
            )
            .context("Failed to upsert issue pattern")?;
        Ok(())
    }

    pub fn list_patterns(&self) -> Result<Vec<IssuePattern>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM issue_patterns ORDER BY pattern_id")
            .context("Failed to prepare list_patterns")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query issue patterns")?;
        let mut patterns = Vec::new();
        for row in rows {
            let body = row.context("Failed to read pattern row")?;
            patterns.push(serde_json::from_str(&body).context("Failed to parse stored pattern")?);
        }
        Ok(patterns)
    }
}

/// Columns a directive can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveColumn {
    Uuid,
    Id,
    LegacyId,
    Key,
}

impl DirectiveColumn {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Id => "id",
            Self::LegacyId => "legacy_id",
            Self::Key => "key",
        }
    }
}

/// Intermediate row struct for execution_results.
struct RecordRow {
    id: String,
    directive_id: String,
    capability_code: String,
    phase: String,
    session_id: Option<String>,
    verdict: String,
    confidence: i64,
    severity: String,
    issues: String,
    warnings: String,
    recommendations: String,
    analysis: String,
    duration_ms: i64,
    idempotency_key: String,
    metadata: String,
    synthesized: bool,
    created_at: String,
}

impl RecordRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            directive_id: row.get(1)?,
            capability_code: row.get(2)?,
            phase: row.get(3)?,
            session_id: row.get(4)?,
            verdict: row.get(5)?,
            confidence: row.get(6)?,
            severity: row.get(7)?,
            issues: row.get(8)?,
            warnings: row.get(9)?,
            recommendations: row.get(10)?,
            analysis: row.get(11)?,
            duration_ms: row.get(12)?,
            idempotency_key: row.get(13)?,
            metadata: row.get(14)?,
            synthesized: row.get(15)?,
            created_at: row.get(16)?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord> {
        let phase = Phase::from_str(&self.phase)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse stored phase")?;
        let verdict = Verdict::parse_lenient(&self.verdict)
            .with_context(|| format!("Unknown stored verdict '{}'", self.verdict))?;
        let severity = Severity::parse_lenient(&self.severity)
            .with_context(|| format!("Unknown stored severity '{}'", self.severity))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .context("Failed to parse stored timestamp")?
            .with_timezone(&Utc);

        Ok(ExecutionRecord {
            id: self.id,
            directive_id: self.directive_id,
            capability_code: self.capability_code,
            phase,
            session_id: self.session_id,
            verdict,
            confidence: self.confidence.clamp(0, 100) as u8,
            severity,
            issues: serde_json::from_str(&self.issues).context("Failed to parse stored issues")?,
            warnings: serde_json::from_str(&self.warnings)
                .context("Failed to parse stored warnings")?,
            recommendations: serde_json::from_str(&self.recommendations)
                .context("Failed to parse stored recommendations")?,
            analysis: self.analysis,
            duration_ms: self.duration_ms.max(0) as u64,
            idempotency_key: self.idempotency_key,
            metadata: serde_json::from_str(&self.metadata)
                .context("Failed to parse stored metadata")?,
            synthesized: self.synthesized,
            created_at,
        })
    }
}

// ── Trait implementations ─────────────────────────────────────────────

#[async_trait]
impl ResultStore for DbHandle {
    async fn insert(&self, record: &ExecutionRecord) -> Result<bool> {
        let record = record.clone();
        self.call(move |db| db.insert_record(&record)).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<ExecutionRecord>> {
        let key = key.to_string();
        self.call(move |db| db.find_record_by_key(&key)).await
    }

    async fn verify(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.call(move |db| Ok(db.find_record(&id)?.is_some())).await
    }

    async fn list_for_directive(&self, directive_id: &str) -> Result<Vec<ExecutionRecord>> {
        let directive_id = directive_id.to_string();
        self.call(move |db| db.list_records_for_directive(&directive_id))
            .await
    }
}

impl DbHandle {
    async fn find_directive(&self, column: DirectiveColumn, value: &str) -> Result<Option<Directive>> {
        let value = value.to_string();
        self.call(move |db| db.find_directive(column, &value)).await
    }
}

#[async_trait]
impl DirectiveRepository for DbHandle {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Directive>> {
        self.find_directive(DirectiveColumn::Uuid, uuid).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Directive>> {
        self.find_directive(DirectiveColumn::Id, id).await
    }

    async fn find_by_legacy_id(&self, legacy_id: &str) -> Result<Option<Directive>> {
        self.find_directive(DirectiveColumn::LegacyId, legacy_id).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<Directive>> {
        self.find_directive(DirectiveColumn::Key, key).await
    }
}

#[async_trait]
impl PatternSource for DbHandle {
    async fn load_patterns(&self) -> Result<Vec<IssuePattern>> {
        self.call(|db| db.list_patterns()).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
