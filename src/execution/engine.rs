//! The execution engine: one executor call per capability per idempotency
//! window, with every record persisted and verified before it counts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::try_join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::executor::{CapabilityExecutor, DEFAULT_MAX_CONTEXT_CHARS, ExecutionContext};
use super::idempotency::{Clock, DEFAULT_WINDOW, SystemClock, idempotency_key};
use super::normalize::normalize_response;
use super::record::{ExecutionOutcome, ExecutionRecord};
use crate::catalog::{CapabilityCatalog, CapabilityDefinition};
use crate::directive::Directive;
use crate::errors::{GateError, GateResult};
use crate::phase::Phase;
use crate::selection::RequirementSet;
use crate::store::ResultStore;
use crate::verdict::{Issue, Severity, Verdict};

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Per-capability bound on executor time.
    pub timeout: Duration,
    /// Width of the idempotency time bucket.
    pub window: Duration,
    pub parallel: bool,
    pub max_context_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            window: DEFAULT_WINDOW,
            parallel: false,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

type KeyLocks = DashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Holds one caller's share of a keyed lock and drops the map entry on the
/// way out, including when the owning future is cancelled.
struct KeyLockLease<'a> {
    locks: &'a KeyLocks,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> KeyLockLease<'a> {
    fn acquire(locks: &'a KeyLocks, key: &str) -> Self {
        let lock = locks.entry(key.to_string()).or_default().clone();
        Self {
            locks,
            key: key.to_string(),
            lock,
        }
    }
}

impl Drop for KeyLockLease<'_> {
    fn drop(&mut self) {
        // Map entry plus this lease: nobody else is waiting on the key.
        self.locks
            .remove_if(&self.key, |_, held| Arc::strong_count(held) <= 2);
    }
}

pub struct ExecutionEngine {
    executor: Arc<dyn CapabilityExecutor>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyLocks>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<dyn CapabilityExecutor>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            executor,
            store,
            clock: Arc::new(SystemClock),
            locks: Arc::new(DashMap::new()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Run every required capability and return one outcome per capability,
    /// ordered by priority (highest first) then code.
    ///
    /// Executor failures never escape; storage failures abort the run.
    pub async fn run(
        &self,
        requirements: &RequirementSet,
        catalog: &CapabilityCatalog,
        directive: &Directive,
        phase: Phase,
        session_id: Option<&str>,
    ) -> GateResult<Vec<ExecutionOutcome>> {
        let mut planned: Vec<(CapabilityDefinition, Vec<String>)> = requirements
            .iter()
            .map(|entry| {
                let definition = catalog.get(&entry.code).cloned().unwrap_or_else(|| {
                    tracing::warn!(capability = %entry.code, "required capability missing from catalog");
                    CapabilityDefinition::new(entry.code.clone(), entry.code.clone(), 0)
                });
                (definition, entry.reasons.clone())
            })
            .collect();
        planned.sort_by(|(a, _), (b, _)| b.priority.cmp(&a.priority).then_with(|| a.code.cmp(&b.code)));

        tracing::info!(
            directive = %directive.id,
            phase = %phase,
            capabilities = planned.len(),
            parallel = self.config.parallel,
            "executing capabilities"
        );

        if self.config.parallel {
            try_join_all(
                planned
                    .iter()
                    .map(|(def, reasons)| self.execute_one(def, reasons, directive, phase, session_id)),
            )
            .await
        } else {
            let mut outcomes = Vec::with_capacity(planned.len());
            for (def, reasons) in &planned {
                outcomes.push(
                    self.execute_one(def, reasons, directive, phase, session_id)
                        .await?,
                );
            }
            Ok(outcomes)
        }
    }

    /// Execute a single capability under its idempotency lock.
    pub async fn execute_one(
        &self,
        definition: &CapabilityDefinition,
        reasons: &[String],
        directive: &Directive,
        phase: Phase,
        session_id: Option<&str>,
    ) -> GateResult<ExecutionOutcome> {
        let now = self.clock.now();
        let key = idempotency_key(
            &directive.id,
            &definition.code,
            session_id,
            Some(phase),
            now,
            self.config.window,
        );

        let lease = KeyLockLease::acquire(&self.locks, &key);
        let _guard = lease.lock.lock().await;
        self.execute_locked(&key, now, definition, reasons, directive, phase, session_id)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_locked(
        &self,
        key: &str,
        now: DateTime<Utc>,
        definition: &CapabilityDefinition,
        reasons: &[String],
        directive: &Directive,
        phase: Phase,
        session_id: Option<&str>,
    ) -> GateResult<ExecutionOutcome> {
        let code = definition.code.as_str();

        if let Some(existing) = self.lookup(key).await? {
            tracing::debug!(capability = code, key, "reusing result from current window");
            return Ok(ExecutionOutcome {
                record: existing,
                reused: true,
            });
        }

        let context = ExecutionContext::new(
            definition,
            directive,
            phase,
            session_id,
            reasons,
            self.config.max_context_chars,
        );
        let started = Instant::now();
        let response = tokio::time::timeout(
            self.config.timeout,
            self.executor.execute(code, &directive.id, &context),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let draft = RecordDraft {
            key,
            now,
            definition,
            reasons,
            directive,
            phase,
            session_id,
        };
        let record = match response {
            Ok(Ok(value)) => draft.completed(&value, elapsed_ms),
            Ok(Err(e)) => {
                tracing::warn!(capability = code, error = %e, "capability failed; recording FAIL");
                draft.synthesized(format!("Capability {} failed: {:#}", code, e), false, elapsed_ms)
            }
            Err(_) => {
                tracing::warn!(
                    capability = code,
                    timeout_secs = self.config.timeout.as_secs(),
                    "capability timed out; recording FAIL"
                );
                draft.synthesized(
                    format!(
                        "Capability {} timed out after {}s",
                        code,
                        self.config.timeout.as_secs()
                    ),
                    true,
                    elapsed_ms,
                )
            }
        };

        match self.store.insert(&record).await {
            Ok(true) => {}
            Ok(false) => {
                // Another writer took the key between lookup and insert.
                return match self.lookup(key).await? {
                    Some(existing) => Ok(ExecutionOutcome {
                        record: existing,
                        reused: true,
                    }),
                    None => Err(GateError::PersistFailed {
                        code: code.to_string(),
                        source: anyhow::anyhow!("key {} rejected as duplicate but not found", key),
                    }),
                };
            }
            Err(source) => {
                tracing::error!(capability = code, key, error = %source, "failed to persist result");
                return Err(GateError::PersistFailed {
                    code: code.to_string(),
                    source,
                });
            }
        }

        self.verify(&record).await?;
        tracing::debug!(
            capability = code,
            key,
            verdict = %record.verdict,
            confidence = record.confidence,
            "result recorded"
        );
        Ok(ExecutionOutcome {
            record,
            reused: false,
        })
    }

    async fn lookup(&self, key: &str) -> GateResult<Option<ExecutionRecord>> {
        self.store
            .find_by_idempotency_key(key)
            .await
            .map_err(|source| {
                tracing::error!(key, error = %source, "result lookup failed");
                GateError::StoreLookup {
                    key: key.to_string(),
                    source,
                }
            })
    }

    /// Re-read by key, then confirm the id. Both must agree with what was written.
    async fn verify(&self, record: &ExecutionRecord) -> GateResult<()> {
        let failed = || {
            tracing::error!(
                capability = %record.capability_code,
                id = %record.id,
                "stored result failed verification"
            );
            GateError::VerificationFailed {
                id: record.id.clone(),
                code: record.capability_code.clone(),
            }
        };

        let reread = self.lookup(&record.idempotency_key).await?;
        if reread.as_ref().map(|r| r.id.as_str()) != Some(record.id.as_str()) {
            return Err(failed());
        }
        match self.store.verify(&record.id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(failed()),
            Err(source) => Err(GateError::PersistFailed {
                code: record.capability_code.clone(),
                source,
            }),
        }
    }
}

struct RecordDraft<'a> {
    key: &'a str,
    now: DateTime<Utc>,
    definition: &'a CapabilityDefinition,
    reasons: &'a [String],
    directive: &'a Directive,
    phase: Phase,
    session_id: Option<&'a str>,
}

impl RecordDraft<'_> {
    fn completed(&self, value: &serde_json::Value, elapsed_ms: u64) -> ExecutionRecord {
        let n = normalize_response(value);
        let mut record = self.base(n.duration_ms.unwrap_or(elapsed_ms));
        record.verdict = n.verdict;
        record.confidence = n.confidence;
        record.issues = n.issues;
        record.warnings = n.warnings;
        record.recommendations = n.recommendations;
        record.analysis = n.analysis;
        record.metadata = self.metadata(serde_json::Value::Object(n.extra), false);
        record
    }

    fn synthesized(&self, message: String, timed_out: bool, elapsed_ms: u64) -> ExecutionRecord {
        let mut record = self.base(elapsed_ms);
        record.verdict = Verdict::Fail;
        record.confidence = 0;
        record.severity = Severity::Critical;
        record.issues = vec![Issue::new(Severity::Critical, message.clone()).with_category("execution")];
        record.analysis = message;
        record.synthesized = true;
        record.metadata = self.metadata(json!({}), timed_out);
        record
    }

    fn base(&self, duration_ms: u64) -> ExecutionRecord {
        ExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            directive_id: self.directive.id.clone(),
            capability_code: self.definition.code.clone(),
            phase: self.phase,
            session_id: self.session_id.map(str::to_string),
            verdict: Verdict::Warning,
            confidence: 0,
            severity: self.definition.severity(),
            issues: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
            analysis: String::new(),
            duration_ms,
            idempotency_key: self.key.to_string(),
            metadata: json!({}),
            synthesized: false,
            created_at: self.now,
        }
    }

    fn metadata(&self, extra: serde_json::Value, timed_out: bool) -> serde_json::Value {
        json!({
            "idempotency_key": self.key,
            "capability_name": self.definition.name,
            "reasons": self.reasons,
            "extra": extra,
            "timed_out": timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_capabilities;
    use crate::execution::idempotency::ManualClock;
    use crate::selection::RequirementSource;
    use crate::store::MemoryResultStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed response per call and counts calls.
    struct ScriptedExecutor {
        calls: AtomicUsize,
        respond: Box<dyn Fn(&str) -> anyhow::Result<serde_json::Value> + Send + Sync>,
        delay: Option<Duration>,
        /// Codes that answer immediately even when `delay` is set.
        fast_codes: Vec<&'static str>,
    }

    impl ScriptedExecutor {
        fn new(respond: impl Fn(&str) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                respond: Box::new(respond),
                delay: None,
                fast_codes: Vec::new(),
            }
        }

        fn passing() -> Self {
            Self::new(|_| Ok(json!({"verdict": "PASS", "confidence": 90})))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CapabilityExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            code: &str,
            _directive_id: &str,
            _context: &ExecutionContext,
        ) -> anyhow::Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay
                && !self.fast_codes.iter().any(|c| *c == code)
            {
                tokio::time::sleep(delay).await;
            }
            (self.respond)(code)
        }
    }

    /// Store whose writes succeed but whose verification can be forced to fail.
    struct FlakyStore {
        inner: MemoryResultStore,
        fail_insert: bool,
        fail_verify: bool,
    }

    #[async_trait]
    impl ResultStore for FlakyStore {
        async fn insert(&self, record: &ExecutionRecord) -> anyhow::Result<bool> {
            if self.fail_insert {
                anyhow::bail!("disk full");
            }
            self.inner.insert(record).await
        }

        async fn find_by_idempotency_key(&self, key: &str) -> anyhow::Result<Option<ExecutionRecord>> {
            self.inner.find_by_idempotency_key(key).await
        }

        async fn verify(&self, id: &str) -> anyhow::Result<bool> {
            if self.fail_verify {
                return Ok(false);
            }
            self.inner.verify(id).await
        }

        async fn list_for_directive(&self, directive_id: &str) -> anyhow::Result<Vec<ExecutionRecord>> {
            self.inner.list_for_directive(directive_id).await
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap()
    }

    fn requirements(codes: &[&str]) -> RequirementSet {
        let mut set = RequirementSet::new();
        for code in codes {
            set.add(code, RequirementSource::Mandatory, "test", None);
        }
        set
    }

    fn directive() -> Directive {
        Directive::new("SD-1", "Database Migration for User Tables")
    }

    fn engine(
        executor: Arc<ScriptedExecutor>,
        store: Arc<dyn ResultStore>,
        clock: Arc<ManualClock>,
    ) -> ExecutionEngine {
        ExecutionEngine::new(executor, store).with_clock(clock)
    }

    #[tokio::test]
    async fn test_same_window_reuses_record() {
        let executor = Arc::new(ScriptedExecutor::passing());
        let store = Arc::new(MemoryResultStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(executor.clone(), store.clone(), clock.clone());
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        let reqs = requirements(&["DATABASE"]);

        let first = engine
            .run(&reqs, &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap();
        clock.advance(Duration::from_secs(20 * 60));
        let second = engine
            .run(&reqs, &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap();

        assert_eq!(executor.calls(), 1);
        assert_eq!(store.len(), 1);
        assert!(!first[0].reused);
        assert!(second[0].reused);
        assert_eq!(first[0].record.id, second[0].record.id);
    }

    #[tokio::test]
    async fn test_next_window_executes_again() {
        let executor = Arc::new(ScriptedExecutor::passing());
        let store = Arc::new(MemoryResultStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(executor.clone(), store.clone(), clock.clone());
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        let reqs = requirements(&["DATABASE"]);

        engine.run(&reqs, &catalog, &directive(), Phase::ExecImpl, None).await.unwrap();
        clock.advance(Duration::from_secs(60 * 60));
        engine.run(&reqs, &catalog, &directive(), Phase::ExecImpl, None).await.unwrap();

        assert_eq!(executor.calls(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_session_and_phase_are_part_of_identity() {
        let executor = Arc::new(ScriptedExecutor::passing());
        let store = Arc::new(MemoryResultStore::new());
        let engine = engine(executor.clone(), store, Arc::new(ManualClock::new(start())));
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        let reqs = requirements(&["TESTING"]);

        engine.run(&reqs, &catalog, &directive(), Phase::ExecImpl, Some("a")).await.unwrap();
        engine.run(&reqs, &catalog, &directive(), Phase::ExecImpl, Some("b")).await.unwrap();
        engine.run(&reqs, &catalog, &directive(), Phase::PlanVerify, Some("a")).await.unwrap();
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn test_executor_error_becomes_critical_fail() {
        let executor = Arc::new(ScriptedExecutor::new(|code| {
            if code == "SECURITY" {
                anyhow::bail!("scanner crashed")
            }
            Ok(json!({"verdict": "PASS", "confidence": 80}))
        }));
        let store = Arc::new(MemoryResultStore::new());
        let engine = engine(executor.clone(), store, Arc::new(ManualClock::new(start())));
        let catalog = CapabilityCatalog::new(builtin_capabilities());

        let outcomes = engine
            .run(&requirements(&["SECURITY", "DOCMON"]), &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        let security = &outcomes[0].record;
        assert_eq!(security.capability_code, "SECURITY");
        assert_eq!(security.verdict, Verdict::Fail);
        assert_eq!(security.severity, Severity::Critical);
        assert!(security.synthesized);
        assert_eq!(security.issues[0].severity, Severity::Critical);
        assert!(security.issues[0].description.contains("scanner crashed"));
        assert_eq!(outcomes[1].record.verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_timeout_becomes_critical_fail() {
        let mut slow = ScriptedExecutor::passing();
        slow.delay = Some(Duration::from_secs(5));
        let executor = Arc::new(slow);
        let store = Arc::new(MemoryResultStore::new());
        let engine = engine(executor, store, Arc::new(ManualClock::new(start()))).with_config(EngineConfig {
            timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        });
        let catalog = CapabilityCatalog::new(builtin_capabilities());

        let outcomes = engine
            .run(&requirements(&["UAT"]), &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap();
        let record = &outcomes[0].record;
        assert_eq!(record.verdict, Verdict::Fail);
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.metadata["timed_out"], true);
    }

    #[tokio::test]
    async fn test_order_is_priority_then_code() {
        let executor = Arc::new(ScriptedExecutor::passing());
        let store = Arc::new(MemoryResultStore::new());
        let engine = engine(executor, store, Arc::new(ManualClock::new(start())));
        let catalog = CapabilityCatalog::new(builtin_capabilities());

        let outcomes = engine
            .run(
                &requirements(&["DOCMON", "RCA", "SECURITY", "REGRESSION"]),
                &catalog,
                &directive(),
                Phase::ExecImpl,
                None,
            )
            .await
            .unwrap();
        let codes: Vec<_> = outcomes.iter().map(|o| o.record.capability_code.as_str()).collect();
        assert_eq!(codes, vec!["SECURITY", "RCA", "REGRESSION", "DOCMON"]);
    }

    #[tokio::test]
    async fn test_record_fields_from_response() {
        let executor = Arc::new(ScriptedExecutor::new(|_| {
            Ok(json!({
                "verdict": "FAIL",
                "confidence": 70,
                "issues": [{"severity": "medium", "description": "missing down migration"}],
                "reviewer": "bot"
            }))
        }));
        let engine = engine(
            executor,
            Arc::new(MemoryResultStore::new()),
            Arc::new(ManualClock::new(start())),
        );
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        let outcomes = engine
            .run(&requirements(&["DOCMON"]), &catalog, &directive(), Phase::ExecImpl, Some("s1"))
            .await
            .unwrap();
        let record = &outcomes[0].record;

        assert_eq!(record.verdict, Verdict::Fail);
        // DOCMON priority 50 -> MEDIUM tier.
        assert_eq!(record.severity, Severity::Medium);
        assert_eq!(record.session_id.as_deref(), Some("s1"));
        assert_eq!(record.metadata["idempotency_key"], record.idempotency_key.as_str());
        assert_eq!(record.metadata["extra"]["reviewer"], "bot");
        assert_eq!(record.metadata["reasons"], json!(["test"]));
    }

    #[tokio::test]
    async fn test_verification_failure_is_fatal() {
        let store = Arc::new(FlakyStore {
            inner: MemoryResultStore::new(),
            fail_insert: false,
            fail_verify: true,
        });
        let engine = engine(
            Arc::new(ScriptedExecutor::passing()),
            store,
            Arc::new(ManualClock::new(start())),
        );
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        let err = engine
            .run(&requirements(&["DATABASE"]), &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::VerificationFailed { .. }));
    }

    #[tokio::test]
    async fn test_insert_failure_is_fatal() {
        let store = Arc::new(FlakyStore {
            inner: MemoryResultStore::new(),
            fail_insert: true,
            fail_verify: false,
        });
        let engine = engine(
            Arc::new(ScriptedExecutor::passing()),
            store,
            Arc::new(ManualClock::new(start())),
        );
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        let err = engine
            .run(&requirements(&["DATABASE"]), &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap_err();
        match err {
            GateError::PersistFailed { code, .. } => assert_eq!(code, "DATABASE"),
            other => panic!("Expected PersistFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_aborted_parallel_run_releases_key_locks() {
        let mut executor = ScriptedExecutor::passing();
        executor.delay = Some(Duration::from_secs(5));
        executor.fast_codes = vec!["SECURITY"];
        let store = Arc::new(FlakyStore {
            inner: MemoryResultStore::new(),
            fail_insert: true,
            fail_verify: false,
        });
        let engine = engine(Arc::new(executor), store, Arc::new(ManualClock::new(start())))
            .with_config(EngineConfig {
                parallel: true,
                ..EngineConfig::default()
            });
        let catalog = CapabilityCatalog::new(builtin_capabilities());

        // SECURITY fails to persist while DATABASE and TESTING are still running.
        let err = engine
            .run(
                &requirements(&["DATABASE", "SECURITY", "TESTING"]),
                &catalog,
                &directive(),
                Phase::ExecImpl,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::PersistFailed { ref code, .. } if code == "SECURITY"));
        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn test_completed_runs_leave_no_key_locks() {
        let engine = engine(
            Arc::new(ScriptedExecutor::passing()),
            Arc::new(MemoryResultStore::new()),
            Arc::new(ManualClock::new(start())),
        );
        let catalog = CapabilityCatalog::new(builtin_capabilities());
        engine
            .run(&requirements(&["DATABASE", "UAT"]), &catalog, &directive(), Phase::ExecImpl, None)
            .await
            .unwrap();
        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn test_parallel_runs_each_key_once() {
        let executor = Arc::new(ScriptedExecutor::passing());
        let store = Arc::new(MemoryResultStore::new());
        let engine = Arc::new(
            engine(executor.clone(), store.clone(), Arc::new(ManualClock::new(start()))).with_config(
                EngineConfig {
                    parallel: true,
                    ..EngineConfig::default()
                },
            ),
        );
        let catalog = Arc::new(CapabilityCatalog::new(builtin_capabilities()));
        let reqs = Arc::new(requirements(&["DATABASE", "SECURITY", "TESTING"]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (engine, catalog, reqs) = (engine.clone(), catalog.clone(), reqs.clone());
                tokio::spawn(async move {
                    engine
                        .run(&reqs, &catalog, &directive(), Phase::ExecImpl, None)
                        .await
                        .map(|o| o.len())
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 3);
        }

        assert_eq!(executor.calls(), 3);
        assert_eq!(store.len(), 3);
    }
}
