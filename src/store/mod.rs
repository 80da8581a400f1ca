//! Storage for execution records.
//!
//! The store is the source of truth for idempotency. Its one hard rule:
//! at most one record per idempotency key.

pub mod db;

pub use db::{DbHandle, GateDb};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use crate::execution::ExecutionRecord;

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Returns `false`, without writing, when a record with the same
    /// idempotency key already exists.
    async fn insert(&self, record: &ExecutionRecord) -> Result<bool>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<ExecutionRecord>>;

    /// Re-read the record with `id` and confirm it is retrievable.
    async fn verify(&self, id: &str) -> Result<bool>;

    /// All records for a directive, oldest first.
    async fn list_for_directive(&self, directive_id: &str) -> Result<Vec<ExecutionRecord>>;
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_records<R>(&self, f: impl FnOnce(&mut Vec<ExecutionRecord>) -> R) -> Result<R> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("Result store lock poisoned: {}", e))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn insert(&self, record: &ExecutionRecord) -> Result<bool> {
        self.with_records(|records| {
            if records
                .iter()
                .any(|r| r.idempotency_key == record.idempotency_key)
            {
                return false;
            }
            records.push(record.clone());
            true
        })
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<ExecutionRecord>> {
        self.with_records(|records| records.iter().find(|r| r.idempotency_key == key).cloned())
    }

    async fn verify(&self, id: &str) -> Result<bool> {
        self.with_records(|records| records.iter().any(|r| r.id == id))
    }

    async fn list_for_directive(&self, directive_id: &str) -> Result<Vec<ExecutionRecord>> {
        self.with_records(|records| {
            records
                .iter()
                .filter(|r| r.directive_id == directive_id)
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use crate::execution::ExecutionRecord;
    use crate::phase::Phase;
    use crate::verdict::{Severity, Verdict};

    pub fn record(id: &str, key: &str, code: &str, verdict: Verdict) -> ExecutionRecord {
        ExecutionRecord {
            id: id.to_string(),
            directive_id: "SD-1".to_string(),
            capability_code: code.to_string(),
            phase: Phase::ExecImpl,
            session_id: None,
            verdict,
            confidence: 80,
            severity: Severity::High,
            issues: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
            analysis: String::new(),
            duration_ms: 12,
            idempotency_key: key.to_string(),
            metadata: serde_json::json!({ "idempotency_key": key }),
            synthesized: false,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;
    use crate::verdict::Verdict;

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_key() {
        let store = MemoryResultStore::new();
        assert!(store.insert(&record("a", "idem_1", "DATABASE", Verdict::Pass)).await.unwrap());
        assert!(!store.insert(&record("b", "idem_1", "DATABASE", Verdict::Fail)).await.unwrap());
        assert_eq!(store.len(), 1);

        let found = store.find_by_idempotency_key("idem_1").await.unwrap().unwrap();
        assert_eq!(found.id, "a");
        assert_eq!(found.verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_memory_store_verify_and_list() {
        let store = MemoryResultStore::new();
        store.insert(&record("a", "idem_1", "DATABASE", Verdict::Pass)).await.unwrap();
        store.insert(&record("b", "idem_2", "SECURITY", Verdict::Pass)).await.unwrap();

        assert!(store.verify("a").await.unwrap());
        assert!(!store.verify("zzz").await.unwrap());
        assert_eq!(store.list_for_directive("SD-1").await.unwrap().len(), 2);
        assert!(store.list_for_directive("SD-2").await.unwrap().is_empty());
        assert!(store.find_by_idempotency_key("idem_9").await.unwrap().is_none());
    }
}
