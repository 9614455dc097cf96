//! Completion ledger: the resolved result of each finished process instance.
//!
//! Process engines may deliver a terminal event more than once. The first
//! resolution is stored keyed by process instance id and every later delivery
//! is answered from the ledger. Each record keeps a fingerprint of the event
//! it was resolved from, so a redelivery carrying a different payload can be
//! told apart from a plain duplicate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::delta::ObjectDelta;
use crate::error::{Result, WorkflowError};
use crate::ids::{JobId, ProcessInstanceId, TenantId};
use crate::process::{ApprovalMetadata, ProcessEvent};
use crate::types::{ApprovalOutcome, WrapperKind};

/// Stored resolution of one process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub process_instance_id: ProcessInstanceId,
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub wrapper_kind: WrapperKind,
    pub answer: ApprovalOutcome,
    /// Deltas released to the orchestration engine.
    pub deltas_out: Vec<ObjectDelta>,
    pub metadata: ApprovalMetadata,
    /// Fingerprint of the event the record was resolved from.
    pub fingerprint: String,
    pub completed_at: DateTime<Utc>,
}

/// Storage of completion records.
#[async_trait]
pub trait CompletionLedger: Send + Sync {
    async fn get(&self, process_instance_id: ProcessInstanceId)
        -> Result<Option<CompletionRecord>>;

    /// Store `record` unless the instance already has one.
    ///
    /// Returns the record now stored for the instance and whether it is the
    /// one just passed in.
    async fn record_if_absent(&self, record: CompletionRecord) -> Result<(CompletionRecord, bool)>;
}

/// In-memory ledger for testing.
#[derive(Debug, Default)]
pub struct InMemoryCompletionLedger {
    records: Arc<RwLock<HashMap<ProcessInstanceId, CompletionRecord>>>,
}

impl InMemoryCompletionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl CompletionLedger for InMemoryCompletionLedger {
    async fn get(
        &self,
        process_instance_id: ProcessInstanceId,
    ) -> Result<Option<CompletionRecord>> {
        Ok(self.records.read().await.get(&process_instance_id).cloned())
    }

    async fn record_if_absent(&self, record: CompletionRecord) -> Result<(CompletionRecord, bool)> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&record.process_instance_id) {
            return Ok((existing.clone(), false));
        }
        records.insert(record.process_instance_id, record.clone());
        Ok((record, true))
    }
}

/// SHA-256 over the canonical JSON of an event's outcome-bearing content
/// (answer, running flag and variables), hex encoded.
pub fn event_fingerprint(event: &ProcessEvent) -> Result<String> {
    let payload = serde_json::json!({
        "processInstanceId": event.process_instance_id,
        "answer": event.answer,
        "running": event.running,
        "variables": event.variables,
    });
    let canonical = serde_json::to_string(&sort_json_keys(&payload)).map_err(|e| {
        WorkflowError::Serialization {
            message: e.to_string(),
        }
    })?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn sort_json_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_json_keys(v)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.iter().map(sort_json_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::vars;
    use serde_json::json;

    fn record(process_instance_id: ProcessInstanceId, fingerprint: &str) -> CompletionRecord {
        CompletionRecord {
            process_instance_id,
            job_id: JobId::new(),
            tenant_id: TenantId::new(),
            wrapper_kind: WrapperKind::AddRole,
            answer: ApprovalOutcome::Approved,
            deltas_out: Vec::new(),
            metadata: ApprovalMetadata::default(),
            fingerprint: fingerprint.to_string(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let id = ProcessInstanceId::new();
        let a = ProcessEvent::finished(id, "ItemApproval", ApprovalOutcome::Approved)
            .with_variable(vars::COMMENT, json!("ok"))
            .with_variable(vars::DECISIONS, json!([{ "b": 1, "a": 2 }]));
        let b = ProcessEvent::finished(id, "ItemApproval", ApprovalOutcome::Approved)
            .with_variable(vars::DECISIONS, json!([{ "a": 2, "b": 1 }]))
            .with_variable(vars::COMMENT, json!("ok"));

        let fingerprint = event_fingerprint(&a).unwrap();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, event_fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_differs_on_answer() {
        let id = ProcessInstanceId::new();
        let approved = ProcessEvent::finished(id, "ItemApproval", ApprovalOutcome::Approved);
        let rejected = ProcessEvent::finished(id, "ItemApproval", ApprovalOutcome::Rejected);
        assert_ne!(
            event_fingerprint(&approved).unwrap(),
            event_fingerprint(&rejected).unwrap()
        );
    }

    #[tokio::test]
    async fn test_first_record_wins() {
        let ledger = InMemoryCompletionLedger::new();
        let id = ProcessInstanceId::new();

        let (stored, inserted) = ledger.record_if_absent(record(id, "first")).await.unwrap();
        assert!(inserted);
        assert_eq!(stored.fingerprint, "first");

        let (stored, inserted) = ledger.record_if_absent(record(id, "second")).await.unwrap();
        assert!(!inserted);
        assert_eq!(stored.fingerprint, "first");
        assert_eq!(ledger.count().await, 1);

        assert_eq!(
            ledger.get(id).await.unwrap().map(|r| r.fingerprint),
            Some("first".to_string())
        );
        assert!(ledger.get(ProcessInstanceId::new()).await.unwrap().is_none());
    }
}
