//! Audit trail of approval processes.
//!
//! Every started process and every resolution is recorded, including
//! redelivered completion events that were answered from the ledger.
//!
//! # Example
//!
//! ```rust,ignore
//! use xavyo_workflow::audit::{
//!     AuditStore, InMemoryAuditStore, WorkflowAuditAction, WorkflowAuditEventInput,
//! };
//! use xavyo_workflow::ids::TenantId;
//!
//! let store = InMemoryAuditStore::new();
//! let input = WorkflowAuditEventInput {
//!     tenant_id: TenantId::new(),
//!     action: WorkflowAuditAction::ProcessStarted,
//!     ..Default::default()
//! };
//! let event = store.log_event(input).await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::ids::{JobId, ProcessInstanceId, TenantId};
use crate::object::ObjectRef;
use crate::types::WrapperKind;

/// What happened to an approval process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAuditAction {
    /// A process was started for an extracted delta.
    #[default]
    ProcessStarted,
    /// The process finished with approval.
    Approved,
    /// The process finished with rejection.
    Rejected,
    /// A completion event arrived again and was answered from the ledger.
    RedeliveryIgnored,
}

impl std::fmt::Display for WorkflowAuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessStarted => write!(f, "process_started"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::RedeliveryIgnored => write!(f, "redelivery_ignored"),
        }
    }
}

/// An audit event for an approval process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAuditEvent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub process_instance_id: Option<ProcessInstanceId>,
    pub job_id: Option<JobId>,
    pub wrapper_kind: Option<WrapperKind>,
    pub action: WorkflowAuditAction,
    /// Requester for starts, approvers for approvals.
    pub actors: Vec<ObjectRef>,
    /// Deltas sent for approval or released (JSON).
    pub deltas: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Input for creating an audit event.
#[derive(Debug, Clone, Default)]
pub struct WorkflowAuditEventInput {
    pub tenant_id: TenantId,
    pub process_instance_id: Option<ProcessInstanceId>,
    pub job_id: Option<JobId>,
    pub wrapper_kind: Option<WrapperKind>,
    pub action: WorkflowAuditAction,
    pub actors: Vec<ObjectRef>,
    pub deltas: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditEventFilter {
    pub process_instance_id: Option<ProcessInstanceId>,
    pub wrapper_kind: Option<WrapperKind>,
    pub action: Option<WorkflowAuditAction>,
    /// Events in which this principal acted.
    pub actor: Option<ObjectRef>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of results to skip.
    pub offset: Option<usize>,
}

/// Trait for audit event storage backends.
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    async fn log_event(&self, input: WorkflowAuditEventInput) -> Result<WorkflowAuditEvent>;

    /// Events of a tenant matching `filter`, most recent first.
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: AuditEventFilter,
    ) -> Result<Vec<WorkflowAuditEvent>>;

    async fn get_event(&self, tenant_id: TenantId, event_id: Uuid)
        -> Result<Option<WorkflowAuditEvent>>;
}

/// In-memory audit store for testing.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    events: Arc<RwLock<Vec<WorkflowAuditEvent>>>,
}

impl InMemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clear all events (for testing).
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn log_event(&self, input: WorkflowAuditEventInput) -> Result<WorkflowAuditEvent> {
        let event = WorkflowAuditEvent {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            process_instance_id: input.process_instance_id,
            job_id: input.job_id,
            wrapper_kind: input.wrapper_kind,
            action: input.action,
            actors: input.actors,
            deltas: input.deltas,
            timestamp: Utc::now(),
            metadata: input.metadata,
        };

        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: AuditEventFilter,
    ) -> Result<Vec<WorkflowAuditEvent>> {
        let events = self.events.read().await;
        // Newest insertions first so equal timestamps keep that order.
        let mut results: Vec<_> = events
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| {
                filter
                    .process_instance_id
                    .is_none_or(|id| e.process_instance_id == Some(id))
            })
            .filter(|e| filter.wrapper_kind.is_none_or(|k| e.wrapper_kind == Some(k)))
            .filter(|e| filter.action.is_none_or(|a| e.action == a))
            .filter(|e| filter.actor.as_ref().is_none_or(|a| e.actors.contains(a)))
            .filter(|e| filter.from_date.is_none_or(|d| e.timestamp >= d))
            .filter(|e| filter.to_date.is_none_or(|d| e.timestamp <= d))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);

        Ok(results.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_event(
        &self,
        tenant_id: TenantId,
        event_id: Uuid,
    ) -> Result<Option<WorkflowAuditEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .find(|e| e.id == event_id && e.tenant_id == tenant_id)
            .cloned())
    }
}
