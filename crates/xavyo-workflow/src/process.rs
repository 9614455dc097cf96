//! Process-engine facing data: start instructions, jobs, completion events and
//! the variable names wrappers exchange with approval processes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::TaskHandle;
use crate::delta::ObjectDelta;
use crate::engine::ProcessVariables;
use crate::ids::{JobId, ProcessInstanceId, TaskId, TenantId};
use crate::object::ObjectRef;
use crate::types::{ApprovalOutcome, WrapperKind};

/// Names of process variables set on start and read on completion.
pub mod vars {
    /// Approval decisions: `[{approver, approved, comment, stage}]`.
    pub const DECISIONS: &str = "decisions";
    /// Deltas as edited by approvers; replaces the extracted deltas.
    pub const APPROVED_DELTAS: &str = "approvedDeltas";
    /// Deltas extracted for approval, in stored JSON form.
    pub const DELTAS_TO_APPROVE: &str = "deltasToApprove";
    /// Object the change concerns (the focus user).
    pub const OBJECT_REF: &str = "objectRef";
    /// Display name of that object at start time.
    pub const OBJECT_NAME: &str = "objectName";
    pub const REQUESTER_REF: &str = "requesterRef";
    pub const REQUESTER_COMMENT: &str = "requesterComment";
    /// Comment of the approver handling the current work item.
    pub const COMMENT: &str = "comment";
    pub const WRAPPER_KIND: &str = "wrapperKind";
    /// Assignment being approved, for role approval processes.
    pub const ASSIGNMENT: &str = "assignment";
    /// Item path being approved, for attribute approval processes.
    pub const ATTRIBUTE_PATH: &str = "attributePath";
    pub const OLD_VALUES: &str = "oldValues";
    pub const NEW_VALUES: &str = "newValues";
    /// Object proposed for creation, for user creation processes.
    pub const OBJECT_TO_ADD: &str = "objectToAdd";
}

/// How to start one approval process for one extracted sub-delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreationInstruction {
    pub wrapper_kind: WrapperKind,
    /// Process definition to start.
    pub process_name: String,
    pub process_variables: HashMap<String, Value>,
    pub deltas_to_approve: Vec<ObjectDelta>,
    /// Object the approval concerns, when it already exists.
    pub object_ref: Option<ObjectRef>,
    pub requester: ObjectRef,
    /// Name of the task tracking the process.
    pub task_name: String,
    /// Whether the process runs without further sub-processing.
    pub simple: bool,
}

impl JobCreationInstruction {
    pub fn new(
        wrapper_kind: WrapperKind,
        process_name: impl Into<String>,
        task: &TaskHandle,
        deltas_to_approve: Vec<ObjectDelta>,
    ) -> Self {
        Self {
            wrapper_kind,
            process_name: process_name.into(),
            process_variables: HashMap::new(),
            deltas_to_approve,
            object_ref: None,
            requester: task.requester.clone(),
            task_name: task.name.clone(),
            simple: true,
        }
    }

    #[must_use]
    pub fn with_object_ref(mut self, object_ref: Option<ObjectRef>) -> Self {
        self.object_ref = object_ref;
        self
    }

    #[must_use]
    pub fn with_task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_name = task_name.into();
        self
    }

    #[must_use]
    pub fn with_variable(mut self, name: &str, value: Value) -> Self {
        self.process_variables.insert(name.to_string(), value);
        self
    }
}

/// Pairing of a started process instance with the task and change it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryChangeProcessorJob {
    pub id: JobId,
    pub process_instance_id: ProcessInstanceId,
    pub task_id: TaskId,
    pub tenant_id: TenantId,
    pub wrapper_kind: WrapperKind,
    /// Deltas handed to the process for approval.
    pub deltas_in: Vec<ObjectDelta>,
    pub created_at: DateTime<Utc>,
}

impl PrimaryChangeProcessorJob {
    pub fn new(
        process_instance_id: ProcessInstanceId,
        task_id: TaskId,
        tenant_id: TenantId,
        wrapper_kind: WrapperKind,
        deltas_in: Vec<ObjectDelta>,
    ) -> Self {
        Self {
            id: JobId::new(),
            process_instance_id,
            task_id,
            tenant_id,
            wrapper_kind,
            deltas_in,
            created_at: Utc::now(),
        }
    }
}

/// Notification that a process instance moved; terminal once `running` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEvent {
    pub process_instance_id: ProcessInstanceId,
    pub process_name: String,
    /// Final answer; only meaningful for terminal events.
    pub answer: Option<ApprovalOutcome>,
    pub running: bool,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

impl ProcessEvent {
    /// Terminal event carrying `answer`.
    pub fn finished(
        process_instance_id: ProcessInstanceId,
        process_name: impl Into<String>,
        answer: ApprovalOutcome,
    ) -> Self {
        Self {
            process_instance_id,
            process_name: process_name.into(),
            answer: Some(answer),
            running: false,
            variables: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_variable(mut self, name: &str, value: Value) -> Self {
        self.variables.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.running
    }

    pub fn variables(&self) -> &dyn ProcessVariables {
        &self.variables
    }
}

/// One approver's decision as recorded by item-approval processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub approver: ObjectRef,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Approval stage, for multi-stage processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<u32>,
}

/// Description of a process instance for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceDescriptor {
    pub id: ProcessInstanceId,
    pub process_name: String,
    pub wrapper_kind: WrapperKind,
    pub finished: bool,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

/// Approvers recorded on the objects a completed process changes.
///
/// Creations store them as create approvers, every other change as modify
/// approvers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalMetadata {
    pub create_approver_refs: Vec<ObjectRef>,
    pub modify_approver_refs: Vec<ObjectRef>,
}

impl ApprovalMetadata {
    pub fn for_deltas(approvers: Vec<ObjectRef>, deltas: &[ObjectDelta]) -> Self {
        if deltas.iter().any(ObjectDelta::is_add) {
            Self {
                create_approver_refs: approvers,
                modify_approver_refs: Vec::new(),
            }
        } else {
            Self {
                create_approver_refs: Vec::new(),
                modify_approver_refs: approvers,
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_approver_refs.is_empty() && self.modify_approver_refs.is_empty()
    }
}
