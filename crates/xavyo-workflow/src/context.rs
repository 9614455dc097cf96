//! What the orchestration engine hands a wrapper: the model context with its
//! focus and projection deltas, the operation result sink, and the task the
//! change runs in.

use serde::{Deserialize, Serialize};

use crate::delta::ObjectDelta;
use crate::error::{Result, WorkflowError};
use crate::ids::{ObjectId, TaskId, TenantId};
use crate::object::{ManagedObject, ObjectRef};
use crate::types::ModelState;

// ============================================================================
// Model context
// ============================================================================

/// The primary object of an orchestration operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusContext {
    /// Object as it is in the repository; `None` when it is being created.
    pub object_old: Option<ManagedObject>,
    /// Object as it will be after the change; `None` when it is being deleted.
    pub object_new: Option<ManagedObject>,
    pub primary_delta: Option<ObjectDelta>,
}

/// A resource-side representation linked to the focus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionContext {
    /// Name of the resource holding the account or group.
    pub resource: String,
    pub oid: Option<ObjectId>,
    pub primary_delta: Option<ObjectDelta>,
}

/// State of one change-orchestration operation as the wrappers see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelContext {
    pub tenant_id: TenantId,
    pub state: ModelState,
    pub focus_context: FocusContext,
    pub projection_contexts: Vec<ProjectionContext>,
}

impl ModelContext {
    pub fn new(tenant_id: TenantId, focus_context: FocusContext) -> Self {
        Self {
            tenant_id,
            state: ModelState::Primary,
            focus_context,
            projection_contexts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: ModelState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_projection(mut self, projection: ProjectionContext) -> Self {
        self.projection_contexts.push(projection);
        self
    }

    /// The focus object, preferring its state before the change.
    #[must_use]
    pub fn focus_object(&self) -> Option<&ManagedObject> {
        self.focus_context
            .object_old
            .as_ref()
            .or(self.focus_context.object_new.as_ref())
    }

    /// Reference to the focus object, if it has one yet.
    #[must_use]
    pub fn focus_ref(&self) -> Option<ObjectRef> {
        self.focus_object().map(ManagedObject::reference)
    }
}

/// Model state plus every present primary delta, focus first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesSummary {
    pub state: ModelState,
    pub primary_deltas: Vec<ObjectDelta>,
}

impl ChangesSummary {
    /// Summarize the changes an operation carries. Contexts without a primary
    /// delta are skipped.
    pub fn from_context(context: &ModelContext) -> Self {
        let primary_deltas = context
            .focus_context
            .primary_delta
            .iter()
            .chain(
                context
                    .projection_contexts
                    .iter()
                    .filter_map(|p| p.primary_delta.as_ref()),
            )
            .cloned()
            .collect();

        Self {
            state: context.state,
            primary_deltas,
        }
    }

    /// Each delta in its stored text form.
    pub fn serialized_deltas(&self) -> Result<Vec<String>> {
        self.primary_deltas
            .iter()
            .map(ObjectDelta::to_json_string)
            .collect()
    }
}

// ============================================================================
// Task handle
// ============================================================================

/// The orchestration task a change runs in. Wrappers read it, never modify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: TaskId,
    pub name: String,
    /// Principal who requested the change.
    pub requester: ObjectRef,
    /// Channel the request came through (e.g. "user", "import").
    pub channel: Option<String>,
    /// Justification the requester attached to the change.
    pub requester_comment: Option<String>,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, requester: ObjectRef) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            requester,
            channel: None,
            requester_comment: None,
        }
    }

    #[must_use]
    pub fn with_requester_comment(mut self, comment: impl Into<String>) -> Self {
        self.requester_comment = Some(comment.into());
        self
    }
}

// ============================================================================
// Operation result
// ============================================================================

/// Computed status of an operation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Warning,
    /// Some subresult failed, the operation itself did not.
    PartialError,
    FatalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub severity: Severity,
    pub message: String,
}

/// Error and warning sink for one operation, nested per sub-operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: String,
    pub messages: Vec<ResultMessage>,
    pub subresults: Vec<OperationResult>,
}

impl OperationResult {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            messages: Vec::new(),
            subresults: Vec::new(),
        }
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.messages.push(ResultMessage {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn record_error(&mut self, error: &WorkflowError) {
        self.messages.push(ResultMessage {
            severity: Severity::Error,
            message: error.to_string(),
        });
    }

    /// Start a nested result and return it for recording.
    pub fn create_subresult(&mut self, operation: impl Into<String>) -> &mut OperationResult {
        self.subresults.push(OperationResult::new(operation));
        let last = self.subresults.len() - 1;
        &mut self.subresults[last]
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages_of(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.messages_of(Severity::Warning)
    }

    fn messages_of(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(move |m| m.severity == severity)
            .map(|m| m.message.as_str())
    }

    /// Status from this result's own messages and, below it, its subresults.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        if self.errors().next().is_some() {
            return OperationStatus::FatalError;
        }
        let mut status = if self.warnings().next().is_some() {
            OperationStatus::Warning
        } else {
            OperationStatus::Success
        };
        for sub in &self.subresults {
            match sub.status() {
                OperationStatus::FatalError | OperationStatus::PartialError => {
                    return OperationStatus::PartialError;
                }
                OperationStatus::Warning => status = OperationStatus::Warning,
                OperationStatus::Success => {}
            }
        }
        status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == OperationStatus::Success
    }
}
