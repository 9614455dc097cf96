//! Read-only work-item views shown to approvers.
//!
//! Each wrapper kind builds its own form from the process variables; optional
//! variables that are absent simply leave the corresponding field empty.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::delta::TimeInterval;
use crate::engine::WorkItemTask;
use crate::ids::{ProcessInstanceId, TenantId, WorkItemId};
use crate::object::{ManagedObject, ObjectRef};
use crate::types::WrapperKind;

/// Caller context for building views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewContext {
    pub tenant_id: TenantId,
}

impl ViewContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }
}

/// Role, org or service assignment awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleApprovalForm {
    /// Name of the user receiving the assignment.
    pub user: String,
    /// Name of the assigned role.
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<TimeInterval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Modification of a watched user attribute awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeChangeForm {
    pub user: String,
    pub attribute: String,
    pub old_values: Vec<Value>,
    pub new_values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// User creation awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreationForm {
    pub name: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Request-specific part of a work item, one form per wrapper kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestSpecificData {
    RoleApproval(RoleApprovalForm),
    AttributeChange(AttributeChangeForm),
    UserCreation(UserCreationForm),
}

impl RequestSpecificData {
    /// Wrapper kind the form belongs to.
    #[must_use]
    pub fn wrapper_kind(&self) -> WrapperKind {
        match self {
            Self::RoleApproval(_) => WrapperKind::AddRole,
            Self::AttributeChange(_) => WrapperKind::AttributeChange,
            Self::UserCreation(_) => WrapperKind::CreateUser,
        }
    }

    #[must_use]
    pub fn requester_comment(&self) -> Option<&str> {
        match self {
            Self::RoleApproval(form) => form.requester_comment.as_deref(),
            Self::AttributeChange(form) => form.requester_comment.as_deref(),
            Self::UserCreation(form) => form.requester_comment.as_deref(),
        }
    }
}

/// Everything an approver sees for one pending work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemView {
    pub work_item_id: WorkItemId,
    pub process_instance_id: ProcessInstanceId,
    pub name: String,
    pub assignee: Option<ObjectRef>,
    pub request: RequestSpecificData,
    /// Object the work item concerns.
    pub related_object: ManagedObject,
}

impl WorkItemView {
    pub fn new(
        task: &dyn WorkItemTask,
        request: RequestSpecificData,
        related_object: ManagedObject,
    ) -> Self {
        Self {
            work_item_id: task.work_item_id(),
            process_instance_id: task.process_instance_id(),
            name: task.name().to_string(),
            assignee: task.assignee().cloned(),
            request,
            related_object,
        }
    }
}
