//! Enums and small value types shared across the workflow domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WorkflowError};

// ============================================================================
// Object types
// ============================================================================

/// Type of a repository object a delta or reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// Identity (focus of most changes).
    User,
    /// Business or technical role.
    Role,
    /// Organizational unit.
    Org,
    /// Service (application, device).
    Service,
    /// Resource-side account or group representation.
    Shadow,
}

impl ObjectType {
    /// String form used in serialized deltas and references.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Role => "role",
            ObjectType::Org => "org",
            ObjectType::Service => "service",
            ObjectType::Shadow => "shadow",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ObjectType::User),
            "role" => Ok(ObjectType::Role),
            "org" => Ok(ObjectType::Org),
            "service" => Ok(ObjectType::Service),
            "shadow" => Ok(ObjectType::Shadow),
            _ => Err(WorkflowError::schema(format!("unknown object type '{s}'"))),
        }
    }
}

// ============================================================================
// Assignment kinds
// ============================================================================

/// What an assignment points at, derived from its target type.
///
/// Assignments without a target carry a resource construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    OrgUnit,
    Role,
    Service,
    Construction,
}

impl AssignmentKind {
    /// Classify an assignment by its target type.
    ///
    /// # Errors
    ///
    /// Returns a schema error for target types that cannot be assigned.
    pub fn from_target_type(target_type: Option<ObjectType>) -> Result<Self> {
        match target_type {
            None => Ok(AssignmentKind::Construction),
            Some(ObjectType::Org) => Ok(AssignmentKind::OrgUnit),
            Some(ObjectType::Role) => Ok(AssignmentKind::Role),
            Some(ObjectType::Service) => Ok(AssignmentKind::Service),
            Some(other) => Err(WorkflowError::schema(format!(
                "unknown assignment target type '{other}'"
            ))),
        }
    }

    /// Target object type, `None` for constructions.
    #[must_use]
    pub fn target_type(&self) -> Option<ObjectType> {
        match self {
            AssignmentKind::OrgUnit => Some(ObjectType::Org),
            AssignmentKind::Role => Some(ObjectType::Role),
            AssignmentKind::Service => Some(ObjectType::Service),
            AssignmentKind::Construction => None,
        }
    }

    /// Whether adding an assignment of this kind goes through role approval.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        !matches!(self, AssignmentKind::Construction)
    }
}

// ============================================================================
// Model state
// ============================================================================

/// Stage of the change-orchestration operation a model context is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    #[default]
    Initial,
    Primary,
    Secondary,
    Execution,
    PostExecution,
    Final,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::Execution => write!(f, "execution"),
            Self::PostExecution => write!(f, "post_execution"),
            Self::Final => write!(f, "final"),
        }
    }
}

// ============================================================================
// Approval outcome
// ============================================================================

/// Final answer of an approval process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
}

impl ApprovalOutcome {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalOutcome::Approved)
    }
}

impl From<bool> for ApprovalOutcome {
    fn from(approved: bool) -> Self {
        if approved {
            ApprovalOutcome::Approved
        } else {
            ApprovalOutcome::Rejected
        }
    }
}

impl fmt::Display for ApprovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

// ============================================================================
// Wrapper kinds and panels
// ============================================================================

/// Tag of a process wrapper variant; one per approval-relevant concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    /// Adding a role, org or service assignment.
    AddRole,
    /// Modifying a watched attribute of a user.
    AttributeChange,
    /// Creating a user.
    CreateUser,
}

impl WrapperKind {
    /// All kinds, in default registration order.
    #[must_use]
    pub fn all() -> &'static [WrapperKind] {
        &[
            WrapperKind::CreateUser,
            WrapperKind::AddRole,
            WrapperKind::AttributeChange,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperKind::AddRole => "add_role",
            WrapperKind::AttributeChange => "attribute_change",
            WrapperKind::CreateUser => "create_user",
        }
    }
}

impl fmt::Display for WrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WrapperKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "add_role" => Ok(WrapperKind::AddRole),
            "attribute_change" => Ok(WrapperKind::AttributeChange),
            "create_user" => Ok(WrapperKind::CreateUser),
            _ => Err(WorkflowError::schema(format!("unknown wrapper kind '{s}'"))),
        }
    }
}

/// Opaque reference to the display component for a process kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PanelRef(&'static str);

impl PanelRef {
    /// Generic single-stage item approval.
    pub const ITEM_APPROVAL: PanelRef = PanelRef("item-approval");
    /// Attribute modification approval (shows old and new values).
    pub const ATTRIBUTE_APPROVAL: PanelRef = PanelRef("attribute-approval");
    /// Shown for finished instances of any kind.
    pub const PROCESS_SUMMARY: PanelRef = PanelRef("process-summary");

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PanelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
