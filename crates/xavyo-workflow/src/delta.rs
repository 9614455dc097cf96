//! Object deltas: proposed additions, modifications and deletions of
//! repository objects.
//!
//! A modify delta is a list of [`ItemDelta`]s, each addressing one item path
//! (`assignment`, `telephoneNumber`, ...). Wrappers carve approval-relevant
//! values out of a delta in place; whatever is left proceeds immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorkflowError};
use crate::ids::ObjectId;
use crate::object::{ManagedObject, ObjectRef};
use crate::types::{AssignmentKind, ObjectType};

/// Item path of a focus object's assignments.
pub const ASSIGNMENT_PATH: &str = "assignment";

/// What a delta does to its object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "changeType", rename_all = "snake_case")]
pub enum ChangeType {
    /// Create the object.
    Add { object: ManagedObject },
    /// Modify items of an existing object.
    Modify { modifications: Vec<ItemDelta> },
    /// Delete the object.
    Delete,
}

/// Change of a single item: values added, deleted or a full replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDelta {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_to_add: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_to_delete: Vec<Value>,
    /// `Some(vec![])` clears the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_to_replace: Option<Vec<Value>>,
}

impl ItemDelta {
    pub fn add(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            values_to_add: values,
            ..Default::default()
        }
    }

    pub fn delete(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            values_to_delete: values,
            ..Default::default()
        }
    }

    pub fn replace(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            values_to_replace: Some(values),
            ..Default::default()
        }
    }

    /// True when applying the delta would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values_to_add.is_empty()
            && self.values_to_delete.is_empty()
            && self.values_to_replace.is_none()
    }

    /// Values the item will hold or gain: replacement values when replacing,
    /// added values otherwise.
    #[must_use]
    pub fn new_values(&self) -> &[Value] {
        match &self.values_to_replace {
            Some(values) => values,
            None => &self.values_to_add,
        }
    }
}

/// Proposed change of one repository object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDelta {
    pub object_type: ObjectType,
    /// Absent for additions whose oid is assigned on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<ObjectId>,
    #[serde(flatten)]
    pub change: ChangeType,
}

impl ObjectDelta {
    /// Delta creating `object`.
    pub fn add(object: ManagedObject) -> Self {
        Self {
            object_type: object.object_type,
            oid: Some(object.oid),
            change: ChangeType::Add { object },
        }
    }

    pub fn modify(object_type: ObjectType, oid: ObjectId, modifications: Vec<ItemDelta>) -> Self {
        Self {
            object_type,
            oid: Some(oid),
            change: ChangeType::Modify { modifications },
        }
    }

    pub fn delete(object_type: ObjectType, oid: ObjectId) -> Self {
        Self {
            object_type,
            oid: Some(oid),
            change: ChangeType::Delete,
        }
    }

    #[must_use]
    pub fn is_add(&self) -> bool {
        matches!(self.change, ChangeType::Add { .. })
    }

    #[must_use]
    pub fn is_modify(&self) -> bool {
        matches!(self.change, ChangeType::Modify { .. })
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self.change, ChangeType::Delete)
    }

    /// A modify delta without effective item deltas. Add and delete deltas are
    /// never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.change {
            ChangeType::Modify { modifications } => modifications.iter().all(ItemDelta::is_empty),
            _ => false,
        }
    }

    /// Reference to the changed object, when it has an oid.
    #[must_use]
    pub fn object_ref(&self) -> Option<ObjectRef> {
        self.oid.map(|oid| ObjectRef::new(self.object_type, oid))
    }

    /// Object being created, for add deltas.
    #[must_use]
    pub fn object_to_add(&self) -> Option<&ManagedObject> {
        match &self.change {
            ChangeType::Add { object } => Some(object),
            _ => None,
        }
    }

    pub fn object_to_add_mut(&mut self) -> Option<&mut ManagedObject> {
        match &mut self.change {
            ChangeType::Add { object } => Some(object),
            _ => None,
        }
    }

    /// Item deltas of a modify delta; empty for add and delete.
    #[must_use]
    pub fn modifications(&self) -> &[ItemDelta] {
        match &self.change {
            ChangeType::Modify { modifications } => modifications,
            _ => &[],
        }
    }

    pub fn find_item_delta(&self, path: &str) -> Option<&ItemDelta> {
        self.modifications().iter().find(|d| d.path == path)
    }

    /// Take every item delta for `path` out of a modify delta, in order.
    pub fn remove_item_deltas(&mut self, path: &str) -> Vec<ItemDelta> {
        let ChangeType::Modify { modifications } = &mut self.change else {
            return Vec::new();
        };
        let (removed, kept): (Vec<ItemDelta>, Vec<ItemDelta>) = std::mem::take(modifications)
            .into_iter()
            .partition(|d| d.path == path);
        *modifications = kept;
        removed
    }

    /// Drop item deltas that no longer change anything.
    pub fn prune_empty(&mut self) {
        if let ChangeType::Modify { modifications } = &mut self.change {
            modifications.retain(|d| !d.is_empty());
        }
    }

    /// Delta serialized as pretty JSON, the form stored in task extensions.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Serialization` if the delta holds values JSON
    /// cannot represent.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| WorkflowError::Serialization {
            message: format!("couldn't serialize object delta: {e}"),
        })
    }

    /// Parse a delta from its stored JSON form.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the text is not a valid delta.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Assignments
// ============================================================================

/// Validity window of an assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
}

/// An assignment value as carried by `assignment` item deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentValue {
    /// Assigned role, org or service; absent for constructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<TimeInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resource construction, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction: Option<Value>,
}

impl AssignmentValue {
    /// Assignment of `target` without validity restrictions.
    pub fn to_target(target: ObjectRef) -> Self {
        Self {
            target_ref: Some(target),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_activation(mut self, activation: TimeInterval) -> Self {
        self.activation = Some(activation);
        self
    }

    /// Interpret a raw item value as an assignment.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the value is not an assignment or its
    /// validity window ends before it starts.
    pub fn from_value(value: &Value) -> Result<Self> {
        let assignment: AssignmentValue = serde_json::from_value(value.clone())
            .map_err(|e| WorkflowError::schema(format!("invalid assignment value: {e}")))?;
        if let Some(TimeInterval {
            valid_from: Some(from),
            valid_to: Some(to),
        }) = assignment.activation
        {
            if from > to {
                return Err(WorkflowError::schema(format!(
                    "assignment validity ends ({to}) before it starts ({from})"
                )));
            }
        }
        Ok(assignment)
    }

    /// Raw item value for this assignment.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Serialization` if the construction cannot be
    /// represented.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| WorkflowError::Serialization {
            message: e.to_string(),
        })
    }

    /// Classify by target type.
    ///
    /// # Errors
    ///
    /// Returns a schema error for targets that cannot be assigned.
    pub fn kind(&self) -> Result<AssignmentKind> {
        AssignmentKind::from_target_type(self.target_ref.as_ref().map(|r| r.object_type))
    }
}
