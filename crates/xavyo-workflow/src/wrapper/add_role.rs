//! Approval of role, org and service assignments added to users.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{base, PrimaryApprovalProcessWrapper};
use crate::context::{ModelContext, OperationResult, TaskHandle};
use crate::delta::{AssignmentValue, ChangeType, ItemDelta, ObjectDelta, ASSIGNMENT_PATH};
use crate::engine::{ProcessVariables, WorkItemTask};
use crate::error::{Result, WorkflowError};
use crate::ids::TenantId;
use crate::object::{ManagedObject, ObjectRef, ObjectResolver};
use crate::process::{vars, JobCreationInstruction, ProcessInstanceDescriptor};
use crate::types::{ObjectType, PanelRef, WrapperKind};
use crate::work_item::{RequestSpecificData, RoleApprovalForm, ViewContext};

/// Starts one approval process per assignment added to a user whose target is
/// a role, org or service. Resource constructions proceed without approval.
///
/// Assignments of a user being created are approved as modifications applied
/// once the user exists.
pub struct AddRoleWrapper {
    resolver: Arc<dyn ObjectResolver>,
    process_name: String,
}

impl AddRoleWrapper {
    pub fn new(resolver: Arc<dyn ObjectResolver>, process_name: impl Into<String>) -> Self {
        Self {
            resolver,
            process_name: process_name.into(),
        }
    }

    async fn assignment_target(
        &self,
        tenant_id: TenantId,
        assignment: &AssignmentValue,
    ) -> Result<ManagedObject> {
        let target = assignment
            .target_ref
            .as_ref()
            .ok_or_else(|| WorkflowError::schema("assignment has no target"))?;
        self.resolver.resolve(tenant_id, target).await
    }
}

/// Position of an assignment value within a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    /// Index into the `assignment` attribute of a user being added.
    Created(usize),
    /// Value of the `item`-th item delta, from its added values.
    Added { item: usize, value: usize },
    /// Value of the `item`-th item delta, from its replacing values.
    Replaced { item: usize, value: usize },
}

/// Raw values of the assignments `delta` adds, with their positions. Values
/// of an `assignment` replace are added too.
fn added_assignments(delta: &ObjectDelta) -> Result<Vec<(Slot, Value)>> {
    match &delta.change {
        ChangeType::Add { object } => match object.attribute(ASSIGNMENT_PATH) {
            None => Ok(Vec::new()),
            Some(Value::Array(values)) => Ok(values
                .iter()
                .enumerate()
                .map(|(index, value)| (Slot::Created(index), value.clone()))
                .collect()),
            Some(_) => Err(WorkflowError::schema(format!(
                "assignments of {} are not a list",
                object.name
            ))),
        },
        ChangeType::Modify { modifications } => {
            let mut added = Vec::new();
            for (item, d) in modifications.iter().enumerate() {
                if d.path != ASSIGNMENT_PATH {
                    continue;
                }
                for (value, raw) in d.values_to_add.iter().enumerate() {
                    added.push((Slot::Added { item, value }, raw.clone()));
                }
                for (value, raw) in d.values_to_replace.iter().flatten().enumerate() {
                    added.push((Slot::Replaced { item, value }, raw.clone()));
                }
            }
            Ok(added)
        }
        ChangeType::Delete => Ok(Vec::new()),
    }
}

fn retain_unextracted(values: &mut Vec<Value>, extracted: impl Fn(usize) -> bool) {
    let mut index = 0;
    values.retain(|_| {
        let keep = !extracted(index);
        index += 1;
        keep
    });
}

/// The assignment a role approval process was started for.
fn assignment_variable(variables: &dyn ProcessVariables) -> Result<AssignmentValue> {
    AssignmentValue::from_value(&variables.required::<Value>(vars::ASSIGNMENT)?)
}

/// Take the extracted assignment values out of `change`. A replace keeps
/// replacing with whatever values it has left.
fn remove_assignments(change: &mut ObjectDelta, extracted: &HashSet<Slot>) {
    match &mut change.change {
        ChangeType::Add { object } => {
            if let Some(Value::Array(values)) = object.attributes.get_mut(ASSIGNMENT_PATH) {
                retain_unextracted(values, |value| extracted.contains(&Slot::Created(value)));
                if values.is_empty() {
                    object.attributes.remove(ASSIGNMENT_PATH);
                }
            }
        }
        ChangeType::Modify { modifications } => {
            for (item, d) in modifications.iter_mut().enumerate() {
                if d.path != ASSIGNMENT_PATH {
                    continue;
                }
                retain_unextracted(&mut d.values_to_add, |value| {
                    extracted.contains(&Slot::Added { item, value })
                });
                if let Some(values) = d.values_to_replace.as_mut() {
                    retain_unextracted(values, |value| {
                        extracted.contains(&Slot::Replaced { item, value })
                    });
                }
            }
            change.prune_empty();
        }
        ChangeType::Delete => {}
    }
}

#[async_trait]
impl PrimaryApprovalProcessWrapper for AddRoleWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::AddRole
    }

    fn handles(&self, delta: &ObjectDelta) -> bool {
        if delta.object_type != ObjectType::User {
            return false;
        }
        // Malformed values count as relevant so extraction reports them.
        added_assignments(delta).map_or(true, |values| {
            values.iter().any(|(_, value)| {
                AssignmentValue::from_value(value)
                    .and_then(|a| a.kind())
                    .map_or(true, |kind| kind.requires_approval())
            })
        })
    }

    async fn prepare_job_creation_instructions(
        &self,
        model_context: &ModelContext,
        change: &mut ObjectDelta,
        task: &TaskHandle,
        _result: &mut OperationResult,
    ) -> Result<Vec<JobCreationInstruction>> {
        if change.object_type != ObjectType::User {
            return Ok(Vec::new());
        }

        let mut pending = Vec::new();
        for (slot, value) in added_assignments(change)? {
            let assignment = AssignmentValue::from_value(&value)?;
            if assignment.kind()?.requires_approval() {
                pending.push((slot, assignment, value));
            }
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let (user_oid, user_name) = match change.object_to_add() {
            Some(object) => (object.oid, object.name.clone()),
            None => {
                let oid = change
                    .oid
                    .ok_or_else(|| WorkflowError::schema("user modification without oid"))?;
                let name = model_context
                    .focus_object()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| oid.to_string());
                (oid, name)
            }
        };
        let user_ref = ObjectRef::user(user_oid);

        // Resolve every target before touching the change.
        let mut instructions = Vec::with_capacity(pending.len());
        for (_, assignment, value) in &pending {
            let role = self
                .assignment_target(model_context.tenant_id, assignment)
                .await?;
            let delta = ObjectDelta::modify(
                ObjectType::User,
                user_oid,
                vec![ItemDelta::add(ASSIGNMENT_PATH, vec![value.clone()])],
            );
            let instruction = base::new_instruction(
                self.kind(),
                &self.process_name,
                task,
                Some(user_ref.clone()),
                &user_name,
                vec![delta],
            )?
            .with_task_name(format!("Approve assigning {} to {}", role.name, user_name))
            .with_variable(vars::ASSIGNMENT, value.clone());
            instructions.push(instruction);
        }

        let extracted: HashSet<Slot> = pending.iter().map(|(slot, _, _)| *slot).collect();
        remove_assignments(change, &extracted);

        debug!(
            user = %user_ref,
            extracted = instructions.len(),
            remaining_empty = change.is_empty(),
            "Extracted assignment additions for approval"
        );
        Ok(instructions)
    }

    async fn request_specific_data(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<RequestSpecificData> {
        let user: String = variables.required(vars::OBJECT_NAME)?;
        let assignment = assignment_variable(variables)?;
        let role = self.assignment_target(context.tenant_id, &assignment).await?;

        debug!(
            work_item_id = %task.work_item_id(),
            role = %role.name,
            "Building role approval form"
        );

        Ok(RequestSpecificData::RoleApproval(RoleApprovalForm {
            user,
            role: role.name,
            time_interval: assignment.activation,
            requester_comment: base::requester_comment(variables)?,
            comment: base::approver_comment(variables)?,
        }))
    }

    async fn related_object(
        &self,
        _task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<ManagedObject> {
        let assignment = assignment_variable(variables)?;
        self.assignment_target(context.tenant_id, &assignment).await
    }

    fn process_instance_details_panel(&self, descriptor: &ProcessInstanceDescriptor) -> PanelRef {
        base::details_panel(descriptor, PanelRef::ITEM_APPROVAL)
    }
}
