//! Approval of user creation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{base, PrimaryApprovalProcessWrapper};
use crate::context::{ModelContext, OperationResult, TaskHandle};
use crate::delta::ObjectDelta;
use crate::engine::{ProcessVariables, WorkItemTask};
use crate::error::Result;
use crate::object::{ManagedObject, ObjectRef, ObjectResolver};
use crate::process::{vars, JobCreationInstruction, ProcessInstanceDescriptor};
use crate::types::{ObjectType, PanelRef, WrapperKind};
use crate::work_item::{RequestSpecificData, UserCreationForm, ViewContext};

/// Holds back the creation of a user until it is approved. The whole add
/// delta goes to the process; nothing of it proceeds immediately.
pub struct CreateUserWrapper {
    resolver: Arc<dyn ObjectResolver>,
    process_name: String,
}

impl CreateUserWrapper {
    pub fn new(resolver: Arc<dyn ObjectResolver>, process_name: impl Into<String>) -> Self {
        Self {
            resolver,
            process_name: process_name.into(),
        }
    }
}

#[async_trait]
impl PrimaryApprovalProcessWrapper for CreateUserWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::CreateUser
    }

    fn handles(&self, delta: &ObjectDelta) -> bool {
        delta.object_type == ObjectType::User && delta.is_add()
    }

    async fn prepare_job_creation_instructions(
        &self,
        _model_context: &ModelContext,
        change: &mut ObjectDelta,
        task: &TaskHandle,
        _result: &mut OperationResult,
    ) -> Result<Vec<JobCreationInstruction>> {
        let Some(object) = change.object_to_add().filter(|_| self.handles(change)) else {
            return Ok(Vec::new());
        };
        let object_variable = base::to_variable(object)?;
        let name = object.name.clone();
        let oid = object.oid;

        // What remains of the change is an empty modification of the same user.
        let remainder = ObjectDelta::modify(ObjectType::User, oid, Vec::new());
        let extracted = std::mem::replace(change, remainder);

        let instruction = base::new_instruction(
            self.kind(),
            &self.process_name,
            task,
            None,
            &name,
            vec![extracted],
        )?
        .with_task_name(format!("Approve creating user {name}"))
        .with_variable(vars::OBJECT_TO_ADD, object_variable);

        debug!(user = %name, "Extracted user creation for approval");
        Ok(vec![instruction])
    }

    async fn request_specific_data(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        _context: &ViewContext,
    ) -> Result<RequestSpecificData> {
        let object: ManagedObject = variables.required(vars::OBJECT_TO_ADD)?;
        debug!(
            work_item_id = %task.work_item_id(),
            user = %object.name,
            "Building user creation form"
        );

        Ok(RequestSpecificData::UserCreation(UserCreationForm {
            name: object.name,
            attributes: object.attributes,
            requester_comment: base::requester_comment(variables)?,
            comment: base::approver_comment(variables)?,
        }))
    }

    /// The requester; the user itself does not exist until approved.
    async fn related_object(
        &self,
        _task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<ManagedObject> {
        let requester: ObjectRef = variables.required(vars::REQUESTER_REF)?;
        self.resolver.resolve(context.tenant_id, &requester).await
    }

    fn process_instance_details_panel(&self, descriptor: &ProcessInstanceDescriptor) -> PanelRef {
        base::details_panel(descriptor, PanelRef::ITEM_APPROVAL)
    }
}
