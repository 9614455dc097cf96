//! Approval of modifications to watched user attributes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{base, PrimaryApprovalProcessWrapper};
use crate::context::{ModelContext, OperationResult, TaskHandle};
use crate::delta::ObjectDelta;
use crate::engine::{ProcessVariables, WorkItemTask};
use crate::error::{Result, WorkflowError};
use crate::object::{ManagedObject, ObjectRef, ObjectResolver};
use crate::process::{vars, JobCreationInstruction, ProcessInstanceDescriptor};
use crate::types::{ObjectType, PanelRef, WrapperKind};
use crate::work_item::{AttributeChangeForm, RequestSpecificData, ViewContext};

/// Starts one approval process per watched attribute a user modification
/// touches. Every item delta on that attribute goes into the same process;
/// other items of the modification proceed immediately.
pub struct AttributeChangeWrapper {
    resolver: Arc<dyn ObjectResolver>,
    watched: Vec<String>,
    process_name: String,
}

impl AttributeChangeWrapper {
    pub fn new(
        resolver: Arc<dyn ObjectResolver>,
        watched: Vec<String>,
        process_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            watched,
            process_name: process_name.into(),
        }
    }

    #[must_use]
    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    fn watched_paths_in<'a>(&'a self, delta: &'a ObjectDelta) -> impl Iterator<Item = &'a str> {
        self.watched
            .iter()
            .map(String::as_str)
            .filter(move |path| {
                delta
                    .modifications()
                    .iter()
                    .any(|d| d.path == *path && !d.is_empty())
            })
    }
}

/// Current values of an attribute as a list.
fn values_of(object: Option<&ManagedObject>, path: &str) -> Vec<Value> {
    match object.and_then(|o| o.attribute(path)) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values.clone(),
        Some(value) => vec![value.clone()],
    }
}

#[async_trait]
impl PrimaryApprovalProcessWrapper for AttributeChangeWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::AttributeChange
    }

    fn handles(&self, delta: &ObjectDelta) -> bool {
        delta.object_type == ObjectType::User
            && delta.is_modify()
            && self.watched_paths_in(delta).next().is_some()
    }

    async fn prepare_job_creation_instructions(
        &self,
        model_context: &ModelContext,
        change: &mut ObjectDelta,
        task: &TaskHandle,
        _result: &mut OperationResult,
    ) -> Result<Vec<JobCreationInstruction>> {
        if !self.handles(change) {
            return Ok(Vec::new());
        }
        let oid = change
            .oid
            .ok_or_else(|| WorkflowError::schema("user modification without oid"))?;
        let focus = model_context.focus_object();
        let user_name = focus.map_or_else(|| oid.to_string(), |o| o.name.clone());
        let user_ref = ObjectRef::user(oid);

        let paths: Vec<String> = self.watched_paths_in(change).map(str::to_string).collect();
        let mut instructions = Vec::with_capacity(paths.len());
        for path in &paths {
            let items = change.remove_item_deltas(path);
            let old_values = values_of(focus, path);
            let new_values: Vec<Value> = items
                .iter()
                .flat_map(|item| item.new_values().iter().cloned())
                .collect();
            let delta = ObjectDelta::modify(ObjectType::User, oid, items);

            let instruction = base::new_instruction(
                self.kind(),
                &self.process_name,
                task,
                Some(user_ref.clone()),
                &user_name,
                vec![delta],
            )?
            .with_task_name(format!("Approve changing {path} of {user_name}"))
            .with_variable(vars::ATTRIBUTE_PATH, Value::from(path.as_str()))
            .with_variable(vars::OLD_VALUES, Value::Array(old_values))
            .with_variable(vars::NEW_VALUES, Value::Array(new_values));
            instructions.push(instruction);
        }
        change.prune_empty();

        debug!(
            user = %user_ref,
            attributes = ?paths,
            "Extracted attribute modifications for approval"
        );
        Ok(instructions)
    }

    async fn request_specific_data(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        _context: &ViewContext,
    ) -> Result<RequestSpecificData> {
        let form = AttributeChangeForm {
            user: variables.required(vars::OBJECT_NAME)?,
            attribute: variables.required(vars::ATTRIBUTE_PATH)?,
            old_values: variables.optional(vars::OLD_VALUES)?.unwrap_or_default(),
            new_values: variables.optional(vars::NEW_VALUES)?.unwrap_or_default(),
            requester_comment: base::requester_comment(variables)?,
            comment: base::approver_comment(variables)?,
        };
        debug!(
            work_item_id = %task.work_item_id(),
            attribute = %form.attribute,
            "Building attribute change form"
        );
        Ok(RequestSpecificData::AttributeChange(form))
    }

    async fn related_object(
        &self,
        _task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<ManagedObject> {
        let user: ObjectRef = variables.required(vars::OBJECT_REF)?;
        self.resolver.resolve(context.tenant_id, &user).await
    }

    fn process_instance_details_panel(&self, descriptor: &ProcessInstanceDescriptor) -> PanelRef {
        base::details_panel(descriptor, PanelRef::ATTRIBUTE_APPROVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FocusContext;
    use crate::delta::ItemDelta;
    use crate::engine::EngineTask;
    use crate::ids::{ObjectId, ProcessInstanceId, TenantId};
    use crate::object::InMemoryObjectStore;
    use serde_json::json;
    use std::collections::HashMap;

    fn wrapper(store: Arc<InMemoryObjectStore>) -> AttributeChangeWrapper {
        AttributeChangeWrapper::new(
            store,
            vec!["telephoneNumber".to_string(), "costCenter".to_string()],
            "ItemApproval",
        )
    }

    fn context_for(user: &ManagedObject) -> ModelContext {
        ModelContext::new(
            TenantId::new(),
            FocusContext {
                object_old: Some(user.clone()),
                object_new: None,
                primary_delta: None,
            },
        )
    }

    #[tokio::test]
    async fn test_extracts_watched_attribute_only() {
        let user = ManagedObject::new(ObjectType::User, "grace").with("costCenter", "CC-1");
        let wrapper = wrapper(Arc::new(InMemoryObjectStore::new()));
        let mut change = ObjectDelta::modify(
            ObjectType::User,
            user.oid,
            vec![
                ItemDelta::replace("costCenter", vec![json!("CC-2")]),
                ItemDelta::replace("givenName", vec![json!("Grace")]),
            ],
        );
        assert!(wrapper.handles(&change));

        let task = TaskHandle::new("Modify grace", ObjectRef::user(ObjectId::new()));
        let mut result = OperationResult::new("test");
        let instructions = wrapper
            .prepare_job_creation_instructions(&context_for(&user), &mut change, &task, &mut result)
            .await
            .unwrap();

        assert_eq!(instructions.len(), 1);
        let variables = &instructions[0].process_variables;
        assert_eq!(variables[vars::ATTRIBUTE_PATH], json!("costCenter"));
        assert_eq!(variables[vars::OLD_VALUES], json!(["CC-1"]));
        assert_eq!(variables[vars::NEW_VALUES], json!(["CC-2"]));
        assert!(change.find_item_delta("costCenter").is_none());
        assert!(change.find_item_delta("givenName").is_some());
    }

    #[tokio::test]
    async fn test_repeated_items_of_one_attribute_go_together() {
        let user = ManagedObject::new(ObjectType::User, "grace").with("costCenter", "CC-1");
        let wrapper = wrapper(Arc::new(InMemoryObjectStore::new()));
        let mut change = ObjectDelta::modify(
            ObjectType::User,
            user.oid,
            vec![
                ItemDelta::replace("costCenter", vec![json!("CC-2")]),
                ItemDelta::replace("givenName", vec![json!("Grace")]),
                ItemDelta::replace("costCenter", vec![json!("CC-9")]),
            ],
        );

        let task = TaskHandle::new("Modify grace", ObjectRef::user(ObjectId::new()));
        let mut result = OperationResult::new("test");
        let instructions = wrapper
            .prepare_job_creation_instructions(&context_for(&user), &mut change, &task, &mut result)
            .await
            .unwrap();

        assert_eq!(instructions.len(), 1);
        let approved = instructions[0].deltas_to_approve[0].modifications();
        assert_eq!(approved.len(), 2);
        assert!(approved.iter().all(|d| d.path == "costCenter"));
        assert_eq!(
            instructions[0].process_variables[vars::NEW_VALUES],
            json!(["CC-2", "CC-9"])
        );
        assert!(change.find_item_delta("costCenter").is_none());
        assert_eq!(change.modifications().len(), 1);
    }

    #[tokio::test]
    async fn test_unwatched_change_is_untouched() {
        let user = ManagedObject::new(ObjectType::User, "heidi");
        let wrapper = wrapper(Arc::new(InMemoryObjectStore::new()));
        let mut change = ObjectDelta::modify(
            ObjectType::User,
            user.oid,
            vec![ItemDelta::replace("givenName", vec![json!("Heidi")])],
        );
        let before = change.clone();
        assert!(!wrapper.handles(&change));

        let task = TaskHandle::new("Modify heidi", ObjectRef::user(ObjectId::new()));
        let mut result = OperationResult::new("test");
        let instructions = wrapper
            .prepare_job_creation_instructions(&context_for(&user), &mut change, &task, &mut result)
            .await
            .unwrap();
        assert!(instructions.is_empty());
        assert_eq!(change, before);
    }

    #[tokio::test]
    async fn test_form_tolerates_missing_values() {
        let wrapper = wrapper(Arc::new(InMemoryObjectStore::new()));
        let variables: HashMap<String, Value> = HashMap::from([
            (vars::OBJECT_NAME.to_string(), json!("ivan")),
            (vars::ATTRIBUTE_PATH.to_string(), json!("telephoneNumber")),
        ]);
        let task = EngineTask::new(ProcessInstanceId::new(), "Approve changing telephoneNumber");

        let data = wrapper
            .request_specific_data(&task, &variables, &ViewContext::new(TenantId::new()))
            .await
            .unwrap();
        let RequestSpecificData::AttributeChange(form) = data else {
            panic!("expected attribute change form");
        };
        assert_eq!(form.attribute, "telephoneNumber");
        assert!(form.old_values.is_empty());
        assert!(form.requester_comment.is_none());
    }

    #[tokio::test]
    async fn test_related_object_missing_user() {
        let wrapper = wrapper(Arc::new(InMemoryObjectStore::new()));
        let variables: HashMap<String, Value> = HashMap::from([(
            vars::OBJECT_REF.to_string(),
            json!(ObjectRef::user(ObjectId::new())),
        )]);
        let task = EngineTask::new(ProcessInstanceId::new(), "Approve");
        let err = wrapper
            .related_object(&task, &variables, &ViewContext::new(TenantId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ObjectNotFound { .. }));
    }

    #[test]
    fn test_panel() {
        let wrapper = wrapper(Arc::new(InMemoryObjectStore::new()));
        let descriptor = ProcessInstanceDescriptor {
            id: ProcessInstanceId::new(),
            process_name: "ItemApproval".to_string(),
            wrapper_kind: WrapperKind::AttributeChange,
            finished: false,
            variables: HashMap::new(),
        };
        assert_eq!(
            wrapper.process_instance_details_panel(&descriptor),
            PanelRef::ATTRIBUTE_APPROVAL
        );
    }
}
