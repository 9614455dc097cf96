//! Test fixtures: users, roles, changes and process events.

use serde_json::{json, Value};

use xavyo_workflow::delta::ASSIGNMENT_PATH;
use xavyo_workflow::process::vars;
use xavyo_workflow::{
    ApprovalDecision, ApprovalOutcome, AssignmentValue, FocusContext, ItemDelta, ManagedObject,
    ModelContext, ObjectDelta, ObjectRef, ObjectType, ProcessEvent, ProcessInstanceId, TaskHandle,
    TenantId,
};

use super::TestContext;

/// Store a user in tenant A.
pub async fn seed_user(ctx: &TestContext, name: &str) -> ManagedObject {
    let user = ManagedObject::new(ObjectType::User, name)
        .with("telephoneNumber", json!(["+1 555 0100"]))
        .with("costCenter", json!(["CC-100"]));
    ctx.stores.objects.insert(ctx.tenant_a, user.clone()).await;
    user
}

/// Store a role in tenant A.
pub async fn seed_role(ctx: &TestContext, name: &str) -> ObjectRef {
    ctx.stores
        .objects
        .insert(ctx.tenant_a, ManagedObject::new(ObjectType::Role, name))
        .await
}

/// Raw assignment value pointing at `target`.
pub fn assignment(target: &ObjectRef) -> Value {
    AssignmentValue::to_target(target.clone())
        .to_value()
        .expect("assignment serializes")
}

/// Raw construction-only assignment (resource account, no target).
pub fn construction() -> Value {
    json!({ "construction": { "resource": "ldap", "kind": "account" } })
}

/// Modification of an existing user adding the given assignment values.
pub fn assign(user: &ManagedObject, values: Vec<Value>) -> ObjectDelta {
    ObjectDelta::modify(
        ObjectType::User,
        user.oid,
        vec![ItemDelta::add(ASSIGNMENT_PATH, values)],
    )
}

/// Orchestration context of a change to an existing user.
pub fn modify_context(
    tenant_id: TenantId,
    user: &ManagedObject,
    change: &ObjectDelta,
) -> ModelContext {
    ModelContext::new(
        tenant_id,
        FocusContext {
            object_old: Some(user.clone()),
            object_new: Some(user.clone()),
            primary_delta: Some(change.clone()),
        },
    )
}

/// Orchestration context of a user creation.
pub fn add_context(tenant_id: TenantId, change: &ObjectDelta) -> ModelContext {
    ModelContext::new(
        tenant_id,
        FocusContext {
            object_old: None,
            object_new: change.object_to_add().cloned(),
            primary_delta: Some(change.clone()),
        },
    )
}

/// Task of the requester, with a justification.
pub fn task(ctx: &TestContext) -> TaskHandle {
    TaskHandle::new("Modify user", ctx.requester.clone())
        .with_requester_comment("Needed for quarter close")
}

pub fn decision(approver: &ObjectRef, approved: bool) -> Value {
    serde_json::to_value(ApprovalDecision {
        approver: approver.clone(),
        approved,
        comment: None,
        stage: Some(1),
    })
    .expect("decision serializes")
}

/// Terminal event approved by `approvers`.
pub fn approved_event(id: ProcessInstanceId, approvers: &[ObjectRef]) -> ProcessEvent {
    ProcessEvent::finished(id, "ItemApproval", ApprovalOutcome::Approved).with_variable(
        vars::DECISIONS,
        Value::Array(approvers.iter().map(|a| decision(a, true)).collect()),
    )
}

/// Terminal event rejected by `approver`.
pub fn rejected_event(id: ProcessInstanceId, approver: &ObjectRef) -> ProcessEvent {
    ProcessEvent::finished(id, "ItemApproval", ApprovalOutcome::Rejected)
        .with_variable(vars::DECISIONS, json!([decision(approver, false)]))
}
