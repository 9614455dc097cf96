//! Behaviour shared by all wrapper variants.
//!
//! The trait's default methods delegate here; variants call the helpers to
//! build start instructions and read the common process variables.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::{OperationResult, TaskHandle};
use crate::delta::ObjectDelta;
use crate::engine::ProcessVariables;
use crate::error::{Result, WorkflowError};
use crate::object::ObjectRef;
use crate::process::{
    vars, ApprovalDecision, JobCreationInstruction, PrimaryChangeProcessorJob, ProcessEvent,
    ProcessInstanceDescriptor,
};
use crate::types::{ApprovalOutcome, PanelRef, WrapperKind};

/// Resolve a finished process into deltas.
///
/// Rejection yields nothing. Approval yields the job's deltas, or the
/// approver-edited deltas from `approvedDeltas` when the process set them.
/// Edited deltas that no longer change anything are dropped.
pub fn prepare_delta_out(
    event: &ProcessEvent,
    job: &PrimaryChangeProcessorJob,
    result: &mut OperationResult,
) -> Result<Vec<ObjectDelta>> {
    if event.process_instance_id != job.process_instance_id {
        return Err(WorkflowError::schema(format!(
            "event for process instance {} delivered to job of {}",
            event.process_instance_id, job.process_instance_id
        )));
    }
    if !event.is_terminal() {
        return Err(WorkflowError::schema(format!(
            "process instance {} is still running",
            event.process_instance_id
        )));
    }

    let answer = event.answer.ok_or_else(|| {
        WorkflowError::schema(format!(
            "process instance {} finished without an answer",
            event.process_instance_id
        ))
    })?;

    if answer == ApprovalOutcome::Rejected {
        debug!(
            process_instance_id = %event.process_instance_id,
            "Process rejected, no deltas released"
        );
        return Ok(Vec::new());
    }

    let edited: Option<Vec<ObjectDelta>> = event.variables().optional(vars::APPROVED_DELTAS)?;
    let Some(edited) = edited else {
        return Ok(job.deltas_in.clone());
    };

    for delta in &edited {
        let known = job
            .deltas_in
            .iter()
            .any(|d| d.object_type == delta.object_type && d.oid == delta.oid);
        if !known {
            return Err(WorkflowError::schema(format!(
                "approved delta for {} {} does not match any delta sent for approval",
                delta.object_type,
                delta.oid.map(|o| o.to_string()).unwrap_or_default()
            )));
        }
    }

    let deltas: Vec<ObjectDelta> = edited.into_iter().filter(|d| !d.is_empty()).collect();
    if deltas.is_empty() {
        warn!(
            process_instance_id = %event.process_instance_id,
            "Approvers removed every delta"
        );
        result.record_warning("approved with edits that remove every delta");
    }
    Ok(deltas)
}

/// Approvers of approving decisions in the `decisions` variable, in order,
/// without repeats. No decisions means no approvers.
pub fn approved_by(event: &ProcessEvent) -> Result<Vec<ObjectRef>> {
    let decisions: Vec<ApprovalDecision> = event
        .variables()
        .optional(vars::DECISIONS)?
        .unwrap_or_default();

    let mut approvers: Vec<ObjectRef> = Vec::new();
    for decision in decisions.into_iter().filter(|d| d.approved) {
        if !approvers.contains(&decision.approver) {
            approvers.push(decision.approver);
        }
    }
    Ok(approvers)
}

/// Panel for finished instances of any kind, `active` otherwise.
pub fn details_panel(descriptor: &ProcessInstanceDescriptor, active: PanelRef) -> PanelRef {
    if descriptor.finished {
        PanelRef::PROCESS_SUMMARY
    } else {
        active
    }
}

/// Start instruction carrying the variables every process gets: the wrapper
/// kind, the object, the requester and the deltas in stored form.
pub fn new_instruction(
    kind: WrapperKind,
    process_name: &str,
    task: &TaskHandle,
    object_ref: Option<ObjectRef>,
    object_name: &str,
    deltas: Vec<ObjectDelta>,
) -> Result<JobCreationInstruction> {
    let stored = deltas
        .iter()
        .map(ObjectDelta::to_json_string)
        .collect::<Result<Vec<_>>>()?;

    let mut instruction = JobCreationInstruction::new(kind, process_name, task, deltas)
        .with_object_ref(object_ref.clone())
        .with_variable(vars::WRAPPER_KIND, Value::from(kind.as_str()))
        .with_variable(vars::OBJECT_NAME, Value::from(object_name))
        .with_variable(vars::REQUESTER_REF, to_variable(&task.requester)?)
        .with_variable(vars::DELTAS_TO_APPROVE, to_variable(&stored)?);

    if let Some(object_ref) = object_ref {
        instruction = instruction.with_variable(vars::OBJECT_REF, to_variable(&object_ref)?);
    }
    if let Some(comment) = &task.requester_comment {
        instruction =
            instruction.with_variable(vars::REQUESTER_COMMENT, Value::from(comment.as_str()));
    }
    Ok(instruction)
}

/// Serialize a value for use as a process variable.
pub fn to_variable<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| WorkflowError::Serialization {
        message: e.to_string(),
    })
}

pub fn requester_comment(variables: &dyn ProcessVariables) -> Result<Option<String>> {
    variables.optional(vars::REQUESTER_COMMENT)
}

pub fn approver_comment(variables: &dyn ProcessVariables) -> Result<Option<String>> {
    variables.optional(vars::COMMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::ItemDelta;
    use crate::ids::{ObjectId, ProcessInstanceId, TaskId, TenantId};
    use crate::types::ObjectType;
    use serde_json::json;

    fn job_with(delta: ObjectDelta) -> PrimaryChangeProcessorJob {
        PrimaryChangeProcessorJob::new(
            ProcessInstanceId::new(),
            TaskId::new(),
            TenantId::new(),
            WrapperKind::AttributeChange,
            vec![delta],
        )
    }

    fn phone_delta(oid: ObjectId, number: &str) -> ObjectDelta {
        ObjectDelta::modify(
            ObjectType::User,
            oid,
            vec![ItemDelta::replace("telephoneNumber", vec![json!(number)])],
        )
    }

    fn finished(id: ProcessInstanceId, answer: ApprovalOutcome) -> ProcessEvent {
        ProcessEvent::finished(id, "ItemApproval", answer)
    }

    fn decision(approver: &ObjectRef, approved: bool) -> Value {
        json!({ "approver": approver, "approved": approved, "stage": 1 })
    }

    #[test]
    fn test_rejection_yields_nothing() {
        let job = job_with(phone_delta(ObjectId::new(), "555-0100"));
        let event = finished(job.process_instance_id, ApprovalOutcome::Rejected);
        let mut result = OperationResult::new("test");
        assert!(prepare_delta_out(&event, &job, &mut result).unwrap().is_empty());
    }

    #[test]
    fn test_approval_without_edits_yields_original() {
        let job = job_with(phone_delta(ObjectId::new(), "555-0100"));
        let event = finished(job.process_instance_id, ApprovalOutcome::Approved);
        let mut result = OperationResult::new("test");
        assert_eq!(prepare_delta_out(&event, &job, &mut result).unwrap(), job.deltas_in);
    }

    #[test]
    fn test_approval_with_edits_replaces_original() {
        let user = ObjectId::new();
        let job = job_with(phone_delta(user, "555-0100"));
        let edited = phone_delta(user, "555-0199");
        let event = finished(job.process_instance_id, ApprovalOutcome::Approved)
            .with_variable(vars::APPROVED_DELTAS, json!([edited]));
        let mut result = OperationResult::new("test");
        assert_eq!(prepare_delta_out(&event, &job, &mut result).unwrap(), vec![edited]);
    }

    #[test]
    fn test_edits_removing_everything_yield_nothing() {
        let user = ObjectId::new();
        let job = job_with(phone_delta(user, "555-0100"));
        let emptied = ObjectDelta::modify(ObjectType::User, user, vec![]);
        let event = finished(job.process_instance_id, ApprovalOutcome::Approved)
            .with_variable(vars::APPROVED_DELTAS, json!([emptied]));
        let mut result = OperationResult::new("test");
        assert!(prepare_delta_out(&event, &job, &mut result).unwrap().is_empty());
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn test_edits_for_other_object_are_schema_error() {
        let job = job_with(phone_delta(ObjectId::new(), "555-0100"));
        let stranger = phone_delta(ObjectId::new(), "555-0100");
        let event = finished(job.process_instance_id, ApprovalOutcome::Approved)
            .with_variable(vars::APPROVED_DELTAS, json!([stranger]));
        let mut result = OperationResult::new("test");
        let err = prepare_delta_out(&event, &job, &mut result).unwrap_err();
        assert!(matches!(err, WorkflowError::Schema { .. }));
    }

    #[test]
    fn test_missing_answer_is_schema_error() {
        let job = job_with(phone_delta(ObjectId::new(), "555-0100"));
        let mut event = finished(job.process_instance_id, ApprovalOutcome::Approved);
        event.answer = None;
        let mut result = OperationResult::new("test");
        let err = prepare_delta_out(&event, &job, &mut result).unwrap_err();
        assert!(err.to_string().contains("without an answer"));
    }

    #[test]
    fn test_running_event_is_schema_error() {
        let job = job_with(phone_delta(ObjectId::new(), "555-0100"));
        let mut event = finished(job.process_instance_id, ApprovalOutcome::Approved);
        event.running = true;
        let mut result = OperationResult::new("test");
        assert!(prepare_delta_out(&event, &job, &mut result).is_err());
    }

    #[test]
    fn test_approved_by_keeps_order_and_dedupes() {
        let alice = ObjectRef::user(ObjectId::new());
        let bob = ObjectRef::user(ObjectId::new());
        let carol = ObjectRef::user(ObjectId::new());
        let event = finished(ProcessInstanceId::new(), ApprovalOutcome::Approved)
            .with_variable(
                vars::DECISIONS,
                json!([
                    decision(&bob, true),
                    decision(&carol, false),
                    decision(&alice, true),
                    decision(&bob, true),
                ]),
            );
        assert_eq!(approved_by(&event).unwrap(), vec![bob, alice]);
    }

    #[test]
    fn test_approved_by_without_decisions_is_empty() {
        let event = finished(ProcessInstanceId::new(), ApprovalOutcome::Rejected);
        assert!(approved_by(&event).unwrap().is_empty());
    }

    #[test]
    fn test_approved_by_malformed_decisions() {
        let event = finished(ProcessInstanceId::new(), ApprovalOutcome::Approved)
            .with_variable(vars::DECISIONS, json!({ "approver": "nobody" }));
        assert!(matches!(approved_by(&event).unwrap_err(), WorkflowError::Schema { .. }));
    }

    #[test]
    fn test_details_panel_for_finished_instance() {
        let mut descriptor = ProcessInstanceDescriptor {
            id: ProcessInstanceId::new(),
            process_name: "ItemApproval".to_string(),
            wrapper_kind: WrapperKind::AddRole,
            finished: false,
            variables: Default::default(),
        };
        assert_eq!(details_panel(&descriptor, PanelRef::ITEM_APPROVAL), PanelRef::ITEM_APPROVAL);
        descriptor.finished = true;
        assert_eq!(details_panel(&descriptor, PanelRef::ITEM_APPROVAL), PanelRef::PROCESS_SUMMARY);
    }

    #[test]
    fn test_new_instruction_sets_common_variables() {
        let requester = ObjectRef::user(ObjectId::new());
        let user = ObjectRef::user(ObjectId::new());
        let task = TaskHandle::new("Modify user", requester.clone())
            .with_requester_comment("please");
        let delta = phone_delta(user.oid, "555-0100");

        let instruction = new_instruction(
            WrapperKind::AttributeChange,
            "ItemApproval",
            &task,
            Some(user.clone()),
            "frank",
            vec![delta],
        )
        .unwrap();

        let variables = &instruction.process_variables;
        assert_eq!(variables[vars::WRAPPER_KIND], json!("attribute_change"));
        assert_eq!(variables[vars::OBJECT_NAME], json!("frank"));
        assert_eq!(variables[vars::OBJECT_REF], to_variable(&user).unwrap());
        assert_eq!(variables[vars::REQUESTER_REF], to_variable(&requester).unwrap());
        assert_eq!(variables[vars::REQUESTER_COMMENT], json!("please"));
        assert_eq!(
            variables[vars::DELTAS_TO_APPROVE].as_array().map(Vec::len),
            Some(1)
        );
        assert_eq!(instruction.requester, requester);
        assert_eq!(instruction.object_ref, Some(user));
    }
}
