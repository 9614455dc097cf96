//! Redelivery tests.
//!
//! Process engines may deliver a terminal event more than once. The first
//! delivery resolves the instance; every later one is answered from the
//! completion ledger without calling the wrapper again.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::fixtures::{
    approved_event, assign, assignment, modify_context, rejected_event, seed_role, seed_user, task,
};
use common::TestContext;
use xavyo_workflow::{
    AddRoleWrapper, ApprovalOutcome, AuditEventFilter, AuditStore, CompletionLedger,
    JobCreationInstruction, ManagedObject, ModelContext, ObjectDelta, ObjectId, ObjectRef,
    OperationResult, OperationStatus, PanelRef, PrimaryApprovalProcessWrapper,
    PrimaryChangeProcessorJob, ProcessEvent, ProcessInstanceDescriptor, ProcessInstanceId,
    ProcessVariables, RequestSpecificData, Result, TaskHandle, ViewContext, WorkItemTask,
    WorkflowAuditAction, WrapperKind, WrapperRegistry,
};

/// Role wrapper counting how often finished processes are mapped back.
struct CountingWrapper {
    inner: AddRoleWrapper,
    resolutions: Arc<AtomicUsize>,
}

#[async_trait]
impl PrimaryApprovalProcessWrapper for CountingWrapper {
    fn kind(&self) -> WrapperKind {
        self.inner.kind()
    }

    fn handles(&self, delta: &ObjectDelta) -> bool {
        self.inner.handles(delta)
    }

    async fn prepare_job_creation_instructions(
        &self,
        model_context: &ModelContext,
        change: &mut ObjectDelta,
        task: &TaskHandle,
        result: &mut OperationResult,
    ) -> Result<Vec<JobCreationInstruction>> {
        self.inner
            .prepare_job_creation_instructions(model_context, change, task, result)
            .await
    }

    fn prepare_delta_out(
        &self,
        event: &ProcessEvent,
        job: &PrimaryChangeProcessorJob,
        result: &mut OperationResult,
    ) -> Result<Vec<ObjectDelta>> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        self.inner.prepare_delta_out(event, job, result)
    }

    async fn request_specific_data(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<RequestSpecificData> {
        self.inner.request_specific_data(task, variables, context).await
    }

    async fn related_object(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<ManagedObject> {
        self.inner.related_object(task, variables, context).await
    }

    fn process_instance_details_panel(&self, descriptor: &ProcessInstanceDescriptor) -> PanelRef {
        self.inner.process_instance_details_panel(descriptor)
    }
}

/// Context using the counting role wrapper; returns the resolution counter.
fn counting_context() -> (TestContext, Arc<AtomicUsize>) {
    let resolutions = Arc::new(AtomicUsize::new(0));
    let counter = resolutions.clone();
    let ctx = TestContext::with_registry(move |stores| {
        let mut registry = WrapperRegistry::new();
        registry.register(Arc::new(CountingWrapper {
            inner: AddRoleWrapper::new(stores.objects.clone(), "ItemApproval"),
            resolutions: counter,
        }));
        registry
    });
    (ctx, resolutions)
}

/// Start one role approval and return its process instance.
async fn started_instance(ctx: &TestContext) -> ProcessInstanceId {
    let user = seed_user(ctx, "alice").await;
    let role = seed_role(ctx, "Accountant").await;
    let change = assign(&user, vec![assignment(&role)]);
    let processing = ctx
        .process_change(&modify_context(ctx.tenant_a, &user, &change), &change, &task(ctx))
        .await
        .unwrap();
    processing.jobs[0].process_instance_id
}

// =============================================================================
// Duplicate deliveries
// =============================================================================

/// RD-001: A duplicate delivery returns the stored result without calling the wrapper.
#[tokio::test]
async fn test_duplicate_delivery_uses_stored_result() {
    let (ctx, resolutions) = counting_context();
    let id = started_instance(&ctx).await;
    let event = approved_event(id, &[ObjectRef::user(ObjectId::new())]);

    let first = ctx.processor.on_process_event(&event).await.unwrap().unwrap();
    let second = ctx.processor.on_process_event(&event).await.unwrap().unwrap();

    assert!(!first.redelivered);
    assert!(second.redelivered);
    assert_eq!(second.deltas, first.deltas);
    assert_eq!(second.metadata, first.metadata);
    assert_eq!(second.job_id, first.job_id);
    assert_eq!(second.result.status(), OperationStatus::Success);
    assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.stores.ledger.count().await, 1);
}

/// RD-002: A redelivery with a different answer keeps the first resolution.
#[tokio::test]
async fn test_conflicting_redelivery_keeps_first_resolution() {
    let (ctx, resolutions) = counting_context();
    let id = started_instance(&ctx).await;
    let approver = ObjectRef::user(ObjectId::new());

    let first = ctx
        .processor
        .on_process_event(&approved_event(id, &[approver.clone()]))
        .await
        .unwrap()
        .unwrap();
    let conflicting = ctx
        .processor
        .on_process_event(&rejected_event(id, &approver))
        .await
        .unwrap()
        .unwrap();

    assert!(conflicting.redelivered);
    assert_eq!(conflicting.answer, ApprovalOutcome::Approved);
    assert_eq!(conflicting.deltas, first.deltas);
    assert_eq!(conflicting.result.status(), OperationStatus::Warning);
    assert_eq!(resolutions.load(Ordering::SeqCst), 1);

    let ignored = ctx
        .stores
        .audit
        .query_events(
            ctx.tenant_a,
            AuditEventFilter {
                action: Some(WorkflowAuditAction::RedeliveryIgnored),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ignored.len(), 1);
    assert_eq!(
        ignored[0].metadata,
        Some(serde_json::json!({ "payloadMismatch": true }))
    );
}

/// RD-003: Rejections are remembered too.
#[tokio::test]
async fn test_rejection_redelivered_stays_empty() {
    let (ctx, _) = counting_context();
    let id = started_instance(&ctx).await;
    let event = rejected_event(id, &ObjectRef::user(ObjectId::new()));

    ctx.processor.on_process_event(&event).await.unwrap();
    let again = ctx.processor.on_process_event(&event).await.unwrap().unwrap();

    assert!(again.redelivered);
    assert_eq!(again.answer, ApprovalOutcome::Rejected);
    assert!(again.deltas.is_empty());

    let record = ctx.stores.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(record.answer, ApprovalOutcome::Rejected);
}

/// RD-004: Concurrent deliveries resolve the instance exactly once.
#[tokio::test]
async fn test_concurrent_deliveries_resolve_once() {
    let (ctx, _) = counting_context();
    let id = started_instance(&ctx).await;
    let event = approved_event(id, &[ObjectRef::user(ObjectId::new())]);

    let (a, b) = tokio::join!(
        ctx.processor.on_process_event(&event),
        ctx.processor.on_process_event(&event)
    );
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    assert_ne!(a.redelivered, b.redelivered);
    assert_eq!(a.deltas, b.deltas);
    assert_eq!(ctx.stores.ledger.count().await, 1);

    let resolved = ctx
        .stores
        .audit
        .query_events(
            ctx.tenant_a,
            AuditEventFilter {
                action: Some(WorkflowAuditAction::Approved),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
}
