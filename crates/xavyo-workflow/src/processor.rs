//! Primary change processor: the orchestration-side driver of the wrappers.
//!
//! On the way in it runs every wrapper that handles a change, starts one
//! process per extracted sub-delta and records a job for each. On the way out
//! it resolves terminal process events into deltas and approval metadata,
//! exactly once per process instance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditStore, WorkflowAuditAction, WorkflowAuditEventInput};
use crate::completion::{event_fingerprint, CompletionLedger, CompletionRecord};
use crate::context::{ChangesSummary, ModelContext, OperationResult, TaskHandle};
use crate::delta::ObjectDelta;
use crate::engine::ProcessStarter;
use crate::error::{Result, WorkflowError};
use crate::ids::{JobId, ProcessInstanceId, TaskId};
use crate::process::{
    ApprovalMetadata, JobCreationInstruction, PrimaryChangeProcessorJob, ProcessEvent,
};
use crate::registry::WrapperRegistry;
use crate::types::ApprovalOutcome;
use crate::wrapper::base::to_variable;

// ============================================================================
// Job Store
// ============================================================================

/// Storage of jobs, looked up when their process finishes.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, job: PrimaryChangeProcessorJob) -> Result<()>;

    async fn find_by_process_instance(
        &self,
        process_instance_id: ProcessInstanceId,
    ) -> Result<Option<PrimaryChangeProcessorJob>>;

    /// Jobs created for a task, oldest first.
    async fn list_for_task(&self, task_id: TaskId) -> Result<Vec<PrimaryChangeProcessorJob>>;
}

/// In-memory job store for testing.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<ProcessInstanceId, PrimaryChangeProcessorJob>>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn clear(&self) {
        self.jobs.write().await.clear();
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: PrimaryChangeProcessorJob) -> Result<()> {
        self.jobs
            .write()
            .await
            .insert(job.process_instance_id, job);
        Ok(())
    }

    async fn find_by_process_instance(
        &self,
        process_instance_id: ProcessInstanceId,
    ) -> Result<Option<PrimaryChangeProcessorJob>> {
        Ok(self.jobs.read().await.get(&process_instance_id).cloned())
    }

    async fn list_for_task(&self, task_id: TaskId) -> Result<Vec<PrimaryChangeProcessorJob>> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.task_id == task_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of running the wrappers on one change.
#[derive(Debug, Clone)]
pub struct ChangeProcessing {
    /// One job per started process.
    pub jobs: Vec<PrimaryChangeProcessorJob>,
    /// Instructions of the started processes, in the order of `jobs`.
    pub instructions: Vec<JobCreationInstruction>,
    /// Extracted parts whose process could not be started or recorded. They
    /// are neither pending nor applied.
    pub not_started: Vec<JobCreationInstruction>,
    /// What proceeds immediately; `None` when everything went to approval.
    pub remaining: Option<ObjectDelta>,
}

impl ChangeProcessing {
    #[must_use]
    pub fn needs_approval(&self) -> bool {
        !self.jobs.is_empty()
    }
}

/// Resolution of a finished process instance.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub process_instance_id: ProcessInstanceId,
    pub job_id: JobId,
    pub answer: ApprovalOutcome,
    /// Deltas to merge into the execution; empty on rejection.
    pub deltas: Vec<ObjectDelta>,
    pub metadata: ApprovalMetadata,
    /// The instance was already resolved; this is the stored result.
    pub redelivered: bool,
    pub result: OperationResult,
}

impl CompletionOutcome {
    fn from_record(record: CompletionRecord, redelivered: bool, result: OperationResult) -> Self {
        Self {
            process_instance_id: record.process_instance_id,
            job_id: record.job_id,
            answer: record.answer,
            deltas: record.deltas_out,
            metadata: record.metadata,
            redelivered,
            result,
        }
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Drives approval wrappers for the orchestration engine.
pub struct PrimaryChangeProcessor {
    registry: Arc<WrapperRegistry>,
    engine: Arc<dyn ProcessStarter>,
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CompletionLedger>,
    audit: Arc<dyn AuditStore>,
}

impl PrimaryChangeProcessor {
    pub fn new(
        registry: Arc<WrapperRegistry>,
        engine: Arc<dyn ProcessStarter>,
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CompletionLedger>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            registry,
            engine,
            jobs,
            ledger,
            audit,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &WrapperRegistry {
        &self.registry
    }

    /// Run every wrapper that handles `change`, start a process per extracted
    /// sub-delta and record its job.
    ///
    /// `change` itself is not modified; the part that proceeds immediately is
    /// returned in [`ChangeProcessing::remaining`]. Each wrapper reports into
    /// its own subresult of `result`.
    ///
    /// A process that fails to start, or whose job cannot be stored, does not
    /// undo the ones already started: the failure is recorded in `result` and
    /// the instruction is returned in [`ChangeProcessing::not_started`].
    ///
    /// # Errors
    ///
    /// Returns the first wrapper error (schema or not-found), after recording
    /// it in that wrapper's subresult. Nothing has been started at that point.
    #[instrument(
        skip(self, model_context, change, task, result),
        fields(task_id = %task.id, object_type = %change.object_type)
    )]
    pub async fn process_change(
        &self,
        model_context: &ModelContext,
        change: &ObjectDelta,
        task: &TaskHandle,
        result: &mut OperationResult,
    ) -> Result<ChangeProcessing> {
        let summary = ChangesSummary::from_context(model_context);
        debug!(
            state = %summary.state,
            primary_deltas = summary.primary_deltas.len(),
            "Processing change"
        );

        let mut remaining = change.clone();
        let wrappers = self.registry.select(&remaining);
        if wrappers.is_empty() {
            debug!("No approval wrapper handles the change");
            return Ok(ChangeProcessing {
                jobs: Vec::new(),
                instructions: Vec::new(),
                not_started: Vec::new(),
                remaining: Some(remaining),
            });
        }

        let mut extracted = Vec::new();
        for wrapper in wrappers {
            let operation = format!("{}.prepareJobCreationInstructions", wrapper.kind());
            let subresult = result.create_subresult(operation);
            let found = wrapper
                .prepare_job_creation_instructions(model_context, &mut remaining, task, subresult)
                .await;
            match found {
                Ok(mut found) => extracted.append(&mut found),
                Err(e) => {
                    warn!(wrapper = %wrapper.kind(), error = %e, "Extraction failed");
                    subresult.record_error(&e);
                    return Err(e);
                }
            }
        }

        let mut jobs = Vec::with_capacity(extracted.len());
        let mut instructions = Vec::with_capacity(extracted.len());
        let mut not_started = Vec::new();
        for instruction in extracted {
            let job = match self.start_job(model_context, task, &instruction).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(
                        wrapper = %instruction.wrapper_kind,
                        task_name = %instruction.task_name,
                        error = %e,
                        "Approval process not started"
                    );
                    result
                        .create_subresult(format!("{}.startProcess", instruction.wrapper_kind))
                        .record_error(&e);
                    not_started.push(instruction);
                    continue;
                }
            };
            if let Err(e) = self.audit_started(&job, &instruction).await {
                warn!(
                    process_instance_id = %job.process_instance_id,
                    error = %e,
                    "Process start not audited"
                );
                result.record_warning(format!(
                    "start of process instance {} was not audited: {e}",
                    job.process_instance_id
                ));
            }
            jobs.push(job);
            instructions.push(instruction);
        }

        let remaining = if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        };
        info!(
            started = jobs.len(),
            not_started = not_started.len(),
            proceeds = remaining.is_some(),
            "Change split for approval"
        );

        Ok(ChangeProcessing {
            jobs,
            instructions,
            not_started,
            remaining,
        })
    }

    /// Start the process for `instruction` and store its job.
    async fn start_job(
        &self,
        model_context: &ModelContext,
        task: &TaskHandle,
        instruction: &JobCreationInstruction,
    ) -> Result<PrimaryChangeProcessorJob> {
        let process_instance_id = self.engine.start_process(instruction).await?;
        let job = PrimaryChangeProcessorJob::new(
            process_instance_id,
            task.id,
            model_context.tenant_id,
            instruction.wrapper_kind,
            instruction.deltas_to_approve.clone(),
        );
        self.jobs.save(job.clone()).await?;

        debug!(
            process_instance_id = %process_instance_id,
            job_id = %job.id,
            wrapper = %job.wrapper_kind,
            "Approval process started"
        );
        Ok(job)
    }

    async fn audit_started(
        &self,
        job: &PrimaryChangeProcessorJob,
        instruction: &JobCreationInstruction,
    ) -> Result<()> {
        self.audit
            .log_event(WorkflowAuditEventInput {
                tenant_id: job.tenant_id,
                process_instance_id: Some(job.process_instance_id),
                job_id: Some(job.id),
                wrapper_kind: Some(job.wrapper_kind),
                action: WorkflowAuditAction::ProcessStarted,
                actors: vec![instruction.requester.clone()],
                deltas: Some(to_variable(&job.deltas_in)?),
                metadata: Some(serde_json::json!({
                    "processName": instruction.process_name,
                    "taskName": instruction.task_name,
                })),
            })
            .await?;
        Ok(())
    }

    /// Resolve a process event.
    ///
    /// Running events are ignored (`Ok(None)`). A terminal event is resolved
    /// by the wrapper that started the process the first time it arrives;
    /// later deliveries for the same instance return the stored resolution
    /// with `redelivered` set and do not call the wrapper again.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::JobNotFound` for unknown instances, and the
    /// wrapper's schema errors for events it cannot map back to deltas.
    #[instrument(
        skip(self, event),
        fields(process_instance_id = %event.process_instance_id)
    )]
    pub async fn on_process_event(
        &self,
        event: &ProcessEvent,
    ) -> Result<Option<CompletionOutcome>> {
        if !event.is_terminal() {
            debug!("Ignoring event of running process");
            return Ok(None);
        }

        let fingerprint = event_fingerprint(event)?;
        if let Some(record) = self.ledger.get(event.process_instance_id).await? {
            return self.redelivered(record, &fingerprint).await.map(Some);
        }

        let job = self
            .jobs
            .find_by_process_instance(event.process_instance_id)
            .await?
            .ok_or(WorkflowError::JobNotFound {
                process_instance_id: event.process_instance_id,
            })?;
        let wrapper = self.registry.get(job.wrapper_kind)?;

        let mut result = OperationResult::new("onProcessEvent");
        let deltas = wrapper.prepare_delta_out(event, &job, &mut result)?;
        let approvers = wrapper.approved_by(event)?;
        let answer = event.answer.ok_or_else(|| {
            WorkflowError::schema(format!(
                "process instance {} finished without an answer",
                event.process_instance_id
            ))
        })?;

        let record = CompletionRecord {
            process_instance_id: event.process_instance_id,
            job_id: job.id,
            tenant_id: job.tenant_id,
            wrapper_kind: job.wrapper_kind,
            answer,
            metadata: ApprovalMetadata::for_deltas(approvers.clone(), &deltas),
            deltas_out: deltas,
            fingerprint,
            completed_at: Utc::now(),
        };
        let fingerprint = record.fingerprint.clone();
        let (stored, inserted) = self.ledger.record_if_absent(record).await?;
        if !inserted {
            // Another delivery resolved the instance first.
            return self.redelivered(stored, &fingerprint).await.map(Some);
        }

        let action = if answer.is_approved() {
            WorkflowAuditAction::Approved
        } else {
            WorkflowAuditAction::Rejected
        };
        self.audit
            .log_event(WorkflowAuditEventInput {
                tenant_id: stored.tenant_id,
                process_instance_id: Some(stored.process_instance_id),
                job_id: Some(stored.job_id),
                wrapper_kind: Some(stored.wrapper_kind),
                action,
                actors: approvers,
                deltas: Some(to_variable(&stored.deltas_out)?),
                metadata: None,
            })
            .await?;

        info!(
            answer = %answer,
            released = stored.deltas_out.len(),
            "Approval process resolved"
        );
        Ok(Some(CompletionOutcome::from_record(stored, false, result)))
    }

    async fn redelivered(
        &self,
        record: CompletionRecord,
        fingerprint: &str,
    ) -> Result<CompletionOutcome> {
        let mut result = OperationResult::new("onProcessEvent");
        let mismatch = record.fingerprint != fingerprint;
        if mismatch {
            warn!(
                stored = %record.fingerprint,
                received = %fingerprint,
                "Redelivered completion event differs from the resolved one"
            );
            result.record_warning(
                "redelivered event differs from the resolved one; stored result kept",
            );
        } else {
            debug!("Completion event redelivered");
        }

        self.audit
            .log_event(WorkflowAuditEventInput {
                tenant_id: record.tenant_id,
                process_instance_id: Some(record.process_instance_id),
                job_id: Some(record.job_id),
                wrapper_kind: Some(record.wrapper_kind),
                action: WorkflowAuditAction::RedeliveryIgnored,
                actors: Vec::new(),
                deltas: None,
                metadata: Some(serde_json::json!({ "payloadMismatch": mismatch })),
            })
            .await?;

        Ok(CompletionOutcome::from_record(record, true, result))
    }

    /// Jobs started for a task, oldest first.
    pub async fn jobs_for_task(&self, task_id: TaskId) -> Result<Vec<PrimaryChangeProcessorJob>> {
        self.jobs.list_for_task(task_id).await
    }
}
