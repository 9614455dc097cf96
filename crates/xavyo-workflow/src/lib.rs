//! # xavyo-workflow
//!
//! Primary-stage change approval for xavyo.
//!
//! Changes produced by change orchestration pass through approval process
//! wrappers before they execute. Each wrapper recognizes one kind of
//! approval-relevant change (role assignment, watched attribute modification,
//! user creation), removes it from the change and describes the approval
//! process to start for it. The rest of the change proceeds immediately. When
//! a process finishes, the wrapper turns its outcome back into deltas: none on
//! rejection, the original or approver-edited deltas on approval.
//!
//! ## Features
//!
//! - **Wrappers**: [`PrimaryApprovalProcessWrapper`] with role, attribute and
//!   user creation variants
//! - **Registry**: wrapper lookup by kind and by delta content
//! - **Processor**: process start, job tracking and once-per-instance resolution
//! - **Work items**: approver-facing forms and related objects
//! - **Audit**: trail of started and resolved processes
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xavyo_workflow::{
//!     InMemoryAuditStore, InMemoryCompletionLedger, InMemoryJobStore, InMemoryObjectStore,
//!     InMemoryProcessEngine, OperationResult, PrimaryChangeProcessor, WorkflowConfig,
//!     WrapperRegistry,
//! };
//!
//! let config = WorkflowConfig::from_env()?;
//! let objects = Arc::new(InMemoryObjectStore::new());
//! let registry = Arc::new(WrapperRegistry::from_config(&config, objects));
//! let processor = PrimaryChangeProcessor::new(
//!     registry,
//!     Arc::new(InMemoryProcessEngine::new()),
//!     Arc::new(InMemoryJobStore::new()),
//!     Arc::new(InMemoryCompletionLedger::new()),
//!     Arc::new(InMemoryAuditStore::new()),
//! );
//!
//! let mut result = OperationResult::new("processChange");
//! let processing = processor
//!     .process_change(&model_context, &change, &task, &mut result)
//!     .await?;
//! // later, when the engine reports back
//! let outcome = processor.on_process_event(&event).await?;
//! ```

pub mod audit;
pub mod completion;
pub mod config;
pub mod context;
pub mod delta;
pub mod engine;
pub mod error;
pub mod ids;
pub mod object;
pub mod process;
pub mod processor;
pub mod registry;
pub mod types;
pub mod work_item;
pub mod wrapper;

// Re-export commonly used types
pub use audit::{
    AuditEventFilter, AuditStore, InMemoryAuditStore, WorkflowAuditAction, WorkflowAuditEvent,
    WorkflowAuditEventInput,
};
pub use completion::{CompletionLedger, CompletionRecord, InMemoryCompletionLedger};
pub use config::{ConfigError, WorkflowConfig};
pub use context::{
    ChangesSummary, FocusContext, ModelContext, OperationResult, OperationStatus,
    ProjectionContext, TaskHandle,
};
pub use delta::{AssignmentValue, ChangeType, ItemDelta, ObjectDelta, TimeInterval};
pub use engine::{
    EngineTask, InMemoryProcessEngine, ProcessStarter, ProcessVariables, WorkItemTask,
};
pub use error::{Result, WorkflowError};
pub use ids::{JobId, ObjectId, ProcessInstanceId, TaskId, TenantId, WorkItemId};
pub use object::{InMemoryObjectStore, ManagedObject, ObjectRef, ObjectResolver};
pub use process::{
    ApprovalDecision, ApprovalMetadata, JobCreationInstruction, PrimaryChangeProcessorJob,
    ProcessEvent, ProcessInstanceDescriptor,
};
pub use processor::{
    ChangeProcessing, CompletionOutcome, InMemoryJobStore, JobStore, PrimaryChangeProcessor,
};
pub use registry::WrapperRegistry;
pub use types::{ApprovalOutcome, AssignmentKind, ModelState, ObjectType, PanelRef, WrapperKind};
pub use work_item::{
    AttributeChangeForm, RequestSpecificData, RoleApprovalForm, UserCreationForm, ViewContext,
    WorkItemView,
};
pub use wrapper::{
    AddRoleWrapper, AttributeChangeWrapper, CreateUserWrapper, PrimaryApprovalProcessWrapper,
};
