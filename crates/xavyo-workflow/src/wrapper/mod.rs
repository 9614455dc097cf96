//! Approval process wrappers.
//!
//! A wrapper mediates between change orchestration and one kind of approval
//! process. On the way in it carves the sub-deltas it cares about out of a
//! change and describes the processes to start. On the way out it turns the
//! finished process back into deltas and approver metadata. In between it
//! builds the views approvers work with.
//!
//! Variants:
//!
//! - [`AddRoleWrapper`]: role, org and service assignment additions
//! - [`AttributeChangeWrapper`]: modifications of watched user attributes
//! - [`CreateUserWrapper`]: creation of users

mod add_role;
mod attribute_change;
pub mod base;
mod create_user;

pub use add_role::AddRoleWrapper;
pub use attribute_change::AttributeChangeWrapper;
pub use create_user::CreateUserWrapper;

use async_trait::async_trait;

use crate::context::{ModelContext, OperationResult, TaskHandle};
use crate::delta::ObjectDelta;
use crate::engine::{ProcessVariables, WorkItemTask};
use crate::error::Result;
use crate::object::{ManagedObject, ObjectRef};
use crate::process::{
    JobCreationInstruction, PrimaryChangeProcessorJob, ProcessEvent, ProcessInstanceDescriptor,
};
use crate::types::{PanelRef, WrapperKind};
use crate::work_item::{RequestSpecificData, ViewContext};

/// Contract every approval process wrapper fulfils.
///
/// Implementations are stateless between calls. Schema and not-found errors
/// are returned to the caller as they are.
#[async_trait]
pub trait PrimaryApprovalProcessWrapper: Send + Sync {
    /// Tag of this variant.
    fn kind(&self) -> WrapperKind;

    /// Whether `delta` contains anything this wrapper would extract.
    fn handles(&self, delta: &ObjectDelta) -> bool;

    /// Remove the approval-relevant sub-deltas from `change` and describe one
    /// process per sub-delta.
    ///
    /// Leaves `change` untouched when nothing matches or when an error is
    /// returned. Never modifies `task`.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the change cannot be interpreted, or a
    /// not-found error if an object it references is missing.
    async fn prepare_job_creation_instructions(
        &self,
        model_context: &ModelContext,
        change: &mut ObjectDelta,
        task: &TaskHandle,
        result: &mut OperationResult,
    ) -> Result<Vec<JobCreationInstruction>>;

    /// Deltas resulting from a finished process: none on rejection, the
    /// approved deltas otherwise.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the event has no answer or its edited deltas
    /// cannot be read.
    fn prepare_delta_out(
        &self,
        event: &ProcessEvent,
        job: &PrimaryChangeProcessorJob,
        result: &mut OperationResult,
    ) -> Result<Vec<ObjectDelta>> {
        base::prepare_delta_out(event, job, result)
    }

    /// Principals who approved, in decision order, each listed once.
    ///
    /// The default reads the single-stage item-approval decision list.
    fn approved_by(&self, event: &ProcessEvent) -> Result<Vec<ObjectRef>> {
        base::approved_by(event)
    }

    /// Form shown to the approver of a pending work item.
    async fn request_specific_data(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<RequestSpecificData>;

    /// The object a work item is about.
    async fn related_object(
        &self,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<ManagedObject>;

    /// Display component for an instance of this process kind.
    fn process_instance_details_panel(&self, descriptor: &ProcessInstanceDescriptor) -> PanelRef;
}
