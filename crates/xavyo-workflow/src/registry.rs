//! Wrapper lookup by kind and by delta content.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::WorkflowConfig;
use crate::delta::ObjectDelta;
use crate::engine::{ProcessVariables, WorkItemTask};
use crate::error::{Result, WorkflowError};
use crate::object::ObjectResolver;
use crate::process::ProcessInstanceDescriptor;
use crate::types::{PanelRef, WrapperKind};
use crate::work_item::{ViewContext, WorkItemView};
use crate::wrapper::{
    AddRoleWrapper, AttributeChangeWrapper, CreateUserWrapper, PrimaryApprovalProcessWrapper,
};

/// Registered wrappers in registration order.
///
/// Order matters for selection: a user creation wrapper registered before the
/// role wrapper takes the whole add delta, leaving no assignments behind.
#[derive(Default)]
pub struct WrapperRegistry {
    wrappers: Vec<Arc<dyn PrimaryApprovalProcessWrapper>>,
}

impl WrapperRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry the configuration enables.
    pub fn from_config(config: &WorkflowConfig, resolver: Arc<dyn ObjectResolver>) -> Self {
        let mut registry = Self::new();
        if config.create_user_enabled {
            registry.register(Arc::new(CreateUserWrapper::new(
                resolver.clone(),
                config.user_approval_process.clone(),
            )));
        }
        if config.add_role_enabled {
            registry.register(Arc::new(AddRoleWrapper::new(
                resolver.clone(),
                config.role_approval_process.clone(),
            )));
        }
        if config.attribute_approval_enabled() {
            registry.register(Arc::new(AttributeChangeWrapper::new(
                resolver,
                config.watched_attributes.clone(),
                config.attribute_approval_process.clone(),
            )));
        }
        info!(wrappers = ?registry.kinds(), "Approval wrappers registered");
        registry
    }

    /// Register a wrapper, replacing any wrapper of the same kind in place.
    pub fn register(&mut self, wrapper: Arc<dyn PrimaryApprovalProcessWrapper>) {
        let kind = wrapper.kind();
        match self.wrappers.iter_mut().find(|w| w.kind() == kind) {
            Some(existing) => *existing = wrapper,
            None => self.wrappers.push(wrapper),
        }
    }

    /// Wrapper for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::WrapperNotRegistered` when no wrapper of that
    /// kind is registered.
    pub fn get(&self, kind: WrapperKind) -> Result<Arc<dyn PrimaryApprovalProcessWrapper>> {
        self.wrappers
            .iter()
            .find(|w| w.kind() == kind)
            .cloned()
            .ok_or(WorkflowError::WrapperNotRegistered { kind })
    }

    /// Wrappers with something to extract from `delta`, in registration order.
    #[must_use]
    pub fn select(&self, delta: &ObjectDelta) -> Vec<Arc<dyn PrimaryApprovalProcessWrapper>> {
        let selected: Vec<_> = self
            .wrappers
            .iter()
            .filter(|w| w.handles(delta))
            .cloned()
            .collect();
        debug!(
            object_type = %delta.object_type,
            selected = selected.len(),
            "Selected approval wrappers"
        );
        selected
    }

    /// Display component for a process instance.
    pub fn panel_for(&self, descriptor: &ProcessInstanceDescriptor) -> Result<PanelRef> {
        Ok(self
            .get(descriptor.wrapper_kind)?
            .process_instance_details_panel(descriptor))
    }

    /// Form and related object of a pending work item, built by the wrapper
    /// that started its process.
    pub async fn work_item_view(
        &self,
        kind: WrapperKind,
        task: &dyn WorkItemTask,
        variables: &dyn ProcessVariables,
        context: &ViewContext,
    ) -> Result<WorkItemView> {
        let wrapper = self.get(kind)?;
        let request = wrapper.request_specific_data(task, variables, context).await?;
        let related = wrapper.related_object(task, variables, context).await?;
        Ok(WorkItemView::new(task, request, related))
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<WrapperKind> {
        self.wrappers.iter().map(|w| w.kind()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}
