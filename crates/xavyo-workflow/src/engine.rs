//! Narrow capabilities of the external business-process engine.
//!
//! Wrappers never see an engine's own task or variable types. An adapter for
//! a concrete engine implements [`WorkItemTask`], [`ProcessVariables`] and
//! [`ProcessStarter`]; [`InMemoryProcessEngine`] stands in for tests.
//!
//! ```
//! use std::collections::HashMap;
//! use serde_json::json;
//! use xavyo_workflow::engine::ProcessVariables;
//!
//! let mut raw = HashMap::new();
//! raw.insert("requesterComment".to_string(), json!("for the audit"));
//! let vars: &dyn ProcessVariables = &raw;
//!
//! let comment: Option<String> = vars.optional("requesterComment").unwrap();
//! assert_eq!(comment.as_deref(), Some("for the audit"));
//! assert!(vars.required::<String>("objectRef").is_err());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{Result, WorkflowError};
use crate::ids::{ProcessInstanceId, WorkItemId};
use crate::object::ObjectRef;
use crate::process::JobCreationInstruction;

// ============================================================================
// Variables
// ============================================================================

/// Read access to a process instance's variables.
pub trait ProcessVariables: Send + Sync {
    /// Raw value of a variable.
    fn variable(&self, name: &str) -> Option<&Value>;
}

impl ProcessVariables for HashMap<String, Value> {
    fn variable(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl ProcessVariables for Map<String, Value> {
    fn variable(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl dyn ProcessVariables + '_ {
    /// Typed value of an optional variable. Absent and `null` are both `None`.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the variable is present but of the wrong shape.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.variable(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| WorkflowError::schema(format!("process variable '{name}': {e}"))),
        }
    }

    /// Typed value of a variable the process must carry.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the variable is missing or of the wrong shape.
    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.optional(name)?
            .ok_or_else(|| WorkflowError::schema(format!("missing process variable '{name}'")))
    }
}

// ============================================================================
// Work item tasks
// ============================================================================

/// An engine-side human task, as much as wrappers need to know about it.
pub trait WorkItemTask: Send + Sync {
    fn work_item_id(&self) -> WorkItemId;

    fn process_instance_id(&self) -> ProcessInstanceId;

    fn name(&self) -> &str;

    /// Principal the task is assigned to, if claimed.
    fn assignee(&self) -> Option<&ObjectRef>;
}

/// Plain work-item task record for adapters and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTask {
    pub id: WorkItemId,
    pub process_instance_id: ProcessInstanceId,
    pub name: String,
    pub assignee: Option<ObjectRef>,
}

impl EngineTask {
    pub fn new(process_instance_id: ProcessInstanceId, name: impl Into<String>) -> Self {
        Self {
            id: WorkItemId::new(),
            process_instance_id,
            name: name.into(),
            assignee: None,
        }
    }

    #[must_use]
    pub fn assigned_to(mut self, assignee: ObjectRef) -> Self {
        self.assignee = Some(assignee);
        self
    }
}

impl WorkItemTask for EngineTask {
    fn work_item_id(&self) -> WorkItemId {
        self.id
    }

    fn process_instance_id(&self) -> ProcessInstanceId {
        self.process_instance_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn assignee(&self) -> Option<&ObjectRef> {
        self.assignee.as_ref()
    }
}

// ============================================================================
// Process start
// ============================================================================

/// Starts approval processes from start instructions.
#[async_trait]
pub trait ProcessStarter: Send + Sync {
    async fn start_process(&self, instruction: &JobCreationInstruction)
        -> Result<ProcessInstanceId>;
}

/// Records start instructions instead of running processes.
#[derive(Debug, Default)]
pub struct InMemoryProcessEngine {
    started: Arc<RwLock<Vec<(ProcessInstanceId, JobCreationInstruction)>>>,
}

impl InMemoryProcessEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Started instances in start order.
    pub async fn started(&self) -> Vec<(ProcessInstanceId, JobCreationInstruction)> {
        self.started.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.started.read().await.len()
    }
}

#[async_trait]
impl ProcessStarter for InMemoryProcessEngine {
    async fn start_process(
        &self,
        instruction: &JobCreationInstruction,
    ) -> Result<ProcessInstanceId> {
        let id = ProcessInstanceId::new();
        self.started.write().await.push((id, instruction.clone()));
        Ok(id)
    }
}
