//! Error types for primary-stage change approval.
//!
//! Two kinds are domain-visible and must reach the orchestration engine
//! untouched: schema violations and missing objects. The remaining variants
//! describe wiring problems (unregistered wrappers, unknown jobs, bad
//! configuration) and infrastructure failures.
//!
//! # Example
//!
//! ```
//! use xavyo_workflow::{Result, WorkflowError};
//!
//! fn parse_stage(raw: &str) -> Result<u32> {
//!     raw.parse().map_err(|_| WorkflowError::schema(format!("invalid stage '{raw}'")))
//! }
//!
//! assert!(parse_stage("x").unwrap_err().is_domain_visible());
//! ```

use thiserror::Error;

use crate::ids::ProcessInstanceId;
use crate::types::WrapperKind;

/// Error raised by wrappers, the registry and the change processor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// The change, event or variable set cannot be interpreted under the object schema.
    #[error("schema violation: {message}")]
    Schema {
        /// What could not be interpreted.
        message: String,
    },

    /// A referenced object no longer exists.
    #[error(
        "{object_type} not found{}",
        .oid.as_ref().map(|o| format!(": {o}")).unwrap_or_default()
    )]
    ObjectNotFound {
        /// Type of the missing object (e.g. "role").
        object_type: String,
        /// Identifier of the missing object, when known.
        oid: Option<String>,
    },

    /// No wrapper is registered for the requested kind.
    #[error("no process wrapper registered for kind '{kind}'")]
    WrapperNotRegistered { kind: WrapperKind },

    /// A process event refers to an instance no job was created for.
    #[error("no job found for process instance {process_instance_id}")]
    JobNotFound {
        process_instance_id: ProcessInstanceId,
    },

    /// Invalid workflow configuration.
    #[error("invalid configuration for {var}: {reason}")]
    Config { var: String, reason: String },

    /// The process engine could not start or look up a process.
    #[error("process engine error: {message}")]
    Engine { message: String },

    /// Failed to serialize a delta or snapshot for storage.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl WorkflowError {
    /// Shorthand for a schema violation.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Shorthand for a missing object.
    pub fn not_found(object_type: impl Into<String>, oid: impl ToString) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            oid: Some(oid.to_string()),
        }
    }

    /// Whether the error belongs to the two kinds the orchestration engine
    /// decides on (fail the change or report partial failure).
    #[must_use]
    pub fn is_domain_visible(&self) -> bool {
        matches!(
            self,
            WorkflowError::Schema { .. } | WorkflowError::ObjectNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Schema {
            message: err.to_string(),
        }
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
