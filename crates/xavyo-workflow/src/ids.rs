//! Strongly typed identifiers.
//!
//! Process instances, jobs, tasks and repository objects are all keyed by
//! UUIDs; the newtypes keep a job id from being passed where a process
//! instance id is expected.
//!
//! ```
//! use xavyo_workflow::ids::{JobId, ProcessInstanceId};
//!
//! let instance = ProcessInstanceId::new();
//! let parsed: ProcessInstanceId = instance.to_string().parse().unwrap();
//! assert_eq!(instance, parsed);
//!
//! fn lookup(_job: JobId) {}
//! // lookup(instance); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// Which identifier failed to parse.
    pub id_type: &'static str,
    /// Underlying UUID parser message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    message: e.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// Tenant owning a change and every job derived from it.
    TenantId
);

define_id!(
    /// Identifier of a repository object (user, role, org, service).
    ObjectId
);

define_id!(
    /// Identifier of a process instance in the external process engine.
    ProcessInstanceId
);

define_id!(
    /// Identifier of a job pairing a process instance with its task.
    JobId
);

define_id!(
    /// Identifier of the orchestration task a change runs in.
    TaskId
);

define_id!(
    /// Identifier of a human work item (engine-side user task).
    WorkItemId
);
