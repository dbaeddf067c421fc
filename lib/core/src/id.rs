//! Strongly-typed ID types for domain entities.
//!
//! All IDs wrap a ULID, which gives uniqueness plus temporal ordering, and
//! render with a short prefix (`wf_...`, `sjob_...`) for log readability.
//!
//! Node ids are deliberately *not* defined here: they are assigned by the
//! workflow designer and live in the workflow crate as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Generates a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let prefixed = concat!($prefix, "_");
                let ulid_str = s.strip_prefix(prefixed).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a workflow definition.
    WorkflowId,
    "wf"
);

define_id!(
    /// Unique identifier for a single execution (run) of a workflow.
    WorkflowRunId,
    "run"
);

define_id!(
    /// Unique identifier for a trigger registration.
    TriggerId,
    "trg"
);

define_id!(
    /// Unique identifier for a scheduled job configuration.
    ScheduledJobId,
    "sjob"
);

define_id!(
    /// Unique identifier for an integration account.
    IntegrationAccountId,
    "int"
);

define_id!(
    /// Unique identifier for a node execution record within a workflow run.
    NodeExecutionId,
    "nexec"
);

define_id!(
    /// Unique identifier for a server process instance.
    ///
    /// Used as the distributed-lock value so an instance can recognize its
    /// own lock ownership.
    InstanceId,
    "inst"
);
