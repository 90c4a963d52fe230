//! Entity identifiers
//!
//! Ids are opaque strings: locally generated ids are UUID v7 (time-sortable),
//! server-issued ids may take any form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new locally unique id using UUID v7
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Get the string representation of this id
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Identifier of a user account
    UserId
);
entity_id!(
    /// Identifier of a team
    TeamId
);
entity_id!(
    /// Identifier of a ticket
    TicketId
);
entity_id!(
    /// Identifier of a note attached to a ticket
    NoteId
);
entity_id!(
    /// Identifier of a time entry
    TimeEntryId
);
entity_id!(
    /// Identifier of a ticket assignment
    AssignmentId
);
entity_id!(
    /// Identifier of an activity log entry
    ActivityId
);
entity_id!(
    /// Identifier of a sync queue item
    QueueItemId
);
