//! Collection and index definitions
//!
//! Every collection is a `(key, body)` table holding JSON records. Secondary
//! indices are expression indices over `json_extract(body, ...)`, so adding
//! an index later also covers rows written before it existed.

use std::fmt;

/// A typed collection in the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    Users,
    Teams,
    Memberships,
    Tickets,
    TimeEntries,
    Assignments,
    SyncQueue,
    ActivityLog,
}

impl CollectionName {
    /// Collections created by schema version 1
    pub const V1: [Self; 7] = [
        Self::Users,
        Self::Teams,
        Self::Memberships,
        Self::Tickets,
        Self::TimeEntries,
        Self::Assignments,
        Self::SyncQueue,
    ];

    /// Backing table name
    pub const fn table(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Teams => "teams",
            Self::Memberships => "memberships",
            Self::Tickets => "tickets",
            Self::TimeEntries => "time_entries",
            Self::Assignments => "assignments",
            Self::SyncQueue => "sync_queue",
            Self::ActivityLog => "activity_log",
        }
    }

    /// Secondary indices declared for this collection
    pub const fn indices(self) -> &'static [Index] {
        match self {
            Self::Users | Self::Teams => &[],
            Self::Memberships => &[Index::ByUser, Index::ByTeam],
            Self::Tickets => &[Index::ByTeam, Index::PendingSync],
            Self::TimeEntries => &[
                Index::ByUser,
                Index::ByTeam,
                Index::ByTicket,
                Index::PendingSync,
            ],
            Self::Assignments => &[Index::ByTeam, Index::ByTicket],
            Self::SyncQueue => &[Index::ByCreatedAt],
            Self::ActivityLog => &[Index::ByTimestamp, Index::ByType, Index::PendingSync],
        }
    }

    /// Whether `index` is declared for this collection
    pub fn has_index(self, index: Index) -> bool {
        self.indices().contains(&index)
    }

    /// DDL that creates the table and its indices if missing
    pub fn create_statements(self) -> Vec<String> {
        let table = self.table();
        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL
            )"
        )];
        for index in self.indices() {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{name} ON {table}({expr})",
                name = index.name(),
                expr = index.expression(),
            ));
        }
        statements
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A secondary index over a JSON field of the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    ByUser,
    ByTeam,
    ByTicket,
    PendingSync,
    ByCreatedAt,
    ByTimestamp,
    ByType,
}

impl Index {
    pub const fn name(self) -> &'static str {
        match self {
            Self::ByUser => "by_user",
            Self::ByTeam => "by_team",
            Self::ByTicket => "by_ticket",
            Self::PendingSync => "pending_sync",
            Self::ByCreatedAt => "by_created_at",
            Self::ByTimestamp => "by_timestamp",
            Self::ByType => "by_type",
        }
    }

    /// JSON path of the indexed field
    pub const fn json_path(self) -> &'static str {
        match self {
            Self::ByUser => "$.userId",
            Self::ByTeam => "$.teamId",
            Self::ByTicket => "$.ticketId",
            Self::PendingSync => "$.pendingSync",
            Self::ByCreatedAt => "$.createdAt",
            Self::ByTimestamp => "$.timestamp",
            Self::ByType => "$.type",
        }
    }

    /// SQL expression shared by the index definition and lookups, so the
    /// planner can use the index
    pub fn expression(self) -> String {
        format!("json_extract(body, '{}')", self.json_path())
    }
}

/// A lookup value for an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Text(String),
    Flag(bool),
}

impl From<IndexValue> for libsql::Value {
    fn from(value: IndexValue) -> Self {
        match value {
            IndexValue::Text(text) => Self::Text(text),
            // json_extract yields 1/0 for JSON booleans
            IndexValue::Flag(flag) => Self::Integer(i64::from(flag)),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

macro_rules! index_value_from_id {
    ($($id:ty),*) => {
        $(impl From<&$id> for IndexValue {
            fn from(value: &$id) -> Self {
                Self::Text(value.as_str().to_string())
            }
        })*
    };
}

index_value_from_id!(
    crate::models::UserId,
    crate::models::TeamId,
    crate::models::TicketId
);
