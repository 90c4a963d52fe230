//! Data models for Time Harbor

mod activity;
mod assignment;
mod ids;
mod session;
mod sync_item;
mod team;
mod ticket;
mod time_entry;

pub use activity::{ActivityKind, ActivityLogEntry};
pub use assignment::Assignment;
pub use ids::{
    ActivityId, AssignmentId, NoteId, QueueItemId, TeamId, TicketId, TimeEntryId, UserId,
};
pub use session::Session;
pub use sync_item::{Change, EntityKind, OperationKind, SyncMutation, SyncQueueItem};
pub use team::{Member, Membership, Role, Team, User};
pub use ticket::{Ticket, TicketNote, TicketStatus, TicketUpdate};
pub use time_entry::{elapsed_ms, ActiveTimer, ClockState, EntrySource, TimeEntry};
