//! Ticket assignment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AssignmentId, TeamId, TicketId, UserId};

/// A ticket assigned to a team member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    pub team_id: TeamId,
    pub ticket_id: TicketId,
    pub assignee_user_id: UserId,
    pub assigned_by: UserId,
    pub assigned_at: DateTime<Utc>,
}

impl Assignment {
    /// Create a new local assignment
    #[must_use]
    pub fn new(
        team_id: TeamId,
        ticket_id: TicketId,
        assignee_user_id: UserId,
        assigned_by: UserId,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            team_id,
            ticket_id,
            assignee_user_id,
            assigned_by,
            assigned_at: Utc::now(),
        }
    }
}
