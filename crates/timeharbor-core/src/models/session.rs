//! Persisted session

use serde::{Deserialize, Serialize};

use super::{TeamId, UserId};

/// Signed-in user and the team the application is working in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_team_id: Option<TeamId>,
}
