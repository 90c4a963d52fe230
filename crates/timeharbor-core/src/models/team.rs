//! Users, teams and memberships

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TeamId, UserId};

/// A user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A team; written only by pulls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Role of a user within a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Member,
}

/// A user's membership in a team, keyed by `(user_id, team_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// Composite primary key used by the store
    #[must_use]
    pub fn key_for(user_id: &UserId, team_id: &TeamId) -> String {
        format!("{user_id}\u{1f}{team_id}")
    }
}

/// A membership joined with its user, as returned by `members.list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(flatten)]
    pub membership: Membership,
    pub user: User,
}
