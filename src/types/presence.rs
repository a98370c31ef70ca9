use serde::{Deserialize, Serialize};

use crate::types::User;

/// The online roster as of one poll.
///
/// Each successful poll replaces the previous snapshot wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceSnapshot {
    /// Users currently online.
    #[serde(default)]
    pub online_users: Vec<User>,

    /// Number of users online, as counted by the service.
    #[serde(default)]
    pub total_online: u64,
}

impl PresenceSnapshot {
    /// Create a new snapshot.
    pub fn new(online_users: Vec<User>, total_online: u64) -> Self {
        Self {
            online_users,
            total_online,
        }
    }

    /// Returns true if a user with the given login is online.
    pub fn is_online(&self, login: &str) -> bool {
        self.online_users.iter().any(|u| u.login == login)
    }
}

/// Aggregate counters shown next to the feed.
///
/// The two counters come from separate requests and are updated
/// independently; `None` means no value has been fetched yet.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerStats {
    /// Total messages stored by the service.
    pub total_messages: Option<u64>,

    /// Total registered users.
    pub total_users: Option<u64>,
}

/// Body returned by the `/count` endpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountResponse {
    /// The count.
    pub count: u64,
}
