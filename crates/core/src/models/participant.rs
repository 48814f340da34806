//! Participant and role models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Controls the round lifecycle (start/reveal/reset)
    Host,
    /// Standard participant
    Voter,
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Voter => write!(f, "voter"),
        }
    }
}

/// A member of a Room
///
/// The id is generated at join time and stable for the room's lifetime.
/// `join_seq` is a per-room monotonic counter used as the host-migration
/// tie-break; wall-clock `joined_at` alone cannot break ties between two
/// joins inside the same clock tick.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
    pub join_seq: u64,
}

impl Participant {
    pub fn new(display_name: String, role: Role, join_seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            role,
            joined_at: Utc::now(),
            join_seq,
        }
    }
}
