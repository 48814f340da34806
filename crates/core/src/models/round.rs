//! Voting round state machine
//!
//! One estimation cycle: Idle -> Voting -> Revealed -> Idle. Transitions
//! bump `epoch` so a deadline timer armed against an earlier round can
//! detect it is stale and do nothing.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deck::{Deck, VoteValue};
use crate::error::{Error, Result};

/// Longest deadline a round may be given (24 hours). Also keeps the
/// value safely inside chrono's Duration range, which panics on
/// out-of-bounds seconds.
pub const MAX_ROUND_DURATION_SECS: u64 = 86_400;

/// Round lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundState {
    Idle,
    Voting,
    Revealed,
}

/// One voting round within a Room
#[derive(Debug, Clone)]
pub struct VotingRound {
    pub state: RoundState,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub votes: HashMap<Uuid, VoteValue>,
    /// Bumped on every transition; stale-timer guard
    pub epoch: u64,
}

impl VotingRound {
    pub fn new() -> Self {
        Self {
            state: RoundState::Idle,
            started_at: None,
            deadline: None,
            votes: HashMap::new(),
            epoch: 0,
        }
    }

    /// Idle|Revealed -> Voting. Clears votes; an optional duration sets the
    /// auto-reveal deadline.
    pub fn start(&mut self, duration_seconds: Option<u64>) -> Result<()> {
        if self.state == RoundState::Voting {
            return Err(Error::StateConflict("voting already in progress".into()));
        }
        if let Some(secs) = duration_seconds {
            if secs == 0 || secs > MAX_ROUND_DURATION_SECS {
                return Err(Error::Validation(format!(
                    "duration must be between 1 and {} seconds",
                    MAX_ROUND_DURATION_SECS
                )));
            }
        }

        let now = Utc::now();
        self.state = RoundState::Voting;
        self.started_at = Some(now);
        self.deadline = duration_seconds.map(|secs| now + Duration::seconds(secs as i64));
        self.votes.clear();
        self.epoch += 1;
        Ok(())
    }

    /// Record a vote. Legal only while Voting; the value must come from the
    /// deck. Re-voting overwrites the prior value.
    pub fn cast(&mut self, participant_id: Uuid, value: VoteValue, deck: &Deck) -> Result<()> {
        if self.state != RoundState::Voting {
            return Err(Error::StateConflict("no voting in progress".into()));
        }
        if !deck.contains(&value) {
            return Err(Error::Validation(format!(
                "vote value {} is not in the deck",
                value
            )));
        }

        self.votes.insert(participant_id, value);
        Ok(())
    }

    /// Voting -> Revealed
    pub fn reveal(&mut self) -> Result<()> {
        if self.state != RoundState::Voting {
            return Err(Error::StateConflict("no voting in progress".into()));
        }

        self.state = RoundState::Revealed;
        self.deadline = None;
        self.epoch += 1;
        Ok(())
    }

    /// Voting|Revealed -> Idle. Clears votes.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == RoundState::Idle {
            return Err(Error::StateConflict("round is already idle".into()));
        }

        self.state = RoundState::Idle;
        self.started_at = None;
        self.deadline = None;
        self.votes.clear();
        self.epoch += 1;
        Ok(())
    }

    pub fn has_voted(&self, participant_id: Uuid) -> bool {
        self.votes.contains_key(&participant_id)
    }
}

impl Default for VotingRound {
    fn default() -> Self {
        Self::new()
    }
}
