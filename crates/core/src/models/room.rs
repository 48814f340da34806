//! Room model - one estimation session
//!
//! A Room owns its participants and one voting round. All mutations go
//! through methods that enforce the role and state rules; callers get a
//! `Result` and the room is left unchanged on rejection.

use std::collections::HashMap;

use uuid::Uuid;

use crate::deck::{Deck, VoteValue};
use crate::error::{Error, Result};
use crate::invariants::assert_room_invariants;
use crate::models::{Participant, Role, VotingRound};

/// What happened when a participant left
#[derive(Debug, Clone)]
pub struct Departure {
    pub display_name: String,
    pub was_host: bool,
    /// Set when host duties migrated to a remaining participant
    pub new_host_id: Option<Uuid>,
}

/// An isolated session identified by a shared join code
#[derive(Debug)]
pub struct Room {
    pub id: String,
    participants: HashMap<Uuid, Participant>,
    pub host_id: Option<Uuid>,
    pub topic: Option<String>,
    pub round: VotingRound,
    deck: Deck,
    next_join_seq: u64,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            participants: HashMap::new(),
            host_id: None,
            topic: None,
            round: VotingRound::new(),
            deck: Deck::default(),
            next_join_seq: 0,
        }
    }

    /// Add a participant. The first member of an empty room becomes host.
    pub fn join(&mut self, display_name: &str) -> Result<Uuid> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(Error::Validation("display name must not be empty".into()));
        }

        let role = if self.participants.is_empty() {
            Role::Host
        } else {
            Role::Voter
        };

        let participant = Participant::new(name.to_string(), role, self.next_join_seq);
        self.next_join_seq += 1;

        let id = participant.id;
        if role.is_host() {
            self.host_id = Some(id);
        }
        self.participants.insert(id, participant);

        assert_room_invariants(self);
        Ok(id)
    }

    /// Remove a participant and their vote entry. A departing host's duties
    /// migrate to the earliest-joined remaining participant.
    pub fn leave(&mut self, participant_id: Uuid) -> Result<Departure> {
        let departed = self
            .participants
            .remove(&participant_id)
            .ok_or_else(|| Error::NotFound(format!("participant {} not in room", participant_id)))?;

        self.round.votes.remove(&participant_id);

        let was_host = self.host_id == Some(participant_id);
        let mut new_host_id = None;

        if was_host {
            self.host_id = None;
            if let Some(successor) = self
                .participants
                .values()
                .min_by_key(|p| p.join_seq)
                .map(|p| p.id)
            {
                if let Some(p) = self.participants.get_mut(&successor) {
                    p.role = Role::Host;
                }
                self.host_id = Some(successor);
                new_host_id = Some(successor);
            }
        }

        assert_room_invariants(self);
        Ok(Departure {
            display_name: departed.display_name,
            was_host,
            new_host_id,
        })
    }

    /// Idle|Revealed -> Voting. Host only.
    pub fn start_voting(&mut self, caller: Uuid, duration_seconds: Option<u64>) -> Result<()> {
        self.require_host(caller, "start voting")?;
        self.round.start(duration_seconds)
    }

    /// Record a vote for a present participant.
    pub fn cast_vote(&mut self, participant_id: Uuid, value: VoteValue) -> Result<()> {
        if !self.participants.contains_key(&participant_id) {
            return Err(Error::NotFound(format!(
                "participant {} not in room",
                participant_id
            )));
        }
        self.round.cast(participant_id, value, &self.deck)
    }

    /// Voting -> Revealed. Host only.
    pub fn reveal(&mut self, caller: Uuid) -> Result<()> {
        self.require_host(caller, "reveal votes")?;
        self.round.reveal()
    }

    /// Deadline-timer path: reveals without a host check.
    pub fn timer_reveal(&mut self) -> Result<()> {
        self.round.reveal()
    }

    /// Voting|Revealed -> Idle. Host only. Also drops the topic; the story
    /// under estimation ended with the round.
    pub fn reset(&mut self, caller: Uuid) -> Result<()> {
        self.require_host(caller, "reset the round")?;
        self.round.reset()?;
        self.topic = None;
        Ok(())
    }

    /// Name the topic under estimation. Host only; an empty string clears it.
    pub fn set_topic(&mut self, caller: Uuid, topic: &str) -> Result<()> {
        self.require_host(caller, "set the topic")?;
        let topic = topic.trim();
        self.topic = if topic.is_empty() {
            None
        } else {
            Some(topic.to_string())
        };
        Ok(())
    }

    fn require_host(&self, caller: Uuid, action: &str) -> Result<()> {
        if self.host_id != Some(caller) {
            return Err(Error::Authorization(format!(
                "only the host may {}",
                action
            )));
        }
        Ok(())
    }

    pub fn is_host(&self, participant_id: Uuid) -> bool {
        self.host_id == Some(participant_id)
    }

    pub fn contains(&self, participant_id: Uuid) -> bool {
        self.participants.contains_key(&participant_id)
    }

    pub fn display_name(&self, participant_id: Uuid) -> Option<&str> {
        self.participants
            .get(&participant_id)
            .map(|p| p.display_name.as_str())
    }

    /// Participants in join order
    pub fn participants_ordered(&self) -> Vec<&Participant> {
        let mut members: Vec<&Participant> = self.participants.values().collect();
        members.sort_by_key(|p| p.join_seq);
        members
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoundState;

    #[test]
    fn test_first_joiner_becomes_host() {
        let mut room = Room::new("R1".into());
        let host = room.join("alice").unwrap();
        let voter = room.join("bob").unwrap();

        assert!(room.is_host(host));
        assert!(!room.is_host(voter));
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_blank_display_name_rejected() {
        let mut room = Room::new("R1".into());
        assert!(matches!(room.join(""), Err(Error::Validation(_))));
        assert!(matches!(room.join("   "), Err(Error::Validation(_))));
        assert!(room.is_empty());
    }

    #[test]
    fn test_display_name_trimmed() {
        let mut room = Room::new("R1".into());
        let id = room.join("  alice  ").unwrap();
        assert_eq!(room.display_name(id), Some("alice"));
    }

    #[test]
    fn test_join_leave_counts() {
        let mut room = Room::new("R1".into());
        let ids: Vec<Uuid> = (0..5)
            .map(|i| room.join(&format!("p{}", i)).unwrap())
            .collect();
        room.leave(ids[1]).unwrap();
        room.leave(ids[3]).unwrap();

        assert_eq!(room.len(), 3);
        let names: Vec<&str> = room
            .participants_ordered()
            .iter()
            .map(|p| p.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["p0", "p2", "p4"]);
    }

    #[test]
    fn test_host_migrates_to_earliest_joined() {
        let mut room = Room::new("R1".into());
        let host = room.join("alice").unwrap();
        let second = room.join("bob").unwrap();
        let third = room.join("carol").unwrap();

        let departure = room.leave(host).unwrap();
        assert!(departure.was_host);
        assert_eq!(departure.new_host_id, Some(second));
        assert!(room.is_host(second));
        assert!(!room.is_host(third));
    }

    #[test]
    fn test_voter_leave_keeps_host() {
        let mut room = Room::new("R1".into());
        let host = room.join("alice").unwrap();
        let voter = room.join("bob").unwrap();

        let departure = room.leave(voter).unwrap();
        assert!(!departure.was_host);
        assert!(departure.new_host_id.is_none());
        assert!(room.is_host(host));
    }

    #[test]
    fn test_leave_drops_vote() {
        let mut room = Room::new("R1".into());
        let host = room.join("alice").unwrap();
        let voter = room.join("bob").unwrap();

        room.start_voting(host, None).unwrap();
        room.cast_vote(voter, VoteValue::Number(8)).unwrap();
        room.leave(voter).unwrap();

        assert!(room.round.votes.is_empty());
    }

    #[test]
    fn test_unknown_participant_not_found() {
        let mut room = Room::new("R1".into());
        let host = room.join("alice").unwrap();
        room.start_voting(host, None).unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            room.cast_vote(stranger, VoteValue::Number(5)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(room.leave(stranger), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_non_host_transitions_rejected() {
        let mut room = Room::new("R1".into());
        let _host = room.join("alice").unwrap();
        let voter = room.join("bob").unwrap();

        assert!(matches!(
            room.start_voting(voter, None),
            Err(Error::Authorization(_))
        ));
        assert!(matches!(room.reveal(voter), Err(Error::Authorization(_))));
        assert!(matches!(room.reset(voter), Err(Error::Authorization(_))));
        assert!(matches!(
            room.set_topic(voter, "story"),
            Err(Error::Authorization(_))
        ));
        assert_eq!(room.round.state, RoundState::Idle);
    }

    #[test]
    fn test_reset_clears_topic() {
        let mut room = Room::new("R1".into());
        let host = room.join("alice").unwrap();
        room.set_topic(host, "checkout flow").unwrap();
        room.start_voting(host, None).unwrap();
        room.reveal(host).unwrap();
        room.reset(host).unwrap();

        assert!(room.topic.is_none());
        assert_eq!(room.round.state, RoundState::Idle);
    }
}
