//! Wire protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Inbound payloads are validated here by serde before any room logic
//! runs; outbound snapshots are complete views that replace the client's
//! local state wholesale, so clients never diff or merge.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tally_core::{RoundState, VoteValue};

/// Client -> server requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a room, creating it if the code is unknown
    Join {
        room_id: String,
        display_name: String,
    },

    /// Host only: begin a voting round, optionally with an auto-reveal
    /// deadline
    StartVoting {
        room_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<u64>,
    },

    /// Cast or change a vote in the running round
    CastVote { room_id: String, value: VoteValue },

    /// Host only: reveal the cast votes
    Reveal { room_id: String },

    /// Host only: return the round to idle
    Reset { room_id: String },

    /// Host only: name the topic under estimation
    SetTopic { room_id: String, topic: String },

    /// Leave the room explicitly
    Leave { room_id: String },
}

/// One row of a participants snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: Uuid,
    pub display_name: String,
    pub is_host: bool,
    pub has_voted: bool,
    /// Present only once the round is revealed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteValue>,
}

/// Complete view of a room's round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub state: RoundState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Present only in the revealed state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<HashMap<Uuid, VoteValue>>,
}

/// Error taxonomy reported to the issuing connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    StateConflict,
    NotFound,
}

impl From<&tally_core::Error> for ErrorKind {
    fn from(err: &tally_core::Error) -> Self {
        match err {
            tally_core::Error::Validation(_) => ErrorKind::Validation,
            tally_core::Error::Authorization(_) => ErrorKind::Authorization,
            tally_core::Error::StateConflict(_) => ErrorKind::StateConflict,
            tally_core::Error::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Server -> client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted; carries the generated participant identity
    Joined { participant_id: Uuid, is_host: bool },

    /// Full member list (broadcast on any membership or vote change)
    ParticipantsSnapshot { participants: Vec<ParticipantInfo> },

    /// Full round state (broadcast on any round transition)
    RoundSnapshot(RoundView),

    /// A participant entered the room
    ParticipantJoined { display_name: String },

    /// A participant left the room
    ParticipantLeft { display_name: String },

    /// Host duties moved to a remaining participant
    HostMigrated { display_name: String },

    /// Request rejected; room state is unchanged
    Error { kind: ErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_roundtrip() {
        let msg = ClientMessage::StartVoting {
            room_id: "R1".to_string(),
            duration_seconds: Some(30),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"start_voting\""));

        let decoded: ClientMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            ClientMessage::StartVoting {
                room_id,
                duration_seconds,
            } => {
                assert_eq!(room_id, "R1");
                assert_eq!(duration_seconds, Some(30));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_duration_is_optional() {
        let decoded: ClientMessage =
            serde_json::from_str(r#"{"type":"start_voting","room_id":"R1"}"#).unwrap();
        assert!(matches!(
            decoded,
            ClientMessage::StartVoting {
                duration_seconds: None,
                ..
            }
        ));
    }

    #[test]
    fn test_vote_value_on_the_wire() {
        let msg = ClientMessage::CastVote {
            room_id: "R1".to_string(),
            value: VoteValue::unknown(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"value\":\"unknown\""));

        let decoded: ClientMessage =
            serde_json::from_str(r#"{"type":"cast_vote","room_id":"R1","value":13}"#).unwrap();
        assert!(matches!(
            decoded,
            ClientMessage::CastVote {
                value: VoteValue::Number(13),
                ..
            }
        ));
    }

    #[test]
    fn test_round_snapshot_hides_absent_fields() {
        let msg = ServerMessage::RoundSnapshot(RoundView {
            state: RoundState::Idle,
            topic: None,
            deadline: None,
            votes: None,
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"round_snapshot","state":"idle"}"#);
    }

    #[test]
    fn test_revealed_snapshot_carries_votes() {
        let voter = Uuid::new_v4();
        let mut votes = HashMap::new();
        votes.insert(voter, VoteValue::Number(8));

        let msg = ServerMessage::RoundSnapshot(RoundView {
            state: RoundState::Revealed,
            topic: Some("checkout flow".to_string()),
            deadline: None,
            votes: Some(votes),
        });

        let json = serde_json::to_string(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            ServerMessage::RoundSnapshot(view) => {
                assert_eq!(view.state, RoundState::Revealed);
                assert_eq!(view.votes.unwrap().get(&voter), Some(&VoteValue::Number(8)));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_error_kind_serialization() {
        let msg = ServerMessage::Error {
            kind: ErrorKind::StateConflict,
            message: "no voting in progress".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"state_conflict\""));
    }
}
