//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible room states during
//! development. Compiled out in release builds.

use crate::models::{Room, RoundState};

/// Validate that a Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    // Exactly one host when the room has members, none otherwise
    let host_count = room.participants().filter(|p| p.role.is_host()).count();
    if room.is_empty() {
        debug_assert!(
            host_count == 0 && room.host_id.is_none(),
            "Room {} is empty but has a host",
            room.id
        );
    } else {
        debug_assert!(
            host_count == 1,
            "Room {} has {} hosts, expected 1",
            room.id,
            host_count
        );
    }

    // host_id must reference a present participant marked as host
    if let Some(host_id) = room.host_id {
        let marked = room
            .participants()
            .any(|p| p.id == host_id && p.role.is_host());
        debug_assert!(
            marked,
            "Room {} host_id {} does not match a host participant",
            room.id, host_id
        );
    }

    // An idle round carries no ballots
    if room.round.state == RoundState::Idle {
        debug_assert!(
            room.round.votes.is_empty(),
            "Room {} is idle but holds {} votes",
            room.id,
            room.round.votes.len()
        );
    }

    // Every ballot belongs to a present participant
    for voter in room.round.votes.keys() {
        debug_assert!(
            room.contains(*voter),
            "Room {} holds a vote from departed participant {}",
            room.id,
            voter
        );
    }
}
