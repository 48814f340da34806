//! Room registry - the authoritative directory of live rooms
//!
//! Rooms are created lazily on first join and removed as soon as they
//! empty out. Each entry also owns the room's pending deadline timer, so
//! tearing an entry down always cancels its timer.

use std::collections::HashMap;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use tally_core::Room;

/// An armed auto-reveal timer for one round
#[derive(Debug)]
pub struct RoundTimer {
    /// Round epoch the timer was armed against
    pub epoch: u64,
    handle: JoinHandle<()>,
}

impl RoundTimer {
    pub fn new(epoch: u64, handle: JoinHandle<()>) -> Self {
        Self { epoch, handle }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A live room plus its timer handle
#[derive(Debug)]
pub struct RoomEntry {
    pub room: Room,
    pub timer: Option<RoundTimer>,
}

impl RoomEntry {
    fn new(room_id: String) -> Self {
        Self {
            room: Room::new(room_id),
            timer: None,
        }
    }

    /// Abort any pending deadline timer
    pub fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(epoch = timer.epoch, room_id = %self.room.id, "Cancelling round timer");
        }
    }
}

/// Process-wide room directory
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, RoomEntry>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Return the entry for a room code, creating an empty room if the
    /// code is unknown
    pub fn get_or_create(&mut self, room_id: &str) -> &mut RoomEntry {
        self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            info!(room_id = %room_id, "Room created");
            RoomEntry::new(room_id.to_string())
        })
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut RoomEntry> {
        self.rooms.get_mut(room_id)
    }

    pub fn get(&self, room_id: &str) -> Option<&RoomEntry> {
        self.rooms.get(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Drop the room once its last participant is gone. The entry's timer
    /// aborts as the entry drops. Returns true if the room was removed.
    pub fn remove_if_empty(&mut self, room_id: &str) -> bool {
        let empty = self
            .rooms
            .get(room_id)
            .map(|e| e.room.is_empty())
            .unwrap_or(false);
        if empty {
            self.rooms.remove(room_id);
            info!(room_id = %room_id, "Room removed");
        }
        empty
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation() {
        let mut registry = RoomRegistry::new();
        assert!(!registry.contains("R1"));

        registry.get_or_create("R1");
        assert!(registry.contains("R1"));
        assert_eq!(registry.len(), 1);

        // Second call returns the same room
        registry.get_or_create("R1").room.join("alice").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("R1").unwrap().room.len(), 1);
    }

    #[test]
    fn test_remove_if_empty() {
        let mut registry = RoomRegistry::new();
        let id = registry.get_or_create("R1").room.join("alice").unwrap();

        // Occupied room stays
        assert!(!registry.remove_if_empty("R1"));
        assert!(registry.contains("R1"));

        registry.get_mut("R1").unwrap().room.leave(id).unwrap();
        assert!(registry.remove_if_empty("R1"));
        assert!(!registry.contains("R1"));

        // Unknown room is a no-op
        assert!(!registry.remove_if_empty("R9"));
    }

    #[tokio::test]
    async fn test_teardown_aborts_timer() {
        let mut registry = RoomRegistry::new();
        let id = registry.get_or_create("R1").room.join("alice").unwrap();

        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        registry.get_mut("R1").unwrap().timer = Some(RoundTimer::new(1, handle));

        registry.get_mut("R1").unwrap().room.leave(id).unwrap();
        assert!(registry.remove_if_empty("R1"));
        // Dropped entry aborted the sleep task; nothing left to wait on
    }
}
