//! Process-wide indices: user-ID → user, room-ID → room, plus the outbound
//! delivery channel for each connected user.
//!
//! Each room is guarded by its own `Mutex` so that mutations to one room never
//! block progress on another (§5 of the coordination model). The registry
//! itself only needs short critical sections around insert/remove/lookup,
//! which `DashMap` provides.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::model::{Room, User};

/// A handle to one room, shared by every task that needs to touch it.
pub type RoomHandle = Arc<Mutex<Room>>;
/// A handle to one user's connection-scoped state.
pub type UserHandle = Arc<Mutex<User>>;

/// Process-wide registry of connected users and live rooms.
#[derive(Default)]
pub struct Registry {
    rooms: DashMap<String, RoomHandle>,
    users: DashMap<String, UserHandle>,
    senders: DashMap<String, mpsc::UnboundedSender<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly connected user and its outbound channel.
    pub fn register_user(&self, user: User, sender: mpsc::UnboundedSender<String>) -> UserHandle {
        let id = user.id.clone();
        let handle = Arc::new(Mutex::new(user));
        self.users.insert(id.clone(), Arc::clone(&handle));
        self.senders.insert(id, sender);
        handle
    }

    /// Removes a user's registry entry. Does not touch any room; callers must
    /// run the appropriate leave/destroy protocol first.
    pub fn unregister_user(&self, user_id: &str) {
        self.users.remove(user_id);
        self.senders.remove(user_id);
    }

    pub fn get_user(&self, user_id: &str) -> Option<UserHandle> {
        self.users.get(user_id).map(|r| Arc::clone(&r))
    }

    pub fn insert_room(&self, room: Room) -> RoomHandle {
        let id = room.id.clone();
        let handle = Arc::new(Mutex::new(room));
        self.rooms.insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get_room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| Arc::clone(&r))
    }

    pub fn remove_room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.remove(room_id).map(|(_, v)| v)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Clones every live room's current state. Used for listings; not on any
    /// per-message hot path.
    pub fn rooms_snapshot(&self) -> Vec<Room> {
        self.rooms.iter().map(|entry| entry.value().lock().clone()).collect()
    }

    /// IDs of every currently connected user, for process-wide broadcasts
    /// like a refreshed public room listing.
    pub fn all_user_ids(&self) -> Vec<String> {
        self.senders.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Acquires two room locks in a deterministic order (ascending room ID) to
    /// avoid deadlocking against a concurrent operation that needs the same
    /// pair in the opposite order (e.g. a host visiting while being joined).
    ///
    /// Returns the guards in the same `(a, b)` order they were passed in,
    /// regardless of acquisition order.
    pub fn lock_two<'a>(
        a: &'a RoomHandle,
        b: &'a RoomHandle,
    ) -> (parking_lot::MutexGuard<'a, Room>, parking_lot::MutexGuard<'a, Room>) {
        if Arc::ptr_eq(a, b) {
            panic!("lock_two called with the same room twice");
        }
        let a_id = a.lock().id.clone();
        let b_id = b.lock().id.clone();
        if a_id <= b_id {
            let a_guard = a.lock();
            let b_guard = b.lock();
            (a_guard, b_guard)
        } else {
            let b_guard = b.lock();
            let a_guard = a.lock();
            (a_guard, b_guard)
        }
    }

    /// Serializes `envelope` and delivers it to one user's outbound channel.
    /// Failures (disconnected receiver) are swallowed for that recipient only,
    /// matching the broadcast error-isolation policy in §5/§7.
    pub fn send_to<T: Serialize>(&self, user_id: &str, envelope: &T) {
        let Some(sender) = self.senders.get(user_id) else {
            return;
        };
        match serde_json::to_string(envelope) {
            Ok(json) => {
                if sender.send(json).is_err() {
                    log::debug!("[registry] dropped message to disconnected user {user_id}");
                }
            }
            Err(e) => log::warn!("[registry] failed to serialize outbound message: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use serde_json::json;

    #[test]
    fn send_to_missing_user_is_a_noop() {
        let registry = Registry::new();
        registry.send_to("ghost", &json!({"type": "ping"}));
    }

    #[test]
    fn register_and_lookup_roundtrips() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let user = User::new();
        let id = user.id.clone();
        registry.register_user(user, tx);
        assert!(registry.get_user(&id).is_some());

        registry.send_to(&id, &json!({"type": "hello"}));
        let received = rx.try_recv().unwrap();
        assert!(received.contains("hello"));

        registry.unregister_user(&id);
        assert!(registry.get_user(&id).is_none());
    }

    #[test]
    fn room_insert_get_remove() {
        let registry = Registry::new();
        let room = Room::new("Room".into(), "host".into(), "Host".into());
        let id = room.id.clone();
        registry.insert_room(room);
        assert!(registry.get_room(&id).is_some());
        assert_eq!(registry.room_count(), 1);
        registry.remove_room(&id);
        assert!(registry.get_room(&id).is_none());
    }
}
