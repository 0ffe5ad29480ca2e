//! Message dispatcher: the inbound protocol state machine (§4.2-§4.5).
//!
//! Each handler here is a plain, synchronous function over `Registry`,
//! `Room`, and `User` — nothing here depends on the transport, so the whole
//! protocol can (and is, in the tests below) be exercised without a socket.
//! Background pre-download is the only asynchronous side effect, and it is
//! fire-and-forget via `TaskSpawner`, so dispatch itself never awaits.
//!
//! Authorization and validation failures for host-only or malformed actions
//! are dropped silently rather than answered with an error envelope (§7):
//! they are routinely racy (a client's last known role can be stale by the
//! time a message arrives) and forging them has no effect either way.

use std::sync::Arc;

use crate::external::AudioSourceResolver;
use crate::fanout::{broadcast, broadcast_except};
use crate::model::{
    AudioSource, ChatMessage, QueueItem, Room, Suggestion, SyncSnapshot, User, MAX_USERNAME_LEN,
};
use crate::protocol::{HostAction, Inbound, MemberView, Outbound, RoomSnapshot, RoomSummary};
use crate::queue;
use crate::registry::{Registry, RoomHandle};
use crate::runtime::TaskSpawner;
use crate::storage::{filename_from_url, BlobStore};
use crate::utils::now_secs;

/// Shared handles every dispatch call needs. Cheap to clone; hand one of
/// these to every connection task.
///
/// Generic over the spawner rather than `Arc<dyn TaskSpawner>`: `TaskSpawner`
/// takes a generic future parameter, so it isn't object-safe.
#[derive(Clone)]
pub struct Dispatcher<S: TaskSpawner> {
    pub registry: Arc<Registry>,
    pub resolver: Arc<dyn AudioSourceResolver>,
    pub spawner: Arc<S>,
    pub upload_store: Arc<dyn BlobStore>,
}

impl<S: TaskSpawner + 'static> Dispatcher<S> {
    pub fn new(
        registry: Arc<Registry>,
        resolver: Arc<dyn AudioSourceResolver>,
        spawner: Arc<S>,
        upload_store: Arc<dyn BlobStore>,
    ) -> Self {
        Self { registry, resolver, spawner, upload_store }
    }

    /// Dispatches one inbound message on behalf of `user_id`. Each connection
    /// must call this strictly sequentially for its own messages (§5); across
    /// connections, calls may run concurrently.
    pub fn dispatch(&self, user_id: &str, msg: Inbound) {
        match msg {
            Inbound::SetUsername { name } => self.set_username(user_id, name),
            Inbound::CreateRoom { name } => self.create_room(user_id, name),
            Inbound::JoinRoom { room_id } => self.join_room(user_id, &room_id),
            Inbound::ReturnToRoom => self.return_to_room(user_id),
            Inbound::EndRoom => self.end_room(user_id),
            Inbound::GoToMenu => self.go_to_menu(user_id),
            Inbound::LeaveRoom => self.leave_room(user_id),
            Inbound::TogglePublic { is_public } => {
                self.with_hosted_room(user_id, |room| {
                    room.is_public = is_public;
                });
                self.broadcast_room_updated(user_id);
                self.notify_visiting_host(user_id);
                self.broadcast_public_rooms();
            }
            Inbound::RenameRoom { name } => {
                self.with_hosted_room(user_id, |room| {
                    room.name = crate::model::clamp_str(&name, crate::model::MAX_ROOM_NAME_LEN);
                });
                self.broadcast_room_updated(user_id);
                self.notify_visiting_host(user_id);
                self.broadcast_public_rooms();
            }
            Inbound::UpdateNowPlaying { now_playing } => {
                self.with_hosted_room(user_id, |room| {
                    room.now_playing = Some(now_playing);
                });
                self.broadcast_room_updated(user_id);
                self.notify_visiting_host(user_id);
                self.broadcast_public_rooms();
            }
            Inbound::SetAudioSource { source, url, title } => {
                self.set_audio_source(user_id, source, url, title)
            }
            Inbound::SyncState { current_time, is_playing, playback_speed } => {
                self.sync_state(user_id, current_time, is_playing, playback_speed)
            }
            Inbound::HostAction { action } => self.host_action(user_id, action),
            Inbound::ChatMessage { text } => self.chat_message(user_id, text),
            Inbound::QueueAdd { title, source, url } => self.queue_add(user_id, title, source, url),
            Inbound::QueueRemove { item_id } => self.queue_remove(user_id, &item_id),
            Inbound::QueueReorder { order } => self.queue_reorder(user_id, &order),
            Inbound::QueueUpdateItem { item_id, status, ai_params } => {
                self.queue_update_item(user_id, &item_id, status, ai_params)
            }
            Inbound::QueueAdvance => self.queue_advance(user_id),
            Inbound::SuggestSong { title, source, url } => {
                self.suggest_song(user_id, title, source, url)
            }
            Inbound::RespondSuggestion { suggestion_id, approve } => {
                self.respond_suggestion(user_id, &suggestion_id, approve)
            }
        }
    }

    /// Cleans up after a connection drops: ends a hosted room or leaves a
    /// visited one, then removes the user from the registry. Safe to call
    /// even if the user never created a room or is not currently in one.
    pub fn disconnect(&self, user_id: &str) {
        self.leave_room(user_id);
        self.registry.unregister_user(user_id);
    }

    // ── user identity ──────────────────────────────────────────────────

    fn set_username(&self, user_id: &str, name: String) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let name = crate::model::clamp_str(&name, MAX_USERNAME_LEN);
        let (old_name, in_room_id) = {
            let mut user = user_handle.lock();
            let old_name = user.name.clone();
            user.name = name.clone();
            (old_name, user.in_room_id.clone())
        };
        self.registry.send_to(user_id, &Outbound::UsernameSet { name: name.clone() });

        if let Some(room_id) = in_room_id {
            if let Some(room_handle) = self.registry.get_room(&room_id) {
                let members = self.member_views(&room_handle.lock());
                let recipients = room_handle.lock().member_ids();
                broadcast(
                    &self.registry,
                    &recipients,
                    &Outbound::UserRenamed { members, old_name, new_name: name },
                );
            }
        }
    }

    // ── room lifecycle ──────────────────────────────────────────────────

    fn create_room(&self, user_id: &str, name: String) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };

        // Destroy any existing hosted room first, and leave any visited room.
        self.end_room(user_id);
        self.leave_visited_room(user_id);

        let user_name = user_handle.lock().name.clone();
        let room = Room::new(name, user_id.to_string(), user_name);
        let room_handle = self.registry.insert_room(room);
        let room_id = room_handle.lock().id.clone();

        {
            let mut user = user_handle.lock();
            user.in_room_id = Some(room_id.clone());
            user.hosted_room_id = Some(room_id);
        }

        let snapshot = {
            let room = room_handle.lock();
            RoomSnapshot::from_room(&room, self.member_views(&room))
        };
        self.registry.send_to(user_id, &Outbound::RoomCreated { snapshot });
        self.broadcast_public_rooms();
    }

    fn join_room(&self, user_id: &str, room_id: &str) {
        let Some(target) = self.registry.get_room(room_id) else {
            self.registry.send_to(user_id, &Outbound::error("room not found"));
            return;
        };
        if !target.lock().is_public {
            self.registry.send_to(user_id, &Outbound::error("room is private"));
            return;
        }
        let Some(user_handle) = self.registry.get_user(user_id) else { return };

        let hosted_room_id = user_handle.lock().hosted_room_id.clone();
        let is_own_room = hosted_room_id.as_deref() == Some(room_id);
        if is_own_room {
            return;
        }

        let mut hosted_room_summary = None;
        if let Some(hosted_id) = hosted_room_id {
            // Host visiting another room: the hosted room survives, flagged as visiting.
            if let Some(hosted) = self.registry.get_room(&hosted_id) {
                let (mut a, mut b) = Registry::lock_two(&hosted, &target);
                a.host_visiting = true;
                a.remove_member(user_id);
                b.add_member(user_id);
                hosted_room_summary = Some(RoomSummary::from_room(&a));
            }
        } else {
            self.leave_visited_room(user_id);
            target.lock().add_member(user_id);
        }

        let user_name = user_handle.lock().name.clone();
        let system_msg = ChatMessage::system(format!("{user_name} joined the stage"));
        target.lock().push_chat(system_msg.clone());

        {
            let mut user = user_handle.lock();
            user.in_room_id = Some(room_id.to_string());
        }

        let (snapshot, others) = {
            let room = target.lock();
            (RoomSnapshot::from_room(&room, self.member_views(&room)), room.member_ids())
        };
        self.registry.send_to(
            user_id,
            &Outbound::RoomJoined { snapshot, hosted_room: hosted_room_summary },
        );

        let members = self.member_views(&target.lock());
        broadcast_except(
            &self.registry,
            &others,
            user_id,
            &Outbound::UserJoined { members, message: system_msg },
        );
        self.broadcast_public_rooms();
    }

    fn return_to_room(&self, user_id: &str) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let Some(hosted_id) = user_handle.lock().hosted_room_id.clone() else {
            self.registry.send_to(user_id, &Outbound::error("no hosted room"));
            return;
        };
        let Some(hosted) = self.registry.get_room(&hosted_id) else { return };

        let visited_id = user_handle.lock().in_room_id.clone();
        if visited_id.as_deref() != Some(hosted_id.as_str()) {
            self.leave_visited_room(user_id);
        }

        {
            let mut room = hosted.lock();
            room.host_visiting = false;
            room.add_member(user_id);
        }
        {
            let mut user = user_handle.lock();
            user.in_room_id = Some(hosted_id.clone());
        }

        let snapshot = {
            let room = hosted.lock();
            RoomSnapshot::from_room(&room, self.member_views(&room))
        };
        self.registry.send_to(
            user_id,
            &Outbound::ReturnedToRoom { snapshot, needs_audio_reload: true },
        );
    }

    fn end_room(&self, user_id: &str) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let Some(hosted_id) = user_handle.lock().hosted_room_id.clone() else { return };
        let reason = "The host ended this stage";
        self.destroy_room(&hosted_id, reason);
        user_handle.lock().hosted_room_id = None;
        self.registry
            .send_to(user_id, &Outbound::HostedRoomEnded { reason: reason.to_string() });
    }

    fn go_to_menu(&self, user_id: &str) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let Some(hosted_id) = user_handle.lock().hosted_room_id.clone() else { return };

        let currently_in = user_handle.lock().in_room_id.clone();
        if currently_in.as_deref() != Some(hosted_id.as_str()) {
            self.leave_visited_room(user_id);
        }

        let Some(hosted) = self.registry.get_room(&hosted_id) else { return };
        let summary = {
            let mut room = hosted.lock();
            room.host_visiting = true;
            room.remove_member(user_id);
            RoomSummary::from_room(&room)
        };
        user_handle.lock().in_room_id = None;
        self.registry.send_to(user_id, &Outbound::WentToMenu { summary });
    }

    fn leave_room(&self, user_id: &str) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let (in_room_id, hosted_room_id) = {
            let user = user_handle.lock();
            (user.in_room_id.clone(), user.hosted_room_id.clone())
        };
        let Some(room_id) = in_room_id else { return };

        if hosted_room_id.as_deref() == Some(room_id.as_str()) {
            self.end_room(user_id);
        } else if hosted_room_id.is_some() {
            // Visiting elsewhere with a hosted room still open: go home.
            self.return_to_room(user_id);
        } else {
            self.leave_visited_room(user_id);
        }
    }

    /// Visited-leave protocol (§4.3.1): removes a non-hosting member, posts a
    /// system message, and notifies the rest. Never destroys the room.
    fn leave_visited_room(&self, user_id: &str) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let Some(room_id) = user_handle.lock().in_room_id.clone() else { return };
        let Some(room_handle) = self.registry.get_room(&room_id) else { return };

        if room_handle.lock().host_id == user_id {
            // Leaving one's own room as a present host is handled by the
            // generic member-leave/destroy path, not this protocol.
            return;
        }

        let user_name = user_handle.lock().name.clone();
        let system_msg = ChatMessage::system(format!("{user_name} left the stage"));
        let recipients = {
            let mut room = room_handle.lock();
            room.remove_member(user_id);
            room.push_chat(system_msg.clone());
            room.member_ids()
        };
        user_handle.lock().in_room_id = None;

        let members = self.member_views(&room_handle.lock());
        broadcast(&self.registry, &recipients, &Outbound::UserLeft { members, message: system_msg });
        self.registry.send_to(user_id, &Outbound::LeftRoom);

        if room_handle.lock().is_public {
            self.broadcast_public_rooms();
        }
    }

    /// Destroys a room: deletes it from the registry, clears uploaded media,
    /// and notifies every remaining member (§4.3.2/.3).
    fn destroy_room(&self, room_id: &str, reason: &str) {
        let Some(room_handle) = self.registry.remove_room(room_id) else { return };
        let audio_source = room_handle.lock().audio_source.clone();
        if let Some(source) = audio_source {
            if source.kind == crate::model::MediaSource::Upload {
                if let Some(filename) = filename_from_url(&source.url) {
                    if let Err(e) = self.upload_store.delete(filename) {
                        log::warn!("[dispatcher] failed to delete uploaded file {filename}: {e}");
                    }
                }
            }
        }
        let members = room_handle.lock().member_ids();
        for member_id in &members {
            if let Some(handle) = self.registry.get_user(member_id) {
                let mut user = handle.lock();
                if user.in_room_id.as_deref() == Some(room_id) {
                    user.in_room_id = None;
                }
            }
        }
        broadcast(&self.registry, &members, &Outbound::RoomClosed { reason: reason.to_string() });
        self.broadcast_public_rooms();
    }

    // ── host controls ──────────────────────────────────────────────────

    fn set_audio_source(&self, user_id: &str, source: crate::model::MediaSource, url: String, title: String) {
        self.with_hosted_room(user_id, |room| {
            room.audio_source = Some(AudioSource { kind: source.clone(), url: url.clone(), title: title.clone() });
            room.ai_params = None;
            room.last_sync = Some(SyncSnapshot::zeroed());
            room.host_visualizer_state = serde_json::Value::Object(Default::default());
        });
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let (audience, source_clone) = {
                let room = hosted.lock();
                (room.audience_ids(), room.audio_source.clone())
            };
            if let Some(source) = source_clone {
                broadcast(&self.registry, &audience, &Outbound::AudioSource { source });
            }
        }
    }

    fn sync_state(&self, user_id: &str, current_time: f64, is_playing: bool, playback_speed: f64) {
        let snapshot = SyncSnapshot { current_time, is_playing, playback_speed, timestamp: now_secs() };
        self.with_hosted_room(user_id, |room| {
            room.last_sync = Some(snapshot.clone());
        });
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let audience = hosted.lock().audience_ids();
            broadcast(&self.registry, &audience, &Outbound::SyncState { snapshot });
        }
    }

    fn host_action(&self, user_id: &str, action: HostAction) {
        let key = action.visualizer_key();
        let value = action.visualizer_value();
        self.with_hosted_room(user_id, |room| {
            if let (Some(key), Some(value)) = (key, value.clone()) {
                if let serde_json::Value::Object(map) = &mut room.host_visualizer_state {
                    map.insert(key.to_string(), value);
                }
            }
            match &action {
                HostAction::PlayPause { playing } => {
                    if let Some(sync) = &mut room.last_sync {
                        sync.is_playing = *playing;
                        sync.timestamp = now_secs();
                    }
                }
                HostAction::Seek { current_time } => {
                    if let Some(sync) = &mut room.last_sync {
                        sync.current_time = *current_time;
                        sync.timestamp = now_secs();
                    }
                }
                HostAction::SpeedChange { playback_speed } => {
                    if let Some(sync) = &mut room.last_sync {
                        sync.playback_speed = *playback_speed;
                        sync.timestamp = now_secs();
                    }
                }
                _ => {}
            }
        });
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let audience = hosted.lock().audience_ids();
            broadcast(&self.registry, &audience, &Outbound::HostAction { action });
        }
    }

    // ── chat ────────────────────────────────────────────────────────────

    fn chat_message(&self, user_id: &str, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let (room_id, username) = {
            let user = user_handle.lock();
            let Some(room_id) = user.in_room_id.clone() else { return };
            (room_id, user.name.clone())
        };
        let Some(room_handle) = self.registry.get_room(&room_id) else { return };
        let is_host = room_handle.lock().host_id == user_id;
        let message = ChatMessage::user(user_id.to_string(), username, text, is_host);

        let recipients = {
            let mut room = room_handle.lock();
            room.push_chat(message.clone());
            room.member_ids()
        };
        broadcast(&self.registry, &recipients, &Outbound::ChatMessage { message });
    }

    // ── queue ───────────────────────────────────────────────────────────

    fn queue_add(&self, user_id: &str, title: String, source: crate::model::MediaSource, url: String) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let added_by_name = user_handle.lock().name.clone();
        self.with_hosted_room(user_id, |room| {
            queue::add(room, QueueItem::new(title, source, url, user_id.to_string(), added_by_name));
        });
        self.broadcast_queue_update(user_id);
        self.schedule_predownloads_for_hosted(user_id);
    }

    fn queue_remove(&self, user_id: &str, item_id: &str) {
        self.with_hosted_room(user_id, |room| {
            queue::remove(room, item_id);
        });
        self.broadcast_queue_update(user_id);
    }

    fn queue_reorder(&self, user_id: &str, order: &[String]) {
        self.with_hosted_room(user_id, |room| {
            queue::reorder(room, order);
        });
        self.broadcast_queue_update(user_id);
        self.schedule_predownloads_for_hosted(user_id);
    }

    fn queue_update_item(
        &self,
        user_id: &str,
        item_id: &str,
        status: Option<crate::model::QueueItemStatus>,
        ai_params: Option<serde_json::Value>,
    ) {
        self.with_hosted_room(user_id, |room| {
            queue::update_item(room, item_id, status, ai_params);
        });
        self.broadcast_queue_update(user_id);
    }

    fn queue_advance(&self, user_id: &str) {
        let mut played_next = None;
        self.with_hosted_room(user_id, |room| {
            played_next = queue::advance(room);
        });
        if let Some(item) = played_next {
            if let Some(hosted) = self.hosted_room_handle(user_id) {
                let recipients = hosted.lock().member_ids();
                broadcast(&self.registry, &recipients, &Outbound::QueuePlayNext { item });
            }
        }
        self.broadcast_queue_update(user_id);
        self.schedule_predownloads_for_hosted(user_id);
    }

    // ── suggestions ─────────────────────────────────────────────────────

    fn suggest_song(&self, user_id: &str, title: String, source: crate::model::MediaSource, url: String) {
        let Some(user_handle) = self.registry.get_user(user_id) else { return };
        let Some(room_id) = user_handle.lock().in_room_id.clone() else { return };
        let Some(room_handle) = self.registry.get_room(&room_id) else { return };

        if room_handle.lock().has_pending_suggestion(user_id) {
            return;
        }
        let username = user_handle.lock().name.clone();
        let suggestion = Suggestion::new(title, source, url, user_id.to_string(), username);
        let host_id = {
            let mut room = room_handle.lock();
            room.suggestions.push(suggestion.clone());
            room.host_id.clone()
        };
        self.registry.send_to(&host_id, &Outbound::NewSuggestion { suggestion: suggestion.clone() });
        self.registry
            .send_to(user_id, &Outbound::SuggestionSent { suggestion_id: suggestion.id });
    }

    fn respond_suggestion(&self, user_id: &str, suggestion_id: &str, approve: bool) {
        let Some(hosted) = self.hosted_room_handle(user_id) else { return };
        let (suggester_id, _added_by_name) = {
            let mut room = hosted.lock();
            let Some(suggestion) = room.suggestions.iter_mut().find(|s| s.id == suggestion_id) else {
                return;
            };
            suggestion.status = if approve {
                crate::model::SuggestionStatus::Approved
            } else {
                crate::model::SuggestionStatus::Rejected
            };
            let suggester_id = suggestion.user_id.clone();
            let name = suggestion.username.clone();
            if approve {
                let item = QueueItem::new(
                    suggestion.title.clone(),
                    suggestion.source.clone(),
                    suggestion.url.clone(),
                    suggestion.user_id.clone(),
                    name.clone(),
                );
                queue::add(&mut room, item);
            }
            (suggester_id, name)
        };

        self.registry.send_to(
            &suggester_id,
            &Outbound::SuggestionResponse { suggestion_id: suggestion_id.to_string(), approved: approve },
        );
        self.broadcast_queue_update(user_id);
        if approve {
            self.schedule_predownloads_for_hosted(user_id);
        }
    }

    // ── helpers ─────────────────────────────────────────────────────────

    fn hosted_room_handle(&self, user_id: &str) -> Option<RoomHandle> {
        let user_handle = self.registry.get_user(user_id)?;
        let room_id = user_handle.lock().hosted_room_id.clone()?;
        self.registry.get_room(&room_id)
    }

    /// Runs `f` against the caller's hosted room, if they have one. Silently
    /// a no-op (the "not host" authorization drop from §7) otherwise.
    fn with_hosted_room(&self, user_id: &str, f: impl FnOnce(&mut Room)) {
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let mut room = hosted.lock();
            if room.host_id == user_id {
                f(&mut room);
            }
        }
    }

    fn member_views(&self, room: &Room) -> Vec<MemberView> {
        room.members
            .keys()
            .filter_map(|id| {
                let handle = self.registry.get_user(id)?;
                let user = handle.lock();
                Some(MemberView { id: user.id.clone(), name: user.name.clone(), is_host: *id == room.host_id })
            })
            .collect()
    }

    fn broadcast_room_updated(&self, user_id: &str) {
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let (recipients, summary) = {
                let room = hosted.lock();
                (room.member_ids(), RoomSummary::from_room(&room))
            };
            broadcast(&self.registry, &recipients, &Outbound::RoomUpdated { summary });
        }
    }

    /// Sends a `hosted_room_updated` envelope to a host currently visiting
    /// another room, who is not a member of their own room and so would
    /// otherwise miss `broadcast_room_updated`'s notification.
    fn notify_visiting_host(&self, user_id: &str) {
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let room = hosted.lock();
            if room.host_visiting {
                let summary = RoomSummary::from_room(&room);
                drop(room);
                self.registry
                    .send_to(user_id, &Outbound::HostedRoomUpdated { summary });
            }
        }
    }

    fn broadcast_queue_update(&self, user_id: &str) {
        if let Some(hosted) = self.hosted_room_handle(user_id) {
            let (recipients, queue, pending) = {
                let room = hosted.lock();
                (room.member_ids(), room.queue.clone(), room.pending_suggestions())
            };
            broadcast(&self.registry, &recipients, &Outbound::QueueUpdate { queue, pending_suggestions: pending });
        }
    }

    fn schedule_predownloads_for_hosted(&self, user_id: &str) {
        let Some(hosted) = self.hosted_room_handle(user_id) else { return };
        let room_id = hosted.lock().id.clone();
        queue::schedule_predownloads(
            Arc::clone(&self.registry),
            room_id,
            Arc::clone(&self.resolver),
            self.spawner.as_ref(),
        );
    }

    /// Snapshot of currently public rooms, walking the full room index. Used
    /// by the HTTP listing edge and by the `connected` envelope; callers on a
    /// hot path should prefer targeted per-room lookups instead.
    pub fn public_rooms_snapshot(&self) -> Vec<RoomSummary> {
        self.registry
            .rooms_snapshot()
            .into_iter()
            .filter(|room| room.is_public)
            .map(|room| RoomSummary::from_room(&room))
            .collect()
    }

    fn broadcast_public_rooms(&self) {
        let rooms = self.public_rooms_snapshot();
        let recipients = self.registry.all_user_ids();
        broadcast(&self.registry, &recipients, &Outbound::PublicRooms { rooms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{AudioSourceResolver, DownloadedFile, ResolvedInfo};
    use crate::model::MediaSource;
    use crate::runtime::TokioSpawner;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct NoopResolver;
    #[async_trait]
    impl AudioSourceResolver for NoopResolver {
        async fn resolve_info(&self, _url: &str) -> crate::error::StageResult<ResolvedInfo> {
            unimplemented!()
        }
        async fn download_audio(&self, _url: &str) -> crate::error::StageResult<DownloadedFile> {
            Ok(DownloadedFile { serving_url: "http://local/file".into() })
        }
    }

    fn test_dispatcher() -> Dispatcher<TokioSpawner> {
        let upload_dir = tempfile::tempdir().unwrap().into_path();
        let upload_store: Arc<dyn BlobStore> =
            Arc::new(crate::storage::FsBlobStore::new(upload_dir, "http://localhost/uploads").unwrap());
        Dispatcher::new(
            Arc::new(Registry::new()),
            Arc::new(NoopResolver),
            Arc::new(TokioSpawner::current()),
            upload_store,
        )
    }

    fn register(d: &Dispatcher<TokioSpawner>) -> (String, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let user = User::new();
        let id = user.id.clone();
        d.registry.register_user(user, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn create_room_makes_sole_host_member() {
        let d = test_dispatcher();
        let (host, mut rx) = register(&d);
        d.dispatch(&host, Inbound::CreateRoom { name: "Show".into() });
        let msg = rx.try_recv().unwrap();
        assert!(msg.contains("room_created"));
        let room_id = d.registry.get_user(&host).unwrap().lock().hosted_room_id.clone().unwrap();
        let room = d.registry.get_room(&room_id).unwrap();
        assert_eq!(room.lock().audience_count(), 0);
    }

    #[tokio::test]
    async fn join_requires_public_room() {
        let d = test_dispatcher();
        let (host, _) = register(&d);
        d.dispatch(&host, Inbound::CreateRoom { name: "Show".into() });
        let room_id = d.registry.get_user(&host).unwrap().lock().hosted_room_id.clone().unwrap();

        let (joiner, mut rx) = register(&d);
        d.dispatch(&joiner, Inbound::JoinRoom { room_id: room_id.clone() });
        let msg = rx.try_recv().unwrap();
        assert!(msg.contains("error"));

        d.dispatch(&host, Inbound::TogglePublic { is_public: true });
        d.dispatch(&joiner, Inbound::JoinRoom { room_id });
        let joined = rx.try_recv().unwrap();
        assert!(joined.contains("room_joined"));
    }

    #[tokio::test]
    async fn host_visiting_another_room_keeps_room_alive() {
        let d = test_dispatcher();
        let (host_a, _) = register(&d);
        d.dispatch(&host_a, Inbound::CreateRoom { name: "A".into() });
        d.dispatch(&host_a, Inbound::TogglePublic { is_public: true });
        let room_a = d.registry.get_user(&host_a).unwrap().lock().hosted_room_id.clone().unwrap();

        let (host_b, _) = register(&d);
        d.dispatch(&host_b, Inbound::CreateRoom { name: "B".into() });
        d.dispatch(&host_b, Inbound::TogglePublic { is_public: true });
        let room_b = d.registry.get_user(&host_b).unwrap().lock().hosted_room_id.clone().unwrap();

        d.dispatch(&host_a, Inbound::JoinRoom { room_id: room_b });

        let room_a_handle = d.registry.get_room(&room_a).unwrap();
        assert!(room_a_handle.lock().host_visiting);
        assert!(!room_a_handle.lock().is_member(&host_a));
        assert!(d.registry.get_room(&room_a).is_some());
    }

    #[tokio::test]
    async fn chat_message_respects_length_cap() {
        let d = test_dispatcher();
        let (host, mut rx) = register(&d);
        d.dispatch(&host, Inbound::CreateRoom { name: "A".into() });
        let _ = rx.try_recv();
        let long_text = "x".repeat(1000);
        d.dispatch(&host, Inbound::ChatMessage { text: long_text });
        let msg = rx.try_recv().unwrap();
        assert!(msg.len() < 1000);
    }

    #[tokio::test]
    async fn suggestion_then_approve_adds_to_queue() {
        let d = test_dispatcher();
        let (host, mut host_rx) = register(&d);
        d.dispatch(&host, Inbound::CreateRoom { name: "A".into() });
        let _ = host_rx.try_recv();
        d.dispatch(&host, Inbound::TogglePublic { is_public: true });
        let room_id = d.registry.get_user(&host).unwrap().lock().hosted_room_id.clone().unwrap();

        let (fan, mut fan_rx) = register(&d);
        d.dispatch(&fan, Inbound::JoinRoom { room_id: room_id.clone() });
        let _ = fan_rx.try_recv();

        d.dispatch(
            &fan,
            Inbound::SuggestSong { title: "Song".into(), source: MediaSource::Remote, url: "http://x/a".into() },
        );
        let notify = host_rx.try_recv().unwrap();
        assert!(notify.contains("new_suggestion"));

        let room = d.registry.get_room(&room_id).unwrap();
        let suggestion_id = room.lock().suggestions[0].id.clone();
        d.dispatch(&host, Inbound::RespondSuggestion { suggestion_id, approve: true });

        assert_eq!(room.lock().queue.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_pending_suggestion_is_rejected() {
        let d = test_dispatcher();
        let (host, _) = register(&d);
        d.dispatch(&host, Inbound::CreateRoom { name: "A".into() });
        d.dispatch(&host, Inbound::TogglePublic { is_public: true });
        let room_id = d.registry.get_user(&host).unwrap().lock().hosted_room_id.clone().unwrap();

        let (fan, _) = register(&d);
        d.dispatch(&fan, Inbound::JoinRoom { room_id: room_id.clone() });
        d.dispatch(
            &fan,
            Inbound::SuggestSong { title: "A".into(), source: MediaSource::Remote, url: "http://x/a".into() },
        );
        d.dispatch(
            &fan,
            Inbound::SuggestSong { title: "B".into(), source: MediaSource::Remote, url: "http://x/b".into() },
        );

        let room = d.registry.get_room(&room_id).unwrap();
        assert_eq!(room.lock().suggestions.len(), 1);
    }

    #[tokio::test]
    async fn end_room_notifies_members_and_removes_room() {
        let d = test_dispatcher();
        let (host, _) = register(&d);
        d.dispatch(&host, Inbound::CreateRoom { name: "A".into() });
        let room_id = d.registry.get_user(&host).unwrap().lock().hosted_room_id.clone().unwrap();

        let (fan, mut fan_rx) = register(&d);
        d.dispatch(&host, Inbound::TogglePublic { is_public: true });
        d.dispatch(&fan, Inbound::JoinRoom { room_id: room_id.clone() });
        let _ = fan_rx.try_recv();

        d.dispatch(&host, Inbound::EndRoom);
        assert!(d.registry.get_room(&room_id).is_none());
        let closed = fan_rx.try_recv().unwrap();
        assert!(closed.contains("room_closed"));
    }
}
