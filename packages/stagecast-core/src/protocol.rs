//! The WebSocket wire protocol: inbound command envelopes and outbound
//! notification envelopes, plus the view types used to build them.
//!
//! Unknown inbound fields are tolerated (`#[serde(default)]` throughout);
//! unknown inbound `type` tags are rejected at the parse step and the
//! dispatcher drops them silently (§4.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ChatMessage, MediaSource, QueueItem, Room, Suggestion, SyncSnapshot};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    SetUsername { name: String },
    CreateRoom { name: String },
    JoinRoom { room_id: String },
    ReturnToRoom,
    EndRoom,
    GoToMenu,
    LeaveRoom,
    TogglePublic { is_public: bool },
    RenameRoom { name: String },
    UpdateNowPlaying { now_playing: Value },
    SetAudioSource { source: MediaSource, url: String, title: String },
    SyncState { current_time: f64, is_playing: bool, playback_speed: f64 },
    HostAction { action: HostAction },
    ChatMessage { text: String },
    QueueAdd { title: String, source: MediaSource, url: String },
    QueueRemove { item_id: String },
    QueueReorder { order: Vec<String> },
    QueueUpdateItem { item_id: String, status: Option<crate::model::QueueItemStatus>, ai_params: Option<Value> },
    QueueAdvance,
    SuggestSong { title: String, source: MediaSource, url: String },
    RespondSuggestion { suggestion_id: String, approve: bool },
}

/// The `action` tag of a `host_action` inbound message (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostAction {
    PlayPause { playing: bool },
    Seek { current_time: f64 },
    SpeedChange { playback_speed: f64 },
    ShapeChange { shape: Value },
    EnvironmentChange { environment: Value },
    EqChange { eq: Value },
    AnaglyphToggle { enabled: bool },
}

impl HostAction {
    /// The key this action occupies in `Room::host_visualizer_state`, or
    /// `None` for actions that only touch the sync snapshot.
    pub fn visualizer_key(&self) -> Option<&'static str> {
        match self {
            Self::ShapeChange { .. } => Some("shape"),
            Self::EnvironmentChange { .. } => Some("environment"),
            Self::EqChange { .. } => Some("eq"),
            Self::AnaglyphToggle { .. } => Some("anaglyph"),
            Self::PlayPause { .. } | Self::Seek { .. } | Self::SpeedChange { .. } => None,
        }
    }

    pub fn visualizer_value(&self) -> Option<Value> {
        match self {
            Self::ShapeChange { shape } => Some(shape.clone()),
            Self::EnvironmentChange { environment } => Some(environment.clone()),
            Self::EqChange { eq } => Some(eq.clone()),
            Self::AnaglyphToggle { enabled } => Some(Value::Bool(*enabled)),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View types
// ─────────────────────────────────────────────────────────────────────────────

/// A public-facing member of a room (display only; never carries tokens).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: String,
    pub name: String,
    pub is_host: bool,
}

/// Short summary of a room, used for listings and lightweight notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub host_id: String,
    pub host_name: String,
    pub is_public: bool,
    pub audience_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<Value>,
}

impl RoomSummary {
    pub fn from_room(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            host_id: room.host_id.clone(),
            host_name: room.host_name.clone(),
            is_public: room.is_public,
            audience_count: room.audience_count(),
            now_playing: room.now_playing.clone(),
        }
    }
}

/// The full state of a room, sent to a joiner and to the host on return.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub summary: RoomSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<crate::model::AudioSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<SyncSnapshot>,
    pub host_visualizer_state: Value,
    pub queue: Vec<QueueItem>,
    pub pending_suggestions: Vec<Suggestion>,
    pub recent_chat: Vec<ChatMessage>,
    pub members: Vec<MemberView>,
}

impl RoomSnapshot {
    pub fn from_room(room: &Room, members: Vec<MemberView>) -> Self {
        Self {
            summary: RoomSummary::from_room(room),
            audio_source: room.audio_source.clone(),
            ai_params: room.ai_params.clone(),
            last_sync: room.last_sync.clone(),
            host_visualizer_state: room.host_visualizer_state.clone(),
            queue: room.queue.clone(),
            pending_suggestions: room.pending_suggestions(),
            recent_chat: room.recent_chat(),
            members,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Connected { user_id: String, public_rooms: Vec<RoomSummary> },
    UsernameSet { name: String },
    RoomCreated { snapshot: RoomSnapshot },
    RoomJoined {
        snapshot: RoomSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        hosted_room: Option<RoomSummary>,
    },
    RoomUpdated { summary: RoomSummary },
    RoomClosed { reason: String },
    /// Sent to a host whose own room was just destroyed (§4.3.2).
    HostedRoomEnded { reason: String },
    /// Sent to a visiting host when their own (unattended) room's summary
    /// changes, since they aren't a member of it and so miss `RoomUpdated`.
    HostedRoomUpdated { summary: RoomSummary },
    ReturnedToRoom { snapshot: RoomSnapshot, needs_audio_reload: bool },
    WentToMenu { summary: RoomSummary },
    LeftRoom,
    UserJoined { members: Vec<MemberView>, message: ChatMessage },
    UserLeft { members: Vec<MemberView>, message: ChatMessage },
    UserRenamed { members: Vec<MemberView>, old_name: String, new_name: String },
    ChatMessage { message: ChatMessage },
    PublicRooms { rooms: Vec<RoomSummary> },
    AudioSource { source: crate::model::AudioSource },
    SyncState { snapshot: SyncSnapshot },
    HostAction { action: HostAction },
    QueueUpdate { queue: Vec<QueueItem>, pending_suggestions: Vec<Suggestion> },
    QueuePlayNext { item: QueueItem },
    NewSuggestion { suggestion: Suggestion },
    SuggestionSent { suggestion_id: String },
    SuggestionResponse { suggestion_id: String, approved: bool },
    Error { message: String },
}

impl Outbound {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_tag_is_snake_case() {
        let json = r#"{"type": "set_username", "name": "Alice"}"#;
        let parsed: Inbound = serde_json::from_str(json).unwrap();
        matches!(parsed, Inbound::SetUsername { name } if name == "Alice");
    }

    #[test]
    fn unknown_inbound_type_fails_to_parse() {
        let json = r#"{"type": "not_a_real_message"}"#;
        assert!(serde_json::from_str::<Inbound>(json).is_err());
    }

    #[test]
    fn outbound_serializes_with_tag() {
        let msg = Outbound::error("boom");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"error\""));
    }
}
