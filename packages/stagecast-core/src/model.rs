//! Core data types: users, rooms, chat, queue, and suggestions.
//!
//! Rooms own only user *IDs* in their ownership-critical fields (`host_id`,
//! `QueueItem::added_by`) rather than `User` handles, which keeps the
//! room/user relationship acyclic: a `Room` never holds a strong reference
//! to a `User` and vice versa. Delivery to a specific user goes through the
//! registry's connection index, not through a field on `Room`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::new_id;
use crate::utils::now_secs;

/// Maximum chat history retained before truncation kicks in.
pub const CHAT_HISTORY_CAP: usize = 200;
/// Number of most-recent messages kept after a truncation pass.
pub const CHAT_HISTORY_TRUNCATE_TO: usize = 100;
/// Number of most-recent messages sent to a joiner's room snapshot.
pub const CHAT_HISTORY_SNAPSHOT: usize = 50;
/// Size of the queue's priority region (shielded from reordering, eligible for pre-download).
pub const QUEUE_PRIORITY_REGION: usize = 3;

pub const MAX_USERNAME_LEN: usize = 30;
pub const MAX_ROOM_NAME_LEN: usize = 50;
pub const MAX_CHAT_TEXT_LEN: usize = 500;
pub const MAX_QUEUE_TITLE_LEN: usize = 200;

/// Truncates a string to at most `max` chars, respecting UTF-8 boundaries.
pub fn clamp_str(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Per-connection participant state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    /// Room this user currently occupies (receives broadcasts from).
    pub in_room_id: Option<String>,
    /// Room this user currently owns as host, regardless of where they are.
    pub hosted_room_id: Option<String>,
}

impl User {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            in_room_id: None,
            hosted_room_id: None,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Upload,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSource {
    pub kind: MediaSource,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub current_time: f64,
    pub is_playing: bool,
    pub playback_speed: f64,
    pub timestamp: f64,
}

impl SyncSnapshot {
    pub fn zeroed() -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            playback_speed: 1.0,
            timestamp: now_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub text: String,
    pub timestamp: f64,
    pub is_host: bool,
    pub is_system: bool,
}

impl ChatMessage {
    pub fn user(user_id: String, username: String, text: String, is_host: bool) -> Self {
        Self {
            id: new_id(),
            user_id,
            username,
            text: clamp_str(&text, MAX_CHAT_TEXT_LEN),
            timestamp: now_secs(),
            is_host,
            is_system: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            user_id: String::new(),
            username: String::new(),
            text: text.into(),
            timestamp: now_secs(),
            is_host: false,
            is_system: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Pending,
    Analyzing,
    Ready,
    Playing,
    Played,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub title: String,
    pub source: MediaSource,
    pub url: String,
    pub added_by: String,
    pub added_by_name: String,
    pub status: QueueItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_params: Option<Value>,
    /// Original remote URL, kept so pre-download can be retried after a localized
    /// copy's URL has replaced `url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    pub download_status: DownloadStatus,
}

impl QueueItem {
    pub fn new(title: String, source: MediaSource, url: String, added_by: String, added_by_name: String) -> Self {
        let remote_url = matches!(source, MediaSource::Remote).then(|| url.clone());
        Self {
            id: new_id(),
            title: clamp_str(&title, MAX_QUEUE_TITLE_LEN),
            source,
            url,
            added_by,
            added_by_name,
            status: QueueItemStatus::Pending,
            ai_params: None,
            remote_url,
            download_status: DownloadStatus::Pending,
        }
    }

    /// Whether this item is eligible for background pre-download: remote, with a
    /// resolvable remote URL that has not yet been localized.
    pub fn needs_predownload(&self) -> bool {
        matches!(self.source, MediaSource::Remote)
            && self.remote_url.is_some()
            && self.download_status != DownloadStatus::Ready
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub title: String,
    pub source: MediaSource,
    pub url: String,
    pub user_id: String,
    pub username: String,
    pub status: SuggestionStatus,
    pub timestamp: f64,
}

impl Suggestion {
    pub fn new(title: String, source: MediaSource, url: String, user_id: String, username: String) -> Self {
        Self {
            id: new_id(),
            title: clamp_str(&title, MAX_QUEUE_TITLE_LEN),
            source,
            url,
            user_id,
            username,
            status: SuggestionStatus::Pending,
            timestamp: now_secs(),
        }
    }
}

/// A live stage, owned by one host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub host_id: String,
    pub host_name: String,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<AudioSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<SyncSnapshot>,
    pub host_visualizer_state: Value,
    /// True once the host has left to visit another room; host is absent from `members`.
    pub host_visiting: bool,
    #[serde(skip)]
    pub members: HashMap<String, ()>,
    pub messages: Vec<ChatMessage>,
    pub queue: Vec<QueueItem>,
    pub suggestions: Vec<Suggestion>,
    pub created_at: f64,
}

impl Room {
    pub fn new(name: String, host_id: String, host_name: String) -> Self {
        let mut members = HashMap::new();
        members.insert(host_id.clone(), ());
        Self {
            id: new_id(),
            name: clamp_str(&name, MAX_ROOM_NAME_LEN),
            host_id,
            host_name,
            is_public: false,
            now_playing: None,
            audio_source: None,
            ai_params: None,
            last_sync: None,
            host_visualizer_state: Value::Object(Default::default()),
            host_visiting: false,
            members,
            messages: Vec::new(),
            queue: Vec::new(),
            suggestions: Vec::new(),
            created_at: now_secs(),
        }
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn audience_ids(&self) -> Vec<String> {
        self.members
            .keys()
            .filter(|id| **id != self.host_id)
            .cloned()
            .collect()
    }

    /// `|members| - (0 if visiting else 1)`, floored at 0 (invariant 4).
    pub fn audience_count(&self) -> usize {
        let total = self.members.len();
        if self.host_visiting {
            total
        } else {
            total.saturating_sub(1)
        }
    }

    pub fn add_member(&mut self, user_id: &str) {
        self.members.insert(user_id.to_string(), ());
    }

    pub fn remove_member(&mut self, user_id: &str) {
        self.members.remove(user_id);
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    pub fn push_chat(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
        if self.messages.len() > CHAT_HISTORY_CAP {
            let drop = self.messages.len() - CHAT_HISTORY_TRUNCATE_TO;
            self.messages.drain(0..drop);
        }
    }

    pub fn recent_chat(&self) -> Vec<ChatMessage> {
        let start = self.messages.len().saturating_sub(CHAT_HISTORY_SNAPSHOT);
        self.messages[start..].to_vec()
    }

    pub fn pending_suggestions(&self) -> Vec<Suggestion> {
        self.suggestions
            .iter()
            .filter(|s| s.status == SuggestionStatus::Pending)
            .cloned()
            .collect()
    }

    /// Invariant 7: a user may have at most one pending suggestion per room.
    pub fn has_pending_suggestion(&self, user_id: &str) -> bool {
        self.suggestions
            .iter()
            .any(|s| s.user_id == user_id && s.status == SuggestionStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_room_has_host_as_sole_member() {
        let room = Room::new("Test".into(), "host1".into(), "Host".into());
        assert_eq!(room.member_ids(), vec!["host1".to_string()]);
        assert_eq!(room.audience_count(), 0);
    }

    #[test]
    fn audience_count_excludes_host_unless_visiting() {
        let mut room = Room::new("Test".into(), "host1".into(), "Host".into());
        room.add_member("a");
        room.add_member("b");
        assert_eq!(room.audience_count(), 2);

        room.host_visiting = true;
        room.remove_member("host1");
        assert_eq!(room.audience_count(), 2);
    }

    #[test]
    fn chat_cap_truncates_to_recent_hundred() {
        let mut room = Room::new("Test".into(), "host1".into(), "Host".into());
        for i in 0..CHAT_HISTORY_CAP + 5 {
            room.push_chat(ChatMessage::system(format!("msg {i}")));
        }
        assert_eq!(room.messages.len(), CHAT_HISTORY_TRUNCATE_TO);
        assert!(room.messages.last().unwrap().text.contains(&(CHAT_HISTORY_CAP + 4).to_string()));
    }

    #[test]
    fn pending_suggestion_uniqueness() {
        let mut room = Room::new("Test".into(), "host1".into(), "Host".into());
        assert!(!room.has_pending_suggestion("u1"));
        room.suggestions.push(Suggestion::new(
            "Song".into(),
            MediaSource::Remote,
            "http://example.com/a".into(),
            "u1".into(),
            "Alice".into(),
        ));
        assert!(room.has_pending_suggestion("u1"));
    }

    #[test]
    fn clamp_str_respects_utf8_boundaries() {
        let s = clamp_str("héllo wörld", 5);
        assert_eq!(s.chars().count(), 5);
    }
}
