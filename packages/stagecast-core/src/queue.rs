//! Priority queue manager: maintains the queue ordering invariant (§3.5) and
//! drives background pre-download of the top-three remote tracks (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use crate::external::AudioSourceResolver;
use crate::model::{DownloadStatus, QueueItem, QueueItemStatus, Room, QUEUE_PRIORITY_REGION};
use crate::registry::Registry;
use crate::runtime::TaskSpawner;

/// Appends an item to the tail of the queue. The priority region invariant is
/// trivially preserved since appends never touch the head.
pub fn add(room: &mut Room, item: QueueItem) {
    room.queue.push(item);
}

/// Removes an item by ID, refusing to remove whatever is currently playing.
pub fn remove(room: &mut Room, item_id: &str) -> bool {
    let before = room.queue.len();
    room.queue.retain(|i| i.id != item_id || i.status == QueueItemStatus::Playing);
    room.queue.len() != before
}

/// Splits the queue into the protected prefix (played/playing + the first
/// `QUEUE_PRIORITY_REGION` items of the remaining tail) and the reorderable
/// suffix, preserving invariant 5.
fn split_priority_region(queue: &[QueueItem]) -> usize {
    let active_start = queue
        .iter()
        .position(|i| i.status != QueueItemStatus::Played)
        .unwrap_or(queue.len());
    (active_start + QUEUE_PRIORITY_REGION).min(queue.len())
}

/// Reorders the suffix beyond the priority region according to `order` (a
/// list of item IDs). IDs not present in `order` keep their relative position
/// at the end of the suffix; IDs in `order` that no longer exist are ignored.
pub fn reorder(room: &mut Room, order: &[String]) {
    let split = split_priority_region(&room.queue);
    let (protected, tail) = room.queue.split_at(split);
    let mut tail: Vec<QueueItem> = tail.to_vec();

    let mut by_id: HashMap<String, QueueItem> =
        tail.drain(..).map(|item| (item.id.clone(), item)).collect();

    let mut reordered = Vec::with_capacity(by_id.len());
    for id in order {
        if let Some(item) = by_id.remove(id) {
            reordered.push(item);
        }
    }
    // Anything left (not named in `order`) keeps its place at the end, stable
    // by original position.
    let mut leftovers: Vec<QueueItem> = by_id.into_values().collect();
    leftovers.sort_by_key(|item| {
        room.queue.iter().position(|q| q.id == item.id).unwrap_or(usize::MAX)
    });
    reordered.extend(leftovers);

    let mut new_queue = protected.to_vec();
    new_queue.extend(reordered);
    room.queue = new_queue;
}

/// Sets status and/or AI params on one item.
pub fn update_item(
    room: &mut Room,
    item_id: &str,
    status: Option<QueueItemStatus>,
    ai_params: Option<serde_json::Value>,
) -> bool {
    let Some(item) = room.queue.iter_mut().find(|i| i.id == item_id) else {
        return false;
    };
    if let Some(status) = status {
        item.status = status;
    }
    if let Some(params) = ai_params {
        item.ai_params = Some(params);
    }
    true
}

/// Transitions the current `playing` item to `played` and promotes the first
/// `ready`/`pending` item to `playing`. Returns the newly-playing item, if any.
pub fn advance(room: &mut Room) -> Option<QueueItem> {
    for item in &mut room.queue {
        if item.status == QueueItemStatus::Playing {
            item.status = QueueItemStatus::Played;
        }
    }
    let next = room
        .queue
        .iter_mut()
        .find(|i| matches!(i.status, QueueItemStatus::Pending | QueueItemStatus::Ready));
    if let Some(item) = next {
        item.status = QueueItemStatus::Playing;
        Some(item.clone())
    } else {
        None
    }
}

/// Returns the IDs of items in the priority region that are remote and not
/// yet localized, i.e. due for a background pre-download.
pub fn predownload_candidates(room: &Room) -> Vec<String> {
    let split = split_priority_region(&room.queue);
    room.queue[..split]
        .iter()
        .filter(|i| i.needs_predownload())
        .map(|i| i.id.clone())
        .collect()
}

/// Schedules a fire-and-forget pre-download for each candidate item in the
/// priority region. On success the item's `url` is rewritten to the localized
/// URL; on failure `download_status` is set to `failed`. Either way the queue
/// is re-broadcast. If the room is gone by the time the download completes,
/// the result is discarded silently (§9).
pub fn schedule_predownloads<S: TaskSpawner>(
    registry: Arc<Registry>,
    room_id: String,
    resolver: Arc<dyn AudioSourceResolver>,
    spawner: &S,
) {
    let Some(room_handle) = registry.get_room(&room_id) else {
        return;
    };
    let candidates = predownload_candidates(&room_handle.lock());
    for item_id in candidates {
        {
            let mut room = room_handle.lock();
            if let Some(item) = room.queue.iter_mut().find(|i| i.id == item_id) {
                item.download_status = DownloadStatus::Downloading;
            }
        }

        let registry = Arc::clone(&registry);
        let room_id = room_id.clone();
        let item_id = item_id.clone();
        let resolver = Arc::clone(&resolver);

        spawner.spawn(async move {
            let Some(room_handle) = registry.get_room(&room_id) else {
                return;
            };
            let remote_url = {
                let room = room_handle.lock();
                room.queue
                    .iter()
                    .find(|i| i.id == item_id)
                    .and_then(|i| i.remote_url.clone())
            };
            let Some(remote_url) = remote_url else { return };

            let outcome = resolver.download_audio(&remote_url).await;

            // Discard silently if the room was destroyed while downloading.
            let Some(room_handle) = registry.get_room(&room_id) else {
                return;
            };
            let mut room = room_handle.lock();
            let Some(item) = room.queue.iter_mut().find(|i| i.id == item_id) else {
                return;
            };
            match outcome {
                Ok(local) => {
                    item.url = local.serving_url;
                    item.download_status = DownloadStatus::Ready;
                }
                Err(e) => {
                    log::warn!("[queue] pre-download failed for {item_id}: {e}");
                    item.download_status = DownloadStatus::Failed;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaSource, Room};

    fn item(status: QueueItemStatus) -> QueueItem {
        let mut i = QueueItem::new(
            "t".into(),
            MediaSource::Remote,
            "http://x/a".into(),
            "u".into(),
            "U".into(),
        );
        i.status = status;
        i
    }

    #[test]
    fn reorder_preserves_playing_prefix_and_priority_region() {
        let mut room = Room::new("r".into(), "h".into(), "H".into());
        room.queue = vec![
            item(QueueItemStatus::Played),
            item(QueueItemStatus::Playing),
            item(QueueItemStatus::Ready),
            item(QueueItemStatus::Ready),
            item(QueueItemStatus::Ready),
            item(QueueItemStatus::Pending),
        ];
        let original_protected: Vec<String> = room.queue[..5].iter().map(|i| i.id.clone()).collect();
        let last_id = room.queue[5].id.clone();

        // Ask to move the last item to the front - should be ignored, since
        // it falls outside the reorderable suffix (only index 5 onward, i.e.
        // only itself, is reorderable here).
        reorder(&mut room, &[last_id.clone()]);

        let new_protected: Vec<String> = room.queue[..5].iter().map(|i| i.id.clone()).collect();
        assert_eq!(original_protected, new_protected);
        assert_eq!(room.queue[5].id, last_id);
    }

    #[test]
    fn advance_promotes_first_ready_item() {
        let mut room = Room::new("r".into(), "h".into(), "H".into());
        room.queue = vec![item(QueueItemStatus::Playing), item(QueueItemStatus::Ready)];
        let next = advance(&mut room).unwrap();
        assert_eq!(room.queue[0].status, QueueItemStatus::Played);
        assert_eq!(room.queue[1].status, QueueItemStatus::Playing);
        assert_eq!(next.id, room.queue[1].id);
    }

    #[test]
    fn advance_with_nothing_ready_returns_none() {
        let mut room = Room::new("r".into(), "h".into(), "H".into());
        room.queue = vec![item(QueueItemStatus::Playing)];
        assert!(advance(&mut room).is_none());
        assert_eq!(room.queue[0].status, QueueItemStatus::Played);
    }

    #[test]
    fn remove_refuses_to_remove_playing_item() {
        let mut room = Room::new("r".into(), "h".into(), "H".into());
        room.queue = vec![item(QueueItemStatus::Playing)];
        let id = room.queue[0].id.clone();
        assert!(!remove(&mut room, &id));
        assert_eq!(room.queue.len(), 1);
    }

    #[test]
    fn predownload_candidates_only_considers_priority_region() {
        let mut room = Room::new("r".into(), "h".into(), "H".into());
        room.queue = vec![
            item(QueueItemStatus::Ready),
            item(QueueItemStatus::Ready),
            item(QueueItemStatus::Ready),
            item(QueueItemStatus::Pending),
        ];
        let candidates = predownload_candidates(&room);
        assert_eq!(candidates.len(), 3);
    }
}
