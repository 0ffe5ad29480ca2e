//! Broadcast primitives with per-recipient error isolation.
//!
//! Every helper here follows the same two-phase shape required by §5: build
//! the list of `(user_id, envelope)` pairs while holding whatever lock
//! protects the source data, then release the lock and perform the sends.
//! `Registry::send_to` already isolates failures per recipient, so a single
//! slow or disconnected client never blocks or fails delivery to the rest.

use serde::Serialize;

use crate::registry::Registry;

/// Sends the same envelope to every ID in `recipients`.
pub fn broadcast<T: Serialize>(registry: &Registry, recipients: &[String], envelope: &T) {
    for user_id in recipients {
        registry.send_to(user_id, envelope);
    }
}

/// Sends the same envelope to every ID in `recipients` except `exclude`.
pub fn broadcast_except<T: Serialize>(
    registry: &Registry,
    recipients: &[String],
    exclude: &str,
    envelope: &T,
) {
    for user_id in recipients {
        if user_id != exclude {
            registry.send_to(user_id, envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn broadcast_reaches_all_recipients() {
        let registry = Registry::new();
        let mut ids = vec![];
        let mut receivers = vec![];
        for _ in 0..3 {
            let (tx, rx) = mpsc::unbounded_channel();
            let user = User::new();
            ids.push(user.id.clone());
            registry.register_user(user, tx);
            receivers.push(rx);
        }

        broadcast(&registry, &ids, &json!({"type": "ping"}));

        for rx in receivers.iter_mut() {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[test]
    fn broadcast_except_skips_excluded() {
        let registry = Registry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = User::new();
        let b = User::new();
        let (id_a, id_b) = (a.id.clone(), b.id.clone());
        registry.register_user(a, tx_a);
        registry.register_user(b, tx_b);

        broadcast_except(&registry, &[id_a.clone(), id_b.clone()], &id_a, &json!({"type": "ping"}));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn broadcast_to_disconnected_recipient_does_not_panic() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let user = User::new();
        let id = user.id.clone();
        registry.register_user(user, tx);
        drop(rx);

        broadcast(&registry, &[id], &json!({"type": "ping"}));
    }
}
