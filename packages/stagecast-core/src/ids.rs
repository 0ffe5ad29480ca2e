//! Opaque identifier generation for users, rooms, and the records they own.
//!
//! IDs are 12-character hex slices of a v4 UUID, matching the shape of the
//! identifiers the original room service handed out to clients.

use uuid::Uuid;

/// Generates a fresh 12-character opaque identifier.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_twelve_chars() {
        assert_eq!(new_id().len(), 12);
    }

    #[test]
    fn ids_are_effectively_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(new_id()));
        }
    }
}
