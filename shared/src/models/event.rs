use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const GUESTS_FIELD: &str = "guests";
pub const ATTENDEES_FIELD: &str = "attendees";
pub const AVERAGE_RATING_FIELD: &str = "average_rating";

/// Event document as stored. Missing optional fields take their defaults
/// when the document is loaded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub entry_fee: Option<f64>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub items: Vec<String>,
    /// Everyone who viewed the event or was invited to it.
    #[serde(default)]
    pub guests: BTreeSet<String>,
    /// Guests who confirmed they will attend. Always a subset of `guests`.
    #[serde(default)]
    pub attendees: BTreeSet<String>,
    pub created_by: String,
    pub created_at: String,
    #[serde(default)]
    pub average_rating: Option<f64>,
}

impl EventRecord {
    pub fn is_guest(&self, user_id: &str) -> bool {
        self.guests.contains(user_id)
    }

    pub fn is_attendee(&self, user_id: &str) -> bool {
        self.attendees.contains(user_id)
    }

    pub fn membership_is_consistent(&self) -> bool {
        self.attendees.is_subset(&self.guests)
    }
}

/// Set union/remove operations applied atomically to one event document.
/// DynamoDB rejects two actions on one attribute, so a single change never
/// both adds and removes guests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipChange {
    pub add_guests: Vec<String>,
    pub remove_guests: Vec<String>,
    pub add_attendees: Vec<String>,
    pub remove_attendees: Vec<String>,
}

impl MembershipChange {
    pub fn join_guests(user_id: &str) -> Self {
        Self {
            add_guests: vec![user_id.to_string()],
            ..Self::default()
        }
    }

    pub fn confirm_attendance(user_id: &str) -> Self {
        Self {
            add_guests: vec![user_id.to_string()],
            add_attendees: vec![user_id.to_string()],
            ..Self::default()
        }
    }

    /// Drops the confirmation but keeps the user on the guest list.
    pub fn cancel_attendance(user_id: &str) -> Self {
        Self {
            add_guests: vec![user_id.to_string()],
            remove_attendees: vec![user_id.to_string()],
            ..Self::default()
        }
    }

    pub fn invite_guests(user_ids: &[String]) -> Self {
        Self {
            add_guests: user_ids.to_vec(),
            ..Self::default()
        }
    }

    /// Uninvites users. They lose any attendance confirmation with it.
    pub fn remove_guests(user_ids: &[String]) -> Self {
        Self {
            remove_guests: user_ids.to_vec(),
            remove_attendees: user_ids.to_vec(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add_guests.is_empty()
            && self.remove_guests.is_empty()
            && self.add_attendees.is_empty()
            && self.remove_attendees.is_empty()
    }

    pub fn apply_to(&self, event: &mut EventRecord) {
        event.guests.extend(self.add_guests.iter().cloned());
        event.attendees.extend(self.add_attendees.iter().cloned());
        for user_id in &self.remove_guests {
            event.guests.remove(user_id);
        }
        for user_id in &self.remove_attendees {
            event.attendees.remove(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> EventRecord {
        serde_json::from_value(serde_json::json!({
            "id": "evt-1",
            "name": "Launch party",
            "created_by": "owner",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let event = event();
        assert_eq!(event.budget, 0.0);
        assert!(event.items.is_empty());
        assert!(!event.is_private);
        assert!(event.guests.is_empty());
        assert!(event.attendees.is_empty());
        assert!(event.scheduled_at.is_none());
        assert!(event.average_rating.is_none());
    }

    #[test]
    fn test_cancel_keeps_user_as_guest() {
        let mut event = event();
        MembershipChange::confirm_attendance("u1").apply_to(&mut event);
        assert!(event.is_attendee("u1"));

        MembershipChange::cancel_attendance("u1").apply_to(&mut event);
        assert!(!event.is_attendee("u1"));
        assert!(event.is_guest("u1"));
        assert!(event.membership_is_consistent());
    }

    #[test]
    fn test_removing_guest_drops_attendance() {
        let mut event = event();
        MembershipChange::confirm_attendance("u1").apply_to(&mut event);
        MembershipChange::join_guests("u2").apply_to(&mut event);

        MembershipChange::remove_guests(&["u1".to_string()]).apply_to(&mut event);
        assert!(!event.is_guest("u1"));
        assert!(!event.is_attendee("u1"));
        assert!(event.is_guest("u2"));
        assert!(event.membership_is_consistent());
    }

    #[test]
    fn test_join_guests_is_idempotent() {
        let mut event = event();
        MembershipChange::join_guests("u1").apply_to(&mut event);
        MembershipChange::join_guests("u1").apply_to(&mut event);
        assert_eq!(event.guests.len(), 1);
    }
}
