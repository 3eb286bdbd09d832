//! Guest/attendee reconciliation and the rating gate.
//!
//! Every operation takes the caller as an explicit `CurrentUser`. Membership
//! changes go through `EventStore::update_membership`, so the two sets are
//! always written together and `attendees ⊆ guests` holds after every call.
//! Nothing here retries; a failed write is returned and the caller keeps its
//! previous state.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::auth::CurrentUser;
use crate::error::AttendanceError;
use crate::models::{
    now_str, EventRecord, MembershipChange, Rating, User, AVERAGE_RATING_FIELD, MAX_RATING,
    MIN_RATING,
};
use crate::store::{EventStore, RatingStore, UserStore};

pub type Result<T> = std::result::Result<T, AttendanceError>;

/// Where a user stands with one event.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    NotGuest,
    Guest,
    Attendee,
}

impl AttendanceState {
    pub fn of(event: &EventRecord, user_id: &str) -> Self {
        if event.is_attendee(user_id) {
            AttendanceState::Attendee
        } else if event.is_guest(user_id) {
            AttendanceState::Guest
        } else {
            AttendanceState::NotGuest
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceState::NotGuest => "Not invited",
            AttendanceState::Guest => "Guest",
            AttendanceState::Attendee => "Confirmed",
        }
    }
}

/// Result of a successful attendance toggle.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceOutcome {
    pub state: AttendanceState,
    pub event: EventRecord,
}

impl AttendanceOutcome {
    pub fn notice(&self) -> &'static str {
        match self.state {
            AttendanceState::Attendee => "You confirmed your attendance at the event.",
            _ => "You removed your attendance confirmation, but you remain a guest.",
        }
    }
}

/// Loads the event and adds the caller to `guests` if they aren't there yet.
pub async fn on_view_event_details<S>(
    store: &S,
    user: &CurrentUser,
    event_id: &str,
) -> Result<EventRecord>
where
    S: EventStore + ?Sized,
{
    let user_id = user.require()?;

    let event = store
        .get_event(event_id)
        .await
        .map_err(|e| AttendanceError::from_store(event_id, e))?;

    if event.is_guest(user_id) {
        debug!("User {} already a guest of event {}", user_id, event_id);
        return Ok(event);
    }

    let updated = store
        .update_membership(event_id, &MembershipChange::join_guests(user_id))
        .await
        .map_err(|e| {
            error!("Failed to add guest {} to event {}: {}", user_id, event_id, e);
            AttendanceError::from_store(event_id, e)
        })?;

    info!("User {} joined guests of event {}", user_id, event_id);
    Ok(updated)
}

/// Flips the caller between Guest and Attendee.
pub async fn toggle_attendance<S>(
    store: &S,
    user: &CurrentUser,
    event_id: &str,
) -> Result<AttendanceOutcome>
where
    S: EventStore + ?Sized,
{
    let user_id = user.require()?;

    let event = store
        .get_event(event_id)
        .await
        .map_err(|e| AttendanceError::from_store(event_id, e))?;

    let (change, target) = if event.is_attendee(user_id) {
        (MembershipChange::cancel_attendance(user_id), AttendanceState::Guest)
    } else {
        (MembershipChange::confirm_attendance(user_id), AttendanceState::Attendee)
    };

    let updated = store
        .update_membership(event_id, &change)
        .await
        .map_err(|e| {
            error!(
                "Failed to update attendance of {} for event {}: {}",
                user_id, event_id, e
            );
            AttendanceError::from_store(event_id, e)
        })?;

    if !updated.membership_is_consistent() {
        warn!(
            "Event {} has attendees that are not guests: {:?}",
            event_id,
            updated.attendees.difference(&updated.guests).collect::<Vec<_>>()
        );
    }

    info!(
        "User {} is now {:?} for event {}",
        user_id, target, event_id
    );

    Ok(AttendanceOutcome {
        state: target,
        event: updated,
    })
}

/// True iff the event's scheduled time is strictly before `now`. Events
/// without a date can't be rated.
pub fn can_rate(event: &EventRecord, now: DateTime<Utc>) -> bool {
    event.scheduled_at.map_or(false, |at| at < now)
}

pub fn validate_rating(rating: i64) -> Result<u8> {
    if rating < MIN_RATING as i64 || rating > MAX_RATING as i64 {
        return Err(AttendanceError::InvalidRating(format!(
            "rating must be between {} and {}, got {}",
            MIN_RATING, MAX_RATING, rating
        )));
    }
    Ok(rating as u8)
}

/// Upserts the caller's rating for `event`, joining them to its guests first
/// if needed. Both preconditions are checked before the store is touched.
pub async fn submit_rating<S>(
    store: &S,
    user: &CurrentUser,
    event: &EventRecord,
    rating: i64,
    now: DateTime<Utc>,
) -> Result<Rating>
where
    S: EventStore + RatingStore + ?Sized,
{
    let user_id = user.require()?;
    let value = validate_rating(rating)?;

    if !can_rate(event, now) {
        return Err(AttendanceError::InvalidRating(format!(
            "event {} has not happened yet",
            event.id
        )));
    }

    // Raters count as guests, the same way a toggle does.
    if !event.is_guest(user_id) {
        store
            .update_membership(&event.id, &MembershipChange::join_guests(user_id))
            .await
            .map_err(|e| {
                error!("Failed to add rater {} to event {}: {}", user_id, event.id, e);
                AttendanceError::from_store(&event.id, e)
            })?;
    }

    let record = store
        .put_rating(Rating {
            event_id: event.id.clone(),
            user_id: user_id.to_string(),
            value,
            updated_at: now_str(),
        })
        .await
        .map_err(|e| {
            error!("Failed to store rating for event {}: {}", event.id, e);
            AttendanceError::from_store(&event.id, e)
        })?;

    info!("User {} rated event {} with {}", user_id, event.id, value);

    // The rating is committed at this point; the cached average can lag.
    if let Err(e) = refresh_average_rating(store, &event.id).await {
        warn!("Could not refresh average rating of event {}: {}", event.id, e);
    }

    Ok(record)
}

/// Makes the guest list of `event` equal to `desired`. Removals go first and
/// also drop the removed users from `attendees`; new guests are added after.
pub async fn replace_guests<S>(
    store: &S,
    event: EventRecord,
    desired: &BTreeSet<String>,
) -> Result<EventRecord>
where
    S: EventStore + ?Sized,
{
    let removed: Vec<String> = event.guests.difference(desired).cloned().collect();
    let added: Vec<String> = desired.difference(&event.guests).cloned().collect();
    let event_id = event.id.clone();
    let mut current = event;

    for change in [
        MembershipChange::remove_guests(&removed),
        MembershipChange::invite_guests(&added),
    ] {
        if change.is_empty() {
            continue;
        }
        current = store
            .update_membership(&event_id, &change)
            .await
            .map_err(|e| {
                error!("Failed to update guest list of event {}: {}", event_id, e);
                AttendanceError::from_store(&event_id, e)
            })?;
    }

    info!(
        "Guest list of event {} edited: {} removed, {} added",
        event_id,
        removed.len(),
        added.len()
    );
    Ok(current)
}

/// Recomputes `average_rating` on the event from all its rating records.
pub async fn refresh_average_rating<S>(store: &S, event_id: &str) -> Result<Option<f64>>
where
    S: EventStore + RatingStore + ?Sized,
{
    let ratings = store
        .get_ratings_for_event(event_id)
        .await
        .map_err(|e| AttendanceError::from_store(event_id, e))?;

    let average = average_rating(&ratings);

    store
        .set_event_field(event_id, AVERAGE_RATING_FIELD, serde_json::json!(average))
        .await
        .map_err(|e| AttendanceError::from_store(event_id, e))?;

    Ok(average)
}

pub fn average_rating(ratings: &[Rating]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let total: u32 = ratings.iter().map(|r| r.value as u32).sum();
    Some(total as f64 / ratings.len() as f64)
}

/// Users confirmed for the event, narrowed by `query` and sorted by name.
pub async fn list_attendees<S>(
    store: &S,
    user: &CurrentUser,
    event_id: &str,
    query: &str,
) -> Result<Vec<User>>
where
    S: EventStore + UserStore + ?Sized,
{
    user.require()?;

    let event = store
        .get_event(event_id)
        .await
        .map_err(|e| AttendanceError::from_store(event_id, e))?;

    let ids: Vec<String> = event.attendees.iter().cloned().collect();
    let users = store
        .get_users(&ids)
        .await
        .map_err(|e| AttendanceError::from_store(event_id, e))?;

    let mut matches = filter_attendees(users, query);
    matches.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(matches)
}

/// Keeps users whose name or email contains `query` ignoring case, or whose
/// national id contains it verbatim.
pub fn filter_attendees(users: Vec<User>, query: &str) -> Vec<User> {
    let query = query.trim();
    if query.is_empty() {
        return users;
    }
    let needle = query.to_lowercase();

    users
        .into_iter()
        .filter(|u| {
            u.name.to_lowercase().contains(&needle)
                || u.email.to_lowercase().contains(&needle)
                || u.national_id.contains(query)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, Role};
    use crate::test_utils::mock_store::MockStore;
    use chrono::TimeZone;

    fn event_at(id: &str, scheduled_at: Option<DateTime<Utc>>) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            name: "Team dinner".into(),
            description: "End of quarter".into(),
            category: "social".into(),
            budget: 300.0,
            entry_fee: Some(25.0),
            scheduled_at,
            is_private: true,
            items: vec!["drinks".into(), "cake".into()],
            guests: BTreeSet::new(),
            attendees: BTreeSet::new(),
            created_by: "owner".into(),
            created_at: "2023-12-01T00:00:00Z".into(),
            average_rating: None,
        }
    }

    fn user(id: &str, name: &str, email: &str, national_id: &str) -> User {
        User {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            national_id: national_id.into(),
            birth_date: None,
            address: Address::default(),
            role: Role::Normal,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    async fn seeded(event: EventRecord) -> MockStore {
        let store = MockStore::new();
        store.create_event(event).await.unwrap();
        store.reset_write_count();
        store
    }

    #[tokio::test]
    async fn test_view_adds_guest_once() {
        let store = seeded(event_at("evt-1", None)).await;
        let alice = CurrentUser::authenticated("alice");

        let first = on_view_event_details(&store, &alice, "evt-1").await.unwrap();
        let second = on_view_event_details(&store, &alice, "evt-1").await.unwrap();

        assert_eq!(first.guests.len(), 1);
        assert_eq!(second.guests.len(), 1);
        assert!(second.is_guest("alice"));
        assert!(!second.is_attendee("alice"));
        // The second view finds alice already listed and skips the write.
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_view_unknown_event() {
        let store = MockStore::new();
        let err = on_view_event_details(&store, &CurrentUser::authenticated("alice"), "nope")
            .await
            .unwrap_err();
        assert_eq!(err, AttendanceError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_toggle_from_not_guest_confirms() {
        let store = seeded(event_at("evt-1", None)).await;
        let alice = CurrentUser::authenticated("alice");

        let outcome = toggle_attendance(&store, &alice, "evt-1").await.unwrap();

        assert_eq!(outcome.state, AttendanceState::Attendee);
        let expected: BTreeSet<String> = ["alice".to_string()].into_iter().collect();
        assert_eq!(outcome.event.guests, expected);
        assert_eq!(outcome.event.attendees, expected);
        assert_eq!(outcome.notice(), "You confirmed your attendance at the event.");
    }

    #[tokio::test]
    async fn test_toggle_from_attendee_cancels_but_keeps_guest() {
        let mut event = event_at("evt-1", None);
        event.guests.insert("alice".into());
        event.attendees.insert("alice".into());
        let store = seeded(event).await;

        let outcome = toggle_attendance(&store, &CurrentUser::authenticated("alice"), "evt-1")
            .await
            .unwrap();

        assert_eq!(outcome.state, AttendanceState::Guest);
        assert_eq!(outcome.event.guests.len(), 1);
        assert!(outcome.event.is_guest("alice"));
        assert!(outcome.event.attendees.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_keeps_attendees_subset_of_guests() {
        let store = seeded(event_at("evt-1", None)).await;
        let users = ["alice", "bob", "carol"];

        for round in 0..4 {
            for (i, id) in users.iter().enumerate() {
                if (round + i) % 2 == 0 {
                    toggle_attendance(&store, &CurrentUser::authenticated(*id), "evt-1")
                        .await
                        .unwrap();
                } else {
                    on_view_event_details(&store, &CurrentUser::authenticated(*id), "evt-1")
                        .await
                        .unwrap();
                }
                let event = store.get_event("evt-1").await.unwrap();
                assert!(event.membership_is_consistent());
            }
        }
    }

    #[tokio::test]
    async fn test_toggle_write_failure_leaves_state_unchanged() {
        let mut event = event_at("evt-1", None);
        event.guests.insert("alice".into());
        let store = seeded(event.clone()).await;
        store.set_fail_writes(true);

        let err = toggle_attendance(&store, &CurrentUser::authenticated("alice"), "evt-1")
            .await
            .unwrap_err();

        assert!(matches!(err, AttendanceError::WriteFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(store.get_event("evt-1").await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_anonymous_caller_never_writes() {
        let store = seeded(event_at("evt-1", Some(ymd(2020, 1, 1)))).await;
        let anon = CurrentUser::anonymous();
        let event = store.get_event("evt-1").await.unwrap();

        assert_eq!(
            on_view_event_details(&store, &anon, "evt-1").await.unwrap_err(),
            AttendanceError::NotAuthenticated
        );
        assert_eq!(
            toggle_attendance(&store, &anon, "evt-1").await.unwrap_err(),
            AttendanceError::NotAuthenticated
        );
        assert_eq!(
            submit_rating(&store, &anon, &event, 4, ymd(2024, 1, 1))
                .await
                .unwrap_err(),
            AttendanceError::NotAuthenticated
        );
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_can_rate_boundary_is_strict() {
        let at = ymd(2024, 6, 1);
        let event = event_at("evt-1", Some(at));

        assert!(!can_rate(&event, at - chrono::Duration::seconds(1)));
        assert!(!can_rate(&event, at));
        assert!(can_rate(&event, at + chrono::Duration::seconds(1)));
        assert!(!can_rate(&event_at("evt-2", None), at));
    }

    #[tokio::test]
    async fn test_rating_out_of_range_makes_no_store_call() {
        let store = MockStore::new();
        let event = event_at("evt-1", Some(ymd(2020, 1, 1)));
        let alice = CurrentUser::authenticated("alice");

        for bad in [0, 6, -1] {
            let err = submit_rating(&store, &alice, &event, bad, ymd(2024, 1, 1))
                .await
                .unwrap_err();
            assert!(matches!(err, AttendanceError::InvalidRating(_)));
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_rating_future_event_rejected() {
        let store = seeded(event_at("evt-1", Some(ymd(2030, 1, 1)))).await;
        let event = store.get_event("evt-1").await.unwrap();
        let now = ymd(2024, 1, 1);

        assert!(!can_rate(&event, now));
        let err = submit_rating(&store, &CurrentUser::authenticated("alice"), &event, 5, now)
            .await
            .unwrap_err();

        assert!(matches!(err, AttendanceError::InvalidRating(_)));
        assert_eq!(store.write_count(), 0);
        assert!(store.get_rating("evt-1", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rating_overwrites_and_updates_average() {
        let store = seeded(event_at("evt-1", Some(ymd(2023, 1, 1)))).await;
        let event = store.get_event("evt-1").await.unwrap();
        let now = ymd(2024, 1, 1);

        submit_rating(&store, &CurrentUser::authenticated("alice"), &event, 2, now)
            .await
            .unwrap();
        submit_rating(&store, &CurrentUser::authenticated("alice"), &event, 4, now)
            .await
            .unwrap();
        submit_rating(&store, &CurrentUser::authenticated("bob"), &event, 5, now)
            .await
            .unwrap();

        let ratings = store.get_ratings_for_event("evt-1").await.unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(
            store.get_rating("evt-1", "alice").await.unwrap().map(|r| r.value),
            Some(4)
        );
        assert_eq!(
            store.get_event("evt-1").await.unwrap().average_rating,
            Some(4.5)
        );
    }

    #[tokio::test]
    async fn test_rating_makes_rater_a_guest() {
        let store = seeded(event_at("evt-1", Some(ymd(2023, 1, 1)))).await;
        let event = store.get_event("evt-1").await.unwrap();

        submit_rating(&store, &CurrentUser::authenticated("dave"), &event, 3, ymd(2024, 1, 1))
            .await
            .unwrap();

        let stored = store.get_event("evt-1").await.unwrap();
        assert!(stored.is_guest("dave"));
        assert!(!stored.is_attendee("dave"));
    }

    #[tokio::test]
    async fn test_replace_guests_drops_removed_attendees() {
        let mut event = event_at("evt-1", None);
        for id in ["alice", "bob"] {
            event.guests.insert(id.into());
        }
        event.attendees.insert("alice".into());
        event.attendees.insert("bob".into());
        let store = seeded(event.clone()).await;

        let desired: BTreeSet<String> = ["bob".to_string(), "carol".to_string()]
            .into_iter()
            .collect();
        let updated = replace_guests(&store, event, &desired).await.unwrap();

        assert_eq!(updated.guests, desired);
        assert!(!updated.is_attendee("alice"));
        assert!(updated.is_attendee("bob"));
        assert!(updated.membership_is_consistent());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_replace_guests_unchanged_makes_no_write() {
        let mut event = event_at("evt-1", None);
        event.guests.insert("alice".into());
        let store = seeded(event.clone()).await;
        let desired = event.guests.clone();

        replace_guests(&store, event, &desired).await.unwrap();
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_tolerates_inconsistent_document() {
        let mut event = event_at("evt-1", None);
        event.attendees.insert("stray".into());
        let store = seeded(event).await;

        let outcome = toggle_attendance(&store, &CurrentUser::authenticated("alice"), "evt-1")
            .await
            .unwrap();
        assert_eq!(outcome.state, AttendanceState::Attendee);
        assert!(!outcome.event.membership_is_consistent());
    }

    #[test]
    fn test_filter_attendees() {
        let users = vec![
            user("1", "Ana Souza", "ana@example.com", "123.456.789-00"),
            user("2", "Bruno Lima", "bruno@example.com", "987.654.321-00"),
            user("3", "Carla Dias", "carla@mail.org", "111.222.333-44"),
        ];

        assert_eq!(filter_attendees(users.clone(), "").len(), 3);
        assert_eq!(filter_attendees(users.clone(), "   ").len(), 3);
        assert_eq!(filter_attendees(users.clone(), "  bruno ")[0].id, "2");
        assert_eq!(filter_attendees(users.clone(), "ANA")[0].id, "1");
        assert_eq!(filter_attendees(users.clone(), "example.com").len(), 2);
        assert_eq!(filter_attendees(users.clone(), "987.654")[0].id, "2");
        assert!(filter_attendees(users, "zzz").is_empty());
    }

    #[tokio::test]
    async fn test_list_attendees_skips_unknown_users() {
        let mut event = event_at("evt-1", None);
        for id in ["u1", "u2", "ghost"] {
            event.guests.insert(id.into());
            event.attendees.insert(id.into());
        }
        event.guests.insert("u3".into());
        let store = seeded(event).await;
        store
            .put_user(user("u1", "Zoe", "zoe@example.com", "1"))
            .await
            .unwrap();
        store
            .put_user(user("u2", "Adam", "adam@example.com", "2"))
            .await
            .unwrap();
        store
            .put_user(user("u3", "Guest Only", "guest@example.com", "3"))
            .await
            .unwrap();

        let attendees = list_attendees(&store, &CurrentUser::authenticated("u1"), "evt-1", "")
            .await
            .unwrap();
        let names: Vec<&str> = attendees.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Adam", "Zoe"]);
    }

    #[test]
    fn test_attendance_state_of() {
        let mut event = event_at("evt-1", None);
        assert_eq!(AttendanceState::of(&event, "alice"), AttendanceState::NotGuest);
        event.guests.insert("alice".into());
        assert_eq!(AttendanceState::of(&event, "alice"), AttendanceState::Guest);
        event.attendees.insert("alice".into());
        assert_eq!(AttendanceState::of(&event, "alice"), AttendanceState::Attendee);
    }
}
