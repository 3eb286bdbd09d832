use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::models::{EventRecord, MembershipChange, Rating, User};
use crate::store::{parse_field_path, EventStore, RatingStore, UserStore};

/// In-memory store implementing every store trait. Counts write attempts and
/// can be told to fail them.
#[derive(Default)]
pub struct MockStore {
    events: Mutex<HashMap<String, EventRecord>>,
    ratings: Mutex<HashMap<(String, String), Rating>>,
    users: Mutex<HashMap<String, User>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write calls made, including failed ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_write_count(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn begin_write(&self) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Dynamo("simulated write failure".into()));
        }
        Ok(())
    }
}

fn event_not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("Event {} not found", id))
}

fn set_path(
    doc: &mut serde_json::Value,
    segments: &[&str],
    value: serde_json::Value,
) -> StoreResult<()> {
    let Some((last, parents)) = segments.split_last() else {
        return Err(StoreError::InvalidPath(String::new()));
    };

    let mut current = doc;
    for segment in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidPath(segments.join(".")))?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::json!({}));
    }

    current
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidPath(segments.join(".")))?
        .insert(last.to_string(), value);
    Ok(())
}

#[async_trait]
impl EventStore for MockStore {
    async fn create_event(&self, event: EventRecord) -> StoreResult<EventRecord> {
        self.begin_write()?;
        lock(&self.events).insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> StoreResult<EventRecord> {
        lock(&self.events)
            .get(id)
            .cloned()
            .ok_or_else(|| event_not_found(id))
    }

    async fn set_event_field(
        &self,
        id: &str,
        path: &str,
        value: serde_json::Value,
    ) -> StoreResult<()> {
        let segments = parse_field_path(path)?;
        self.begin_write()?;

        let mut events = lock(&self.events);
        let event = events.get_mut(id).ok_or_else(|| event_not_found(id))?;

        let mut doc = serde_json::to_value(&*event)?;
        set_path(&mut doc, &segments, value)?;
        *event = serde_json::from_value(doc)?;
        Ok(())
    }

    async fn update_membership(
        &self,
        id: &str,
        change: &MembershipChange,
    ) -> StoreResult<EventRecord> {
        self.begin_write()?;

        let mut events = lock(&self.events);
        let event = events.get_mut(id).ok_or_else(|| event_not_found(id))?;
        change.apply_to(event);
        Ok(event.clone())
    }

    async fn delete_event(&self, id: &str) -> StoreResult<()> {
        self.begin_write()?;
        lock(&self.events)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| event_not_found(id))
    }
}

#[async_trait]
impl RatingStore for MockStore {
    async fn put_rating(&self, rating: Rating) -> StoreResult<Rating> {
        self.begin_write()?;
        lock(&self.ratings).insert(
            (rating.event_id.clone(), rating.user_id.clone()),
            rating.clone(),
        );
        Ok(rating)
    }

    async fn get_rating(&self, event_id: &str, user_id: &str) -> StoreResult<Option<Rating>> {
        Ok(lock(&self.ratings)
            .get(&(event_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn get_ratings_for_event(&self, event_id: &str) -> StoreResult<Vec<Rating>> {
        let mut ratings: Vec<Rating> = lock(&self.ratings)
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(ratings)
    }

    async fn delete_ratings_for_event(&self, event_id: &str) -> StoreResult<usize> {
        self.begin_write()?;
        let mut ratings = lock(&self.ratings);
        let before = ratings.len();
        ratings.retain(|(e, _), _| e != event_id);
        Ok(before - ratings.len())
    }
}

#[async_trait]
impl UserStore for MockStore {
    async fn put_user(&self, user: User) -> StoreResult<User> {
        self.begin_write()?;
        lock(&self.users).insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StoreResult<User> {
        lock(&self.users)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("User {} not found", id)))
    }

    async fn get_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let users = lock(&self.users);
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}
