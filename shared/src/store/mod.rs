use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::models::{EventRecord, MembershipChange, Rating, User, ATTENDEES_FIELD, GUESTS_FIELD};

pub mod dynamo;

/// Event documents. Membership sets are only changed through
/// `update_membership`, which must apply the whole change atomically.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, event: EventRecord) -> StoreResult<EventRecord>;
    async fn get_event(&self, id: &str) -> StoreResult<EventRecord>;
    /// Sets a single (possibly nested, dot separated) field on an existing event.
    async fn set_event_field(
        &self,
        id: &str,
        path: &str,
        value: serde_json::Value,
    ) -> StoreResult<()>;
    async fn update_membership(
        &self,
        id: &str,
        change: &MembershipChange,
    ) -> StoreResult<EventRecord>;
    async fn delete_event(&self, id: &str) -> StoreResult<()>;
}

/// Rating records keyed by (event_id, user_id). `put_rating` overwrites.
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn put_rating(&self, rating: Rating) -> StoreResult<Rating>;
    async fn get_rating(&self, event_id: &str, user_id: &str) -> StoreResult<Option<Rating>>;
    async fn get_ratings_for_event(&self, event_id: &str) -> StoreResult<Vec<Rating>>;
    /// Returns the number of deleted records.
    async fn delete_ratings_for_event(&self, event_id: &str) -> StoreResult<usize>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn put_user(&self, user: User) -> StoreResult<User>;
    async fn get_user(&self, id: &str) -> StoreResult<User>;
    /// Ids that don't resolve are skipped.
    async fn get_users(&self, ids: &[String]) -> StoreResult<Vec<User>>;
}

/// Splits a dotted field path into segments. The id and the membership sets
/// can't be targeted.
pub fn parse_field_path(path: &str) -> StoreResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();

    let valid = segments.iter().all(|s| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if !valid {
        return Err(StoreError::InvalidPath(path.to_string()));
    }

    if matches!(segments[0], "id" | GUESTS_FIELD | ATTENDEES_FIELD) {
        return Err(StoreError::InvalidPath(format!(
            "{} cannot be set directly",
            segments[0]
        )));
    }

    Ok(segments)
}
