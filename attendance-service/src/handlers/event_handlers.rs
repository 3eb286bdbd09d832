use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use eventhub_shared::attendance::{self, can_rate, AttendanceState};
use eventhub_shared::auth::CurrentUser;
use eventhub_shared::error::{AttendanceError, StoreError};
use eventhub_shared::models::{now_str, EventRecord};
use eventhub_shared::store::{EventStore, RatingStore, UserStore};
use log::{info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AttendanceResponse, AttendeeQuery, AttendeeSummary, CreateEventRequest, EventResponse,
    SubmitRatingRequest, UpdateEventRequest,
};

// POST /events
pub async fn create_event<S>(
    State(store): State<Arc<S>>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)>
where
    S: EventStore + RatingStore + UserStore,
{
    let user_id = user.require()?;
    payload.validate().map_err(AppError::bad_request)?;

    let guests: BTreeSet<String> = payload
        .guests
        .into_iter()
        .filter(|g| !g.trim().is_empty())
        .collect();

    let new_event = EventRecord {
        id: Uuid::new_v4().to_string(),
        name: payload.name.trim().to_string(),
        description: payload.description,
        category: payload.category,
        budget: payload.budget,
        entry_fee: payload.entry_fee,
        scheduled_at: payload.scheduled_at,
        is_private: payload.is_private,
        items: payload
            .items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        guests,
        attendees: BTreeSet::new(),
        created_by: user_id.to_string(),
        created_at: now_str(),
        average_rating: None,
    };

    let created = store.create_event(new_event).await?;
    info!("User {} created event {}", user_id, created.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "event": EventResponse::from(created) })),
    ))
}

// GET /events/:id
// Opening the details registers the caller as a guest.
pub async fn get_event_details<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore + RatingStore + UserStore,
{
    let event = attendance::on_view_event_details(&*store, &user, &id).await?;
    let user_id = user.require()?;

    let status = AttendanceState::of(&event, user_id);
    let rateable = can_rate(&event, Utc::now());

    Ok(Json(serde_json::json!({
        "event": EventResponse::from(event),
        "status": status,
        "statusLabel": status.label(),
        "canRate": rateable,
    })))
}

// PATCH /events/:id/attendance
pub async fn toggle_attendance<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<AttendanceResponse>>
where
    S: EventStore + RatingStore + UserStore,
{
    let outcome = attendance::toggle_attendance(&*store, &user, &id).await?;

    Ok(Json(AttendanceResponse {
        status: outcome.state,
        status_label: outcome.state.label(),
        message: outcome.notice(),
        event: EventResponse::from(outcome.event),
    }))
}

// GET /events/:id/attendees?q=
pub async fn list_attendees<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<AttendeeQuery>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore + RatingStore + UserStore,
{
    let search = query.q.unwrap_or_default();
    let users = attendance::list_attendees(&*store, &user, &id, &search).await?;

    let attendees: Vec<AttendeeSummary> = users.into_iter().map(AttendeeSummary::from).collect();

    Ok(Json(serde_json::json!({
        "attendees": attendees,
        "count": attendees.len(),
    })))
}

// GET /events/:id/rating
pub async fn get_rating<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore + RatingStore + UserStore,
{
    let user_id = user.require()?;

    let event = store
        .get_event(&id)
        .await
        .map_err(|e| AttendanceError::from_store(&id, e))?;
    let mine = store
        .get_rating(&id, user_id)
        .await
        .map_err(|e| AttendanceError::from_store(&id, e))?;

    Ok(Json(serde_json::json!({
        "eventId": event.id,
        "canRate": can_rate(&event, Utc::now()),
        "rating": mine.map(|r| r.value),
        "averageRating": event.average_rating,
    })))
}

// PUT /events/:id/rating
pub async fn submit_rating<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<SubmitRatingRequest>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore + RatingStore + UserStore,
{
    // Reject before loading anything from the store.
    user.require()?;
    let value = payload.value()?;

    let event = store
        .get_event(&id)
        .await
        .map_err(|e| AttendanceError::from_store(&id, e))?;

    let rating =
        attendance::submit_rating(&*store, &user, &event, i64::from(value), Utc::now()).await?;

    Ok(Json(serde_json::json!({
        "message": "Thanks for rating the event.",
        "eventId": rating.event_id,
        "rating": rating.value,
        "updatedAt": rating.updated_at,
    })))
}

// PATCH /events/:id
// Organizer or administrator edit. Scalar fields are written one by one; a new
// guest list goes through membership changes so attendees stay a subset.
pub async fn update_event<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<UpdateEventRequest>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore + RatingStore + UserStore,
{
    let user_id = user.require()?;
    payload.validate().map_err(AppError::bad_request)?;

    let event = store
        .get_event(&id)
        .await
        .map_err(|e| AttendanceError::from_store(&id, e))?;

    if event.created_by != user_id && !is_admin(&*store, user_id).await? {
        return Err(AppError::forbidden(
            "You don't have permission to edit this event".into(),
        ));
    }

    let updates = payload.field_updates();
    for (field, value) in &updates {
        store
            .set_event_field(&id, field, value.clone())
            .await
            .map_err(|e| AttendanceError::from_store(&id, e))?;
    }

    if let Some(guests) = payload.guest_set() {
        attendance::replace_guests(&*store, event, &guests).await?;
    }

    let updated = store
        .get_event(&id)
        .await
        .map_err(|e| AttendanceError::from_store(&id, e))?;
    info!(
        "User {} edited event {} ({} fields)",
        user_id,
        id,
        updates.len()
    );

    Ok(Json(serde_json::json!({
        "message": "Event updated successfully.",
        "event": EventResponse::from(updated),
    })))
}

// DELETE /events/:id
// Hard delete, allowed for the creator or an administrator. Ratings go first
// so a failure never leaves ratings pointing at a missing event.
pub async fn delete_event<S>(
    State(store): State<Arc<S>>,
    Path(id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore + RatingStore + UserStore,
{
    let user_id = user.require()?;
    let event = store.get_event(&id).await?;

    if event.created_by != user_id && !is_admin(&*store, user_id).await? {
        return Err(AppError::forbidden(
            "You don't have permission to delete this event".into(),
        ));
    }

    let removed_ratings = store.delete_ratings_for_event(&id).await?;
    store.delete_event(&id).await?;

    info!(
        "User {} deleted event {} ({} ratings removed)",
        user_id, id, removed_ratings
    );

    Ok(Json(serde_json::json!({
        "message": "Event deleted successfully.",
        "ratingsRemoved": removed_ratings,
    })))
}

async fn is_admin<S>(store: &S, user_id: &str) -> Result<bool>
where
    S: UserStore + ?Sized,
{
    match store.get_user(user_id).await {
        Ok(profile) => Ok(profile.is_admin()),
        Err(StoreError::NotFound(_)) => {
            warn!("No profile for user {}, treating as normal user", user_id);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
