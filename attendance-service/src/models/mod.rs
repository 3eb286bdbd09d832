use chrono::{DateTime, Utc};
use eventhub_shared::attendance::{validate_rating, AttendanceState};
use eventhub_shared::error::AttendanceError;
use eventhub_shared::models::{EventRecord, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

// Request DTOs
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub budget: f64,
    #[serde(default)]
    pub entry_fee: Option<f64>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub items: Vec<String>,
    /// User ids invited up front; they start out as guests.
    #[serde(default)]
    pub guests: Vec<String>,
}

impl CreateEventRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.description.trim().is_empty() {
            return Err("Name and description are required.".into());
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err("Budget must be a non-negative number.".into());
        }
        if let Some(fee) = self.entry_fee {
            if !fee.is_finite() || fee < 0.0 {
                return Err("Entry fee must be a non-negative number.".into());
            }
        }
        Ok(())
    }
}

/// `rating` is taken as raw JSON so that fractions, strings or a missing value
/// surface as `InvalidRating` instead of an extractor rejection.
#[derive(Deserialize, Debug)]
pub struct SubmitRatingRequest {
    #[serde(default)]
    pub rating: serde_json::Value,
}

impl SubmitRatingRequest {
    pub fn value(&self) -> Result<u8, AttendanceError> {
        match self.rating.as_i64() {
            Some(rating) => validate_rating(rating),
            None => Err(AttendanceError::InvalidRating(format!(
                "rating must be a whole number, got {}",
                self.rating
            ))),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub budget: Option<f64>,
    pub entry_fee: Option<f64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub is_private: Option<bool>,
    pub items: Option<Vec<String>>,
    /// Full replacement of the guest list.
    pub guests: Option<Vec<String>>,
}

impl UpdateEventRequest {
    pub fn validate(&self) -> Result<(), String> {
        let blank = |v: &Option<String>| v.as_deref().map_or(false, |s| s.trim().is_empty());
        if blank(&self.name) || blank(&self.description) {
            return Err("Name and description can't be empty.".into());
        }
        if let Some(budget) = self.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err("Budget must be a non-negative number.".into());
            }
        }
        if let Some(fee) = self.entry_fee {
            if !fee.is_finite() || fee < 0.0 {
                return Err("Entry fee must be a non-negative number.".into());
            }
        }
        Ok(())
    }

    /// Scalar fields to write, keyed by their stored name.
    pub fn field_updates(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut updates = Vec::new();
        if let Some(name) = &self.name {
            updates.push(("name", json!(name.trim())));
        }
        if let Some(description) = &self.description {
            updates.push(("description", json!(description)));
        }
        if let Some(category) = &self.category {
            updates.push(("category", json!(category)));
        }
        if let Some(budget) = self.budget {
            updates.push(("budget", json!(budget)));
        }
        if let Some(fee) = self.entry_fee {
            updates.push(("entry_fee", json!(fee)));
        }
        if let Some(at) = self.scheduled_at {
            updates.push(("scheduled_at", json!(at)));
        }
        if let Some(is_private) = self.is_private {
            updates.push(("is_private", json!(is_private)));
        }
        if let Some(items) = &self.items {
            let items: Vec<&str> = items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .collect();
            updates.push(("items", json!(items)));
        }
        updates
    }

    pub fn guest_set(&self) -> Option<BTreeSet<String>> {
        self.guests.as_ref().map(|guests| {
            guests
                .iter()
                .map(|g| g.trim())
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct AttendeeQuery {
    #[serde(default)]
    pub q: Option<String>,
}

// Response DTOs
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub budget: f64,
    pub entry_fee: Option<f64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub is_private: bool,
    pub items: Vec<String>,
    pub guests: Vec<String>,
    pub attendees: Vec<String>,
    pub created_by: String,
    pub created_at: String,
    pub average_rating: Option<f64>,
}

impl From<EventRecord> for EventResponse {
    fn from(event: EventRecord) -> Self {
        Self {
            id: event.id,
            name: event.name,
            description: event.description,
            category: event.category,
            budget: event.budget,
            entry_fee: event.entry_fee,
            scheduled_at: event.scheduled_at,
            is_private: event.is_private,
            items: event.items,
            guests: event.guests.into_iter().collect(),
            attendees: event.attendees.into_iter().collect(),
            created_by: event.created_by,
            created_at: event.created_at,
            average_rating: event.average_rating,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub status: AttendanceState,
    pub status_label: &'static str,
    pub message: &'static str,
    pub event: EventResponse,
}

/// The fields an attendee list shows; address and birth date stay private.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub national_id: String,
}

impl From<User> for AttendeeSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            national_id: user.national_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, budget: f64, fee: Option<f64>) -> CreateEventRequest {
        CreateEventRequest {
            name: name.into(),
            description: "desc".into(),
            category: String::new(),
            budget,
            entry_fee: fee,
            scheduled_at: None,
            is_private: false,
            items: vec![],
            guests: vec![],
        }
    }

    #[test]
    fn test_create_event_validation() {
        assert!(request("Party", 10.0, None).validate().is_ok());
        assert!(request("  ", 10.0, None).validate().is_err());
        assert!(request("Party", -1.0, None).validate().is_err());
        assert!(request("Party", f64::NAN, None).validate().is_err());
        assert!(request("Party", 0.0, Some(-5.0)).validate().is_err());
    }

    fn rating(value: serde_json::Value) -> Result<u8, AttendanceError> {
        serde_json::from_value::<SubmitRatingRequest>(json!({ "rating": value }))
            .unwrap()
            .value()
    }

    #[test]
    fn test_rating_must_be_whole_number_in_range() {
        assert_eq!(rating(json!(4)), Ok(4));
        for bad in [json!(4.5), json!("5"), json!(null), json!(0), json!(6)] {
            assert!(matches!(rating(bad), Err(AttendanceError::InvalidRating(_))));
        }
        let missing: SubmitRatingRequest = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(missing.value(), Err(AttendanceError::InvalidRating(_))));
    }

    #[test]
    fn test_update_event_field_updates() {
        let update: UpdateEventRequest = serde_json::from_value(json!({
            "name": "  Picnic ",
            "isPrivate": true,
            "items": ["bread", " ", "cheese"],
            "guests": ["bob", " ", "carol"]
        }))
        .unwrap();

        assert!(update.validate().is_ok());
        assert_eq!(
            update.field_updates(),
            vec![
                ("name", json!("Picnic")),
                ("is_private", json!(true)),
                ("items", json!(["bread", "cheese"])),
            ]
        );
        assert_eq!(update.guest_set().map(|g| g.len()), Some(2));

        let blank: UpdateEventRequest =
            serde_json::from_value(json!({ "description": "" })).unwrap();
        assert!(blank.validate().is_err());
    }
}
