use chrono::Utc;

mod event;
mod rating;
mod user;

pub use event::{
    EventRecord, MembershipChange, ATTENDEES_FIELD, AVERAGE_RATING_FIELD, GUESTS_FIELD,
};
pub use rating::{Rating, MAX_RATING, MIN_RATING};
pub use user::{Address, Role, User};

/// Current time as an RFC 3339 string, the format used for stored timestamps.
pub fn now_str() -> String {
    Utc::now().to_rfc3339()
}
