use serde::{Deserialize, Serialize};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// One user's rating of one event, keyed by (event_id, user_id).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Rating {
    pub event_id: String,
    pub user_id: String,
    pub value: u8,
    pub updated_at: String,
}
