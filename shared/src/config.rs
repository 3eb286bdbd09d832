use log::debug;
use std::env;

pub const DEFAULT_EVENTS_TABLE: &str = "eventhub-events";
pub const DEFAULT_RATINGS_TABLE: &str = "eventhub-ratings";
pub const DEFAULT_USERS_TABLE: &str = "eventhub-users";

/// Table names and endpoint used by the DynamoDB store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub events_table: String,
    pub ratings_table: String,
    pub users_table: String,
    /// Overrides the DynamoDB endpoint, e.g. for DynamoDB Local.
    pub dynamodb_endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            events_table: DEFAULT_EVENTS_TABLE.to_string(),
            ratings_table: DEFAULT_RATINGS_TABLE.to_string(),
            users_table: DEFAULT_USERS_TABLE.to_string(),
            dynamodb_endpoint: None,
        }
    }
}

impl StoreConfig {
    /// Reads EVENTS_TABLE, RATINGS_TABLE, USERS_TABLE and DYNAMODB_ENDPOINT,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            events_table: var_or("EVENTS_TABLE", defaults.events_table),
            ratings_table: var_or("RATINGS_TABLE", defaults.ratings_table),
            users_table: var_or("USERS_TABLE", defaults.users_table),
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
        };
        debug!("Loaded store config: {:?}", config);
        config
    }
}

fn var_or(name: &str, default: String) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
