use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use log::{debug, info};
use std::env;
use uuid::Uuid;

use crate::config::StoreConfig;

/// Whether tests should run against DynamoDB Local instead of the mock store.
pub fn use_dynamodb() -> bool {
    env::var("USE_DYNAMODB")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

pub fn local_endpoint() -> String {
    env::var("DYNAMODB_ENDPOINT").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

/// Client for DynamoDB Local with static dummy credentials.
pub async fn create_dynamo_client() -> Client {
    let endpoint = local_endpoint();
    debug!("Creating DynamoDB test client for {}", endpoint);

    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(endpoint)
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .load()
        .await;
    Client::new(&sdk_config)
}

/// Creates a pay-per-request table. `keys` is the hash key followed by an
/// optional range key; all key attributes are strings.
pub async fn create_table(
    client: &Client,
    table_name: &str,
    keys: &[&str],
) -> Result<(), String> {
    let mut request = client
        .create_table()
        .table_name(table_name)
        .billing_mode(BillingMode::PayPerRequest);

    for (i, key) in keys.iter().enumerate() {
        let key_type = if i == 0 { KeyType::Hash } else { KeyType::Range };
        let definition = AttributeDefinition::builder()
            .attribute_name(*key)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| e.to_string())?;
        let schema = KeySchemaElement::builder()
            .attribute_name(*key)
            .key_type(key_type)
            .build()
            .map_err(|e| e.to_string())?;
        request = request.attribute_definitions(definition).key_schema(schema);
    }

    request
        .send()
        .await
        .map_err(|e| DisplayErrorContext(e).to_string())?;

    info!("Created test table '{}'", table_name);
    Ok(())
}

/// Creates a fresh set of uniquely named tables so tests can run in parallel.
pub async fn create_test_tables(client: &Client) -> Result<StoreConfig, String> {
    let suffix = Uuid::new_v4().simple().to_string();
    let config = StoreConfig {
        events_table: format!("events-test-{}", suffix),
        ratings_table: format!("ratings-test-{}", suffix),
        users_table: format!("users-test-{}", suffix),
        dynamodb_endpoint: Some(local_endpoint()),
    };

    create_table(client, &config.events_table, &["id"]).await?;
    create_table(client, &config.ratings_table, &["event_id", "user_id"]).await?;
    create_table(client, &config.users_table, &["id"]).await?;

    Ok(config)
}
