use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};

use super::{parse_field_path, EventStore, RatingStore, UserStore};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{EventRecord, MembershipChange, Rating, User, ATTENDEES_FIELD, GUESTS_FIELD};

type Item = HashMap<String, AttributeValue>;

/// DynamoDB backed store. Events, ratings and users live in separate tables.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
    config: StoreConfig,
}

impl DynamoStore {
    pub async fn new() -> Self {
        let config = StoreConfig::from_env();
        let client = create_client(&config).await;
        Self::with_client_and_config(client, config)
    }

    pub fn with_client_and_config(client: Client, config: StoreConfig) -> Self {
        info!(
            "DynamoStore using tables events={}, ratings={}, users={}",
            config.events_table, config.ratings_table, config.users_table
        );
        Self { client, config }
    }
}

pub async fn create_client(config: &StoreConfig) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(endpoint) = &config.dynamodb_endpoint {
        debug!("Using DynamoDB endpoint override {}", endpoint);
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;
    Client::new(&sdk_config)
}

fn dynamo_error<E>(op: &str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Dynamo(format!("{} failed: {}", op, DisplayErrorContext(&err)))
}

fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

// DynamoDB has no empty sets, so empty membership sets are left off the item.
fn event_to_item(event: &EventRecord) -> StoreResult<Item> {
    let mut item: Item = serde_dynamo::to_item(event)?;
    let sets = [(GUESTS_FIELD, &event.guests), (ATTENDEES_FIELD, &event.attendees)];
    for (field, members) in sets {
        item.remove(field);
        if !members.is_empty() {
            item.insert(
                field.to_string(),
                AttributeValue::Ss(members.iter().cloned().collect()),
            );
        }
    }
    Ok(item)
}

fn event_from_item(mut item: Item) -> StoreResult<EventRecord> {
    let guests = take_string_set(&mut item, GUESTS_FIELD)?;
    let attendees = take_string_set(&mut item, ATTENDEES_FIELD)?;
    let mut event: EventRecord = serde_dynamo::from_item(item)?;
    event.guests = guests;
    event.attendees = attendees;
    Ok(event)
}

// Accepts string sets and, for documents written by older clients, lists of strings.
fn take_string_set(item: &mut Item, field: &str) -> StoreResult<BTreeSet<String>> {
    match item.remove(field) {
        None | Some(AttributeValue::Null(_)) => Ok(BTreeSet::new()),
        Some(AttributeValue::Ss(values)) => Ok(values.into_iter().collect()),
        Some(AttributeValue::L(values)) => values
            .into_iter()
            .map(|value| match value {
                AttributeValue::S(v) => Ok(v),
                other => Err(StoreError::Serialization(format!(
                    "{} contains a non-string member: {:?}",
                    field, other
                ))),
            })
            .collect(),
        Some(other) => Err(StoreError::Serialization(format!(
            "{} is not a string set: {:?}",
            field, other
        ))),
    }
}

/// Builds `ADD ... DELETE ...` for a membership change. Returns None when
/// there is nothing to apply.
fn membership_update_expression(
    change: &MembershipChange,
) -> Option<(String, HashMap<String, String>, Item)> {
    let mut add_clauses = Vec::new();
    let mut delete_clauses = Vec::new();
    let mut names = HashMap::new();
    let mut values = HashMap::new();

    let ops = [
        (GUESTS_FIELD, &change.add_guests, true),
        (ATTENDEES_FIELD, &change.add_attendees, true),
        (GUESTS_FIELD, &change.remove_guests, false),
        (ATTENDEES_FIELD, &change.remove_attendees, false),
    ];

    for (field, users, is_add) in ops {
        if users.is_empty() {
            continue;
        }
        let name = format!("#{}", field);
        let value = if is_add {
            format!(":add_{}", field)
        } else {
            format!(":del_{}", field)
        };
        names.insert(name.clone(), field.to_string());
        values.insert(value.clone(), AttributeValue::Ss(users.clone()));
        if is_add {
            add_clauses.push(format!("{} {}", name, value));
        } else {
            delete_clauses.push(format!("{} {}", name, value));
        }
    }

    let mut parts = Vec::new();
    if !add_clauses.is_empty() {
        parts.push(format!("ADD {}", add_clauses.join(", ")));
    }
    if !delete_clauses.is_empty() {
        parts.push(format!("DELETE {}", delete_clauses.join(", ")));
    }

    if parts.is_empty() {
        None
    } else {
        Some((parts.join(" "), names, values))
    }
}

#[async_trait]
impl EventStore for DynamoStore {
    async fn create_event(&self, event: EventRecord) -> StoreResult<EventRecord> {
        let item = event_to_item(&event)?;
        self.client
            .put_item()
            .table_name(&self.config.events_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| dynamo_error("put_item", e))?;

        debug!("Created event id={}", event.id);
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> StoreResult<EventRecord> {
        let output = self
            .client
            .get_item()
            .table_name(&self.config.events_table)
            .key("id", s(id))
            .send()
            .await
            .map_err(|e| dynamo_error("get_item", e))?;

        match output.item {
            Some(item) => event_from_item(item),
            None => Err(StoreError::NotFound(format!("Event {} not found", id))),
        }
    }

    async fn set_event_field(
        &self,
        id: &str,
        path: &str,
        value: serde_json::Value,
    ) -> StoreResult<()> {
        let segments = parse_field_path(path)?;
        let value: AttributeValue = serde_dynamo::to_attribute_value(value)?;

        let mut request = self
            .client
            .update_item()
            .table_name(&self.config.events_table)
            .key("id", s(id))
            .condition_expression("attribute_exists(id)")
            .expression_attribute_values(":value", value);

        let mut placeholders = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            let placeholder = format!("#p{}", i);
            request = request.expression_attribute_names(placeholder.clone(), *segment);
            placeholders.push(placeholder);
        }

        request
            .update_expression(format!("SET {} = :value", placeholders.join(".")))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map_or(false, |se| se.is_conditional_check_failed_exception())
                {
                    StoreError::NotFound(format!("Event {} not found", id))
                } else {
                    dynamo_error("update_item", e)
                }
            })?;

        debug!("Set field {} on event id={}", path, id);
        Ok(())
    }

    async fn update_membership(
        &self,
        id: &str,
        change: &MembershipChange,
    ) -> StoreResult<EventRecord> {
        let Some((expression, names, values)) = membership_update_expression(change) else {
            return self.get_event(id).await;
        };

        let output = self
            .client
            .update_item()
            .table_name(&self.config.events_table)
            .key("id", s(id))
            .update_expression(expression)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .condition_expression("attribute_exists(id)")
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map_or(false, |se| se.is_conditional_check_failed_exception())
                {
                    StoreError::NotFound(format!("Event {} not found", id))
                } else {
                    dynamo_error("update_item", e)
                }
            })?;

        match output.attributes {
            Some(item) => event_from_item(item),
            None => self.get_event(id).await,
        }
    }

    async fn delete_event(&self, id: &str) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.config.events_table)
            .key("id", s(id))
            .condition_expression("attribute_exists(id)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map_or(false, |se| se.is_conditional_check_failed_exception())
                {
                    StoreError::NotFound(format!("Event {} not found", id))
                } else {
                    dynamo_error("delete_item", e)
                }
            })?;

        debug!("Deleted event id={}", id);
        Ok(())
    }
}

#[async_trait]
impl RatingStore for DynamoStore {
    async fn put_rating(&self, rating: Rating) -> StoreResult<Rating> {
        let item: Item = serde_dynamo::to_item(&rating)?;
        self.client
            .put_item()
            .table_name(&self.config.ratings_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| dynamo_error("put_item", e))?;
        Ok(rating)
    }

    async fn get_rating(&self, event_id: &str, user_id: &str) -> StoreResult<Option<Rating>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.config.ratings_table)
            .key("event_id", s(event_id))
            .key("user_id", s(user_id))
            .send()
            .await
            .map_err(|e| dynamo_error("get_item", e))?;

        match output.item {
            Some(item) => Ok(Some(serde_dynamo::from_item(item)?)),
            None => Ok(None),
        }
    }

    async fn get_ratings_for_event(&self, event_id: &str) -> StoreResult<Vec<Rating>> {
        let mut ratings = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.config.ratings_table)
                .key_condition_expression("event_id = :event_id")
                .expression_attribute_values(":event_id", s(event_id))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| dynamo_error("query", e))?;

            for item in output.items.unwrap_or_default() {
                let rating: Rating = serde_dynamo::from_item(item)?;
                ratings.push(rating);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(ratings)
    }

    async fn delete_ratings_for_event(&self, event_id: &str) -> StoreResult<usize> {
        let ratings = self.get_ratings_for_event(event_id).await?;

        for rating in &ratings {
            self.client
                .delete_item()
                .table_name(&self.config.ratings_table)
                .key("event_id", s(&rating.event_id))
                .key("user_id", s(&rating.user_id))
                .send()
                .await
                .map_err(|e| dynamo_error("delete_item", e))?;
        }

        debug!("Deleted {} ratings for event id={}", ratings.len(), event_id);
        Ok(ratings.len())
    }
}

#[async_trait]
impl UserStore for DynamoStore {
    async fn put_user(&self, user: User) -> StoreResult<User> {
        let item: Item = serde_dynamo::to_item(&user)?;
        self.client
            .put_item()
            .table_name(&self.config.users_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| dynamo_error("put_item", e))?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StoreResult<User> {
        let output = self
            .client
            .get_item()
            .table_name(&self.config.users_table)
            .key("id", s(id))
            .send()
            .await
            .map_err(|e| dynamo_error("get_item", e))?;

        match output.item {
            Some(item) => Ok(serde_dynamo::from_item(item)?),
            None => Err(StoreError::NotFound(format!("User {} not found", id))),
        }
    }

    async fn get_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_user(id).await {
                Ok(user) => users.push(user),
                Err(StoreError::NotFound(_)) => debug!("Skipping unknown user id={}", id),
                Err(e) => return Err(e),
            }
        }
        Ok(users)
    }
}
