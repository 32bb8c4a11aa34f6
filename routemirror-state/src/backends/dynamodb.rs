//! DynamoDB backend for the mirror

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, PutRequest, WriteRequest};

use routemirror_core::effect::Effect;
use routemirror_core::route::{ItemKey, PersistedRoute, attr};
use routemirror_core::store::{DEFAULT_MAX_BATCH_SIZE, MirrorStore, StoreError, StoreResult};

use crate::backend::BackendConfig;

type Item = HashMap<String, AttributeValue>;

/// DynamoDB-backed mirror store
pub struct DynamoDbStore {
    client: Client,
    /// Table name
    table: String,
    /// Whether partition queries use strongly consistent reads (default: true)
    consistent_read: bool,
}

impl DynamoDbStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            consistent_read: true,
        }
    }

    /// Create a new DynamoDbStore from configuration
    pub async fn from_config(config: &BackendConfig) -> StoreResult<Self> {
        let table = config
            .get_string("table")
            .ok_or_else(|| StoreError::configuration("Missing required attribute: table"))?
            .to_string();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config.get_string("region") {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let aws_config = loader.load().await;

        let mut store = Self::new(Client::new(&aws_config), table);
        store.consistent_read = config.get_bool_or("consistent_read", true);
        Ok(store)
    }
}

#[async_trait]
impl MirrorStore for DynamoDbStore {
    fn name(&self) -> &'static str {
        "dynamodb"
    }

    async fn query_partition(&self, hash_key: &str) -> StoreResult<Vec<PersistedRoute>> {
        let items: Vec<Item> = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#hk = :hk")
            .expression_attribute_names("#hk", attr::HASH_KEY)
            .expression_attribute_values(":hk", AttributeValue::S(hash_key.to_string()))
            .consistent_read(self.consistent_read)
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<_>, _>>()
            .await
            .map_err(|e| StoreError::Aws(format!("Failed to query {}: {:?}", self.table, e)))?;

        log::debug!(
            "Read {} items for {} from {}",
            items.len(),
            hash_key,
            self.table
        );
        items.iter().map(route_from_item).collect()
    }

    async fn put_item(&self, route: &PersistedRoute) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item_from_route(route)))
            .send()
            .await
            .map_err(|e| StoreError::Aws(format!("Failed to put {}: {:?}", route.key, e)))?;
        Ok(())
    }

    async fn delete_item(&self, key: &ItemKey) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .set_key(Some(key_attributes(key)))
            .send()
            .await
            .map_err(|e| StoreError::Aws(format!("Failed to delete {}: {:?}", key, e)))?;
        Ok(())
    }

    async fn batch_write(&self, effects: &[Effect]) -> StoreResult<Vec<Effect>> {
        if effects.is_empty() {
            return Ok(Vec::new());
        }

        let requests = effects
            .iter()
            .map(write_request)
            .collect::<StoreResult<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table, requests)
            .send()
            .await
            .map_err(|e| StoreError::Aws(format!("Failed to write batch: {:?}", e)))?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|items| items.get(&self.table))
            .map(|requests| {
                requests
                    .iter()
                    .map(effect_from_request)
                    .collect::<StoreResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(unprocessed)
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

fn key_attributes(key: &ItemKey) -> Item {
    HashMap::from([
        (
            attr::HASH_KEY.to_string(),
            AttributeValue::S(key.hash_key.clone()),
        ),
        (
            attr::SORT_KEY.to_string(),
            AttributeValue::S(key.sort_key.clone()),
        ),
    ])
}

/// Encode a row as a DynamoDB item; absent attributes are omitted
fn item_from_route(route: &PersistedRoute) -> Item {
    let mut item = key_attributes(&route.key);
    let optional = [
        (attr::DESTINATION_CIDR_BLOCK, &route.destination_cidr),
        (attr::RESOURCE_ID, &route.resource_id),
        (attr::ATTACHMENT_ID, &route.attachment_id),
        (attr::RESOURCE_TYPE, &route.resource_type),
        (attr::ROUTE_TYPE, &route.route_type),
        (attr::STATE, &route.state),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            item.insert(name.to_string(), AttributeValue::S(value.clone()));
        }
    }
    item
}

fn string_attr(item: &Item, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .map(String::from)
}

/// Decode a DynamoDB item; both key attributes must be strings
fn route_from_item(item: &Item) -> StoreResult<PersistedRoute> {
    let hash_key = string_attr(item, attr::HASH_KEY).ok_or_else(|| {
        StoreError::InvalidItem(format!("item without string {}", attr::HASH_KEY))
    })?;
    let sort_key = string_attr(item, attr::SORT_KEY).ok_or_else(|| {
        StoreError::InvalidItem(format!(
            "item in {} without string {}",
            hash_key,
            attr::SORT_KEY
        ))
    })?;

    let mut route = PersistedRoute::from_key(ItemKey::new(hash_key, sort_key));
    route.destination_cidr = string_attr(item, attr::DESTINATION_CIDR_BLOCK);
    route.resource_id = string_attr(item, attr::RESOURCE_ID);
    route.attachment_id = string_attr(item, attr::ATTACHMENT_ID);
    route.resource_type = string_attr(item, attr::RESOURCE_TYPE);
    route.route_type = string_attr(item, attr::ROUTE_TYPE);
    route.state = string_attr(item, attr::STATE);
    Ok(route)
}

fn write_request(effect: &Effect) -> StoreResult<WriteRequest> {
    let request = match effect {
        Effect::Put(route) => {
            let put = PutRequest::builder()
                .set_item(Some(item_from_route(route)))
                .build()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            WriteRequest::builder().put_request(put).build()
        }
        Effect::Delete(key) => {
            let delete = DeleteRequest::builder()
                .set_key(Some(key_attributes(key)))
                .build()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            WriteRequest::builder().delete_request(delete).build()
        }
    };
    Ok(request)
}

/// Map an unprocessed request back to the effect that produced it
fn effect_from_request(request: &WriteRequest) -> StoreResult<Effect> {
    if let Some(put) = request.put_request() {
        return route_from_item(put.item()).map(Effect::Put);
    }
    if let Some(delete) = request.delete_request() {
        let key = route_from_item(delete.key())?.key;
        return Ok(Effect::Delete(key));
    }
    Err(StoreError::InvalidItem(
        "unprocessed request with neither put nor delete".to_string(),
    ))
}
