//! Stream - Notices for rows inserted into the mirror
//!
//! Consumes a DynamoDB Streams event document. Only `INSERT` records that
//! carry a `dynamodb` payload produce a notice; `MODIFY` and `REMOVE` are
//! ignored.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::notifier::{Notifier, inserted_route_notice};
use crate::route::{ItemKey, PersistedRoute, RouteKey, attr};

pub const INSERT_EVENT: &str = "INSERT";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid stream event: {0}")]
    InvalidEvent(String),

    #[error("Stream record is missing key attribute {0}")]
    MissingKey(&'static str),
}

pub type StreamResult<T> = Result<T, StreamError>;

/// DynamoDB attribute value in its JSON wire form
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    SS(Vec<String>),
    NS(Vec<String>),
    BS(Vec<String>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }
}

pub type Image = HashMap<String, AttributeValue>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

impl StreamEvent {
    pub fn from_json(json: &str) -> StreamResult<Self> {
        serde_json::from_str(json).map_err(|e| StreamError::InvalidEvent(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub dynamodb: Option<StreamPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamPayload {
    #[serde(rename = "Keys", default)]
    pub keys: Image,
    #[serde(rename = "NewImage", default)]
    pub new_image: Image,
}

impl StreamRecord {
    /// The inserted row, or `None` for anything other than an INSERT with a
    /// payload
    pub fn inserted_route(&self) -> StreamResult<Option<PersistedRoute>> {
        if self.event_name.as_deref() != Some(INSERT_EVENT) {
            return Ok(None);
        }
        let Some(payload) = &self.dynamodb else {
            return Ok(None);
        };

        let hash_key = string_attr(&payload.keys, attr::HASH_KEY)
            .ok_or(StreamError::MissingKey(attr::HASH_KEY))?;
        let sort_key = string_attr(&payload.keys, attr::SORT_KEY)
            .ok_or(StreamError::MissingKey(attr::SORT_KEY))?;
        let key = ItemKey::new(hash_key, sort_key);

        let image = &payload.new_image;
        let mut route = PersistedRoute::from_key(key);
        route.destination_cidr = string_attr(image, attr::DESTINATION_CIDR_BLOCK);
        route.resource_id = string_attr(image, attr::RESOURCE_ID);
        route.attachment_id = string_attr(image, attr::ATTACHMENT_ID);
        route.resource_type = string_attr(image, attr::RESOURCE_TYPE);
        route.route_type = string_attr(image, attr::ROUTE_TYPE);
        route.state = string_attr(image, attr::STATE);

        // Rows written without attributes still carry identity in the sort key
        if let Ok(parsed) = RouteKey::parse(route.key.hash_key.clone(), &route.key.sort_key) {
            route.destination_cidr.get_or_insert(parsed.destination_cidr);
            route.resource_id.get_or_insert(parsed.resource_id);
            route.attachment_id.get_or_insert(parsed.attachment_id);
            route.resource_type.get_or_insert(parsed.resource_type);
        }

        Ok(Some(route))
    }
}

fn string_attr(image: &Image, name: &str) -> Option<String> {
    image.get(name).and_then(AttributeValue::as_s).map(String::from)
}

/// Counts from handling one stream event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamReport {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Publish one notice per inserted row. Failures are logged and counted;
/// they never stop the remaining records.
pub async fn publish_inserted_routes(
    event: &StreamEvent,
    notifier: &dyn Notifier,
) -> StreamReport {
    let mut report = StreamReport::default();

    for record in &event.records {
        let route = match record.inserted_route() {
            Ok(Some(route)) => route,
            Ok(None) => {
                log::info!(
                    "Skipping stream record with event {:?}",
                    record.event_name.as_deref().unwrap_or("<none>")
                );
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                log::warn!("Unreadable stream record: {}", e);
                report.failed += 1;
                continue;
            }
        };

        let notification = inserted_route_notice(&route);
        match notifier.publish(&notification).await {
            Ok(()) => {
                log::info!("Published notice for new route {}", route.key);
                report.published += 1;
            }
            Err(e) => {
                log::warn!("Failed to publish notice for {}: {}", route.key, e);
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNotifier;

    const INSERT: &str = r#"{
        "Records": [{
            "eventName": "INSERT",
            "dynamodb": {
                "Keys": {
                    "HashKey": {"S": "tgw-rtb-0prod"},
                    "SortKey": {"S": "10.0.2.0/24#vpc-abc#tgw-attach-xyz#vpc"}
                },
                "NewImage": {
                    "HashKey": {"S": "tgw-rtb-0prod"},
                    "SortKey": {"S": "10.0.2.0/24#vpc-abc#tgw-attach-xyz#vpc"},
                    "DestinationCidrBlock": {"S": "10.0.2.0/24"},
                    "TransitGatewayAttachmentId": {"S": "tgw-attach-xyz"},
                    "ResourceType": {"S": "vpc"},
                    "RouteType": {"S": "propagated"},
                    "State": {"S": "active"}
                }
            }
        }]
    }"#;

    #[test]
    fn insert_record_yields_route() {
        let event = StreamEvent::from_json(INSERT).unwrap();
        let route = event.records[0].inserted_route().unwrap().unwrap();

        assert_eq!(route.route_table_id(), "tgw-rtb-0prod");
        assert_eq!(route.state.as_deref(), Some("active"));
        // Not in the image; recovered from the sort key
        assert_eq!(route.resource_id.as_deref(), Some("vpc-abc"));
    }

    #[test]
    fn modify_and_remove_are_ignored() {
        let event = StreamEvent::from_json(
            r#"{"Records": [
                {"eventName": "MODIFY", "dynamodb": {"Keys": {}}},
                {"eventName": "REMOVE", "dynamodb": {"Keys": {}}},
                {"eventName": "INSERT"}
            ]}"#,
        )
        .unwrap();

        for record in &event.records {
            assert!(record.inserted_route().unwrap().is_none());
        }
    }

    #[test]
    fn insert_without_keys_is_an_error() {
        let event = StreamEvent::from_json(
            r#"{"Records": [
                {"eventName": "INSERT", "dynamodb": {"Keys": {"HashKey": {"S": "rtb"}}}}
            ]}"#,
        )
        .unwrap();

        let err = event.records[0].inserted_route().unwrap_err();
        assert!(matches!(err, StreamError::MissingKey("SortKey")));
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(matches!(
            StreamEvent::from_json("[1, 2]"),
            Err(StreamError::InvalidEvent(_))
        ));
    }

    #[tokio::test]
    async fn publishes_one_notice_per_insert() {
        let event = StreamEvent::from_json(INSERT).unwrap();
        let mut doubled = event.clone();
        doubled.records.extend(event.records.clone());
        doubled.records.extend(
            StreamEvent::from_json(r#"{"Records": [{"eventName": "REMOVE"}]}"#)
                .unwrap()
                .records,
        );

        let notifier = RecordingNotifier::new();
        let report = publish_inserted_routes(&doubled, &notifier).await;

        assert_eq!(
            report,
            StreamReport {
                published: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(notifier.sent().len(), 2);
        assert!(notifier.sent()[0].subject.contains("tgw-rtb-0prod"));
    }

    #[tokio::test]
    async fn delivery_failure_is_counted() {
        let event = StreamEvent::from_json(INSERT).unwrap();
        let notifier = RecordingNotifier::failing();

        let report = publish_inserted_routes(&event, &notifier).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.published, 0);
    }
}
