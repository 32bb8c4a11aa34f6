//! Notifier - Human-readable notices about newly propagated routes

use std::fmt::Write as _;

use async_trait::async_trait;
use thiserror::Error;

use crate::route::{CanonicalRoute, PersistedRoute};

const RULE: &str = "------------------------------------------------------------";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("AWS error: {0}")]
    Aws(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Delivery channel. The destination is fixed when the notifier is built.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> NotifyResult<()>;
}

/// Digest of every route added to one route table in a run
pub fn new_routes_digest(
    environment: &str,
    route_table_id: &str,
    routes: &[CanonicalRoute],
) -> Notification {
    let subject = format!(
        "New VPC routes propagated to {} route table {}",
        environment, route_table_id
    );

    let mut body = format!(
        "{} new VPC route(s) have been propagated to the {} route table {}.\n\nDetails:\n{}\n",
        routes.len(),
        environment,
        route_table_id,
        RULE
    );
    for route in routes {
        push_detail(&mut body, "DestinationCidrBlock", &route.destination_cidr);
        push_detail(&mut body, "ResourceId", &route.resource_id);
        push_detail(&mut body, "TransitGatewayAttachmentId", &route.attachment_id);
        push_detail(&mut body, "ResourceType", &route.resource_type);
        push_detail(&mut body, "RouteType", &route.route_type);
        push_detail(&mut body, "State", &route.state);
        body.push_str(RULE);
        body.push('\n');
    }

    Notification { subject, body }
}

/// Notice for a single row inserted into the mirror
pub fn inserted_route_notice(route: &PersistedRoute) -> Notification {
    let route_table_id = route.route_table_id();
    let subject = format!("A new VPC route propagated to route table {}", route_table_id);

    let mut body = format!(
        "A new VPC route has been propagated to route table {}.\n\nDetails:\n{}\n",
        route_table_id, RULE
    );
    let missing = "-".to_string();
    push_detail(&mut body, "RouteTableId", route_table_id);
    push_detail(
        &mut body,
        "DestinationCidrBlock",
        route.destination_cidr.as_ref().unwrap_or(&missing),
    );
    push_detail(
        &mut body,
        "ResourceId",
        route.resource_id.as_ref().unwrap_or(&missing),
    );
    push_detail(
        &mut body,
        "TransitGatewayAttachmentId",
        route.attachment_id.as_ref().unwrap_or(&missing),
    );
    push_detail(
        &mut body,
        "ResourceType",
        route.resource_type.as_ref().unwrap_or(&missing),
    );
    push_detail(
        &mut body,
        "RouteType",
        route.route_type.as_ref().unwrap_or(&missing),
    );
    push_detail(&mut body, "State", route.state.as_ref().unwrap_or(&missing));
    body.push_str(RULE);
    body.push('\n');

    Notification { subject, body }
}

fn push_detail(body: &mut String, label: &str, value: &str) {
    let _ = writeln!(body, "{:<28}: {}", label, value);
}
