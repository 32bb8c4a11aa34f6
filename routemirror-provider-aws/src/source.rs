//! EC2 transit gateway route search

use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::types::{Filter, TransitGatewayRoute, TransitGatewayRouteAttachment};

use routemirror_core::route::{Attachment, RawLiveRoute, RouteFilter};
use routemirror_core::source::{
    BoxFuture, Continuation, LiveRouteSource, RoutePage, SourceError, SourceResult,
};

/// Largest page SearchTransitGatewayRoutes returns
pub const MAX_RESULTS: i32 = 1000;

/// Live source backed by `SearchTransitGatewayRoutes`
pub struct Ec2RouteSource {
    client: Ec2Client,
}

impl Ec2RouteSource {
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }

    async fn search(&self, route_table_id: &str, filter: &RouteFilter) -> SourceResult<RoutePage> {
        let output = self
            .client
            .search_transit_gateway_routes()
            .transit_gateway_route_table_id(route_table_id)
            .filters(
                Filter::builder()
                    .name("resource-type")
                    .values(&filter.resource_type)
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name("type")
                    .values(&filter.route_type)
                    .build(),
            )
            .max_results(MAX_RESULTS)
            .send()
            .await
            .map_err(|e| {
                SourceError::Aws(format!(
                    "Failed to search routes in {}: {:?}",
                    route_table_id, e
                ))
            })?;

        log::debug!(
            "{} routes from {} (additional available: {:?})",
            output.routes().len(),
            route_table_id,
            output.additional_routes_available()
        );
        Ok(page_from_routes(
            output.routes(),
            output.additional_routes_available(),
        ))
    }
}

impl LiveRouteSource for Ec2RouteSource {
    fn name(&self) -> &'static str {
        "ec2"
    }

    // The API has no continuation token, so there is never a second page
    fn search_routes<'a>(
        &'a self,
        route_table_id: &'a str,
        filter: &'a RouteFilter,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, SourceResult<RoutePage>> {
        Box::pin(async move {
            if let Some(token) = page_token {
                return Err(SourceError::Aws(format!(
                    "Unexpected page token {} for {}",
                    token, route_table_id
                )));
            }
            self.search(route_table_id, filter).await
        })
    }
}

/// Build a page. More routes than fit in one response cannot be fetched, so
/// that case is reported as truncated.
fn page_from_routes(routes: &[TransitGatewayRoute], additional: Option<bool>) -> RoutePage {
    let routes = routes.iter().filter_map(raw_route).collect();
    let continuation = if additional == Some(true) {
        Continuation::Truncated
    } else {
        Continuation::Complete
    };
    RoutePage {
        routes,
        continuation,
    }
}

fn raw_route(route: &TransitGatewayRoute) -> Option<RawLiveRoute> {
    let Some(destination) = route
        .destination_cidr_block()
        .or_else(|| route.prefix_list_id())
    else {
        log::warn!("Skipping route without a destination: {:?}", route);
        return None;
    };

    let mut raw = RawLiveRoute::new(
        destination,
        route.r#type().map(|t| t.as_str()).unwrap_or_default(),
        route.state().map(|s| s.as_str()).unwrap_or_default(),
    );
    raw.attachments = route
        .transit_gateway_attachments()
        .iter()
        .filter_map(|attachment| route_attachment(destination, attachment))
        .collect();
    Some(raw)
}

fn route_attachment(
    destination: &str,
    attachment: &TransitGatewayRouteAttachment,
) -> Option<Attachment> {
    match (
        attachment.resource_id(),
        attachment.transit_gateway_attachment_id(),
    ) {
        (Some(resource_id), Some(attachment_id)) => Some(Attachment::new(
            resource_id,
            attachment_id,
            attachment
                .resource_type()
                .map(|t| t.as_str())
                .unwrap_or_default(),
        )),
        _ => {
            log::warn!("Skipping incomplete attachment on {}", destination);
            None
        }
    }
}
