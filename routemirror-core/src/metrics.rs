//! Metrics - Route count publication
//!
//! Counts propagated VPN routes per route table and hands the count to a
//! metrics sink. Runs separately from reconciliation and never touches the
//! mirror.

use async_trait::async_trait;
use thiserror::Error;

use crate::route::RouteFilter;
use crate::source::{LiveRouteSource, SourceError, fetch_all_routes};

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("AWS error: {0}")]
    Aws(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Record a count for one route table
    async fn put_count(
        &self,
        namespace: &str,
        metric_name: &str,
        route_table_id: &str,
        value: usize,
    ) -> MetricsResult<()>;
}

/// Which metric a route table's count is published under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountTarget {
    pub route_table_id: String,
    pub metric_name: String,
}

impl CountTarget {
    pub fn new(route_table_id: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            route_table_id: route_table_id.into(),
            metric_name: metric_name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CountError {
    #[error("Failed to count routes: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to publish count: {0}")]
    Metrics(#[from] MetricsError),
}

/// Count propagated VPN routes in one route table and publish the count
pub async fn publish_route_count(
    source: &dyn LiveRouteSource,
    sink: &dyn MetricsSink,
    namespace: &str,
    target: &CountTarget,
) -> Result<usize, CountError> {
    let routes = fetch_all_routes(
        source,
        &target.route_table_id,
        &RouteFilter::vpn_propagated(),
    )
    .await?;
    let count = routes.len();
    log::info!(
        "{} propagated VPN routes in {}",
        count,
        target.route_table_id
    );

    sink.put_count(namespace, &target.metric_name, &target.route_table_id, count)
        .await?;
    log::info!(
        "Published {} = {} in namespace {}",
        target.metric_name,
        count,
        namespace
    );
    Ok(count)
}

/// Publish counts for every target; one failure does not stop the others
pub async fn publish_route_counts(
    source: &dyn LiveRouteSource,
    sink: &dyn MetricsSink,
    namespace: &str,
    targets: &[CountTarget],
) -> Vec<(CountTarget, Result<usize, CountError>)> {
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let result = publish_route_count(source, sink, namespace, target).await;
        if let Err(e) = &result {
            log::error!("Route count for {} failed: {}", target.route_table_id, e);
        }
        results.push((target.clone(), result));
    }
    results
}
