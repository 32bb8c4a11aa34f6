//! CloudWatch metrics sink

use std::time::SystemTime;

use async_trait::async_trait;
use aws_sdk_cloudwatch::Client as CloudWatchClient;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};

use routemirror_core::metrics::{MetricsError, MetricsResult, MetricsSink};

/// Dimension carrying the route table id
pub const ROUTE_TABLE_DIMENSION: &str = "tgw_route_table_id";

pub struct CloudWatchMetrics {
    client: CloudWatchClient,
}

impl CloudWatchMetrics {
    pub fn new(client: CloudWatchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetricsSink for CloudWatchMetrics {
    async fn put_count(
        &self,
        namespace: &str,
        metric_name: &str,
        route_table_id: &str,
        value: usize,
    ) -> MetricsResult<()> {
        let datum = count_datum(
            metric_name,
            route_table_id,
            value,
            DateTime::from(SystemTime::now()),
        );

        self.client
            .put_metric_data()
            .namespace(namespace)
            .metric_data(datum)
            .send()
            .await
            .map_err(|e| {
                MetricsError::Aws(format!(
                    "Failed to put {} in {}: {:?}",
                    metric_name, namespace, e
                ))
            })?;
        Ok(())
    }
}

fn count_datum(
    metric_name: &str,
    route_table_id: &str,
    value: usize,
    timestamp: DateTime,
) -> MetricDatum {
    MetricDatum::builder()
        .metric_name(metric_name)
        .dimensions(
            Dimension::builder()
                .name(ROUTE_TABLE_DIMENSION)
                .value(route_table_id)
                .build(),
        )
        .timestamp(timestamp)
        .value(value as f64)
        .unit(StandardUnit::Count)
        .build()
}
