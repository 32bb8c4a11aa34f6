//! Route Mirror AWS Provider
//!
//! AWS implementations of the collaborator traits: the EC2 transit gateway
//! route search as the live source, SNS as the notifier, and CloudWatch as
//! the metrics sink.

pub mod metrics;
pub mod notifier;
pub mod source;

use aws_config::{Region, SdkConfig};

pub use metrics::CloudWatchMetrics;
pub use notifier::SnsNotifier;
pub use source::Ec2RouteSource;

/// Load the shared SDK configuration. Without an explicit region the
/// standard provider chain (`AWS_REGION`, profile, IMDS) decides.
pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

/// AWS clients built from one SDK configuration
pub struct AwsClients {
    pub ec2: aws_sdk_ec2::Client,
    pub sns: aws_sdk_sns::Client,
    pub cloudwatch: aws_sdk_cloudwatch::Client,
}

impl AwsClients {
    pub async fn new(region: Option<&str>) -> Self {
        let config = load_sdk_config(region).await;
        Self::from_config(&config)
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            sns: aws_sdk_sns::Client::new(config),
            cloudwatch: aws_sdk_cloudwatch::Client::new(config),
        }
    }

    pub fn route_source(&self) -> Ec2RouteSource {
        Ec2RouteSource::new(self.ec2.clone())
    }

    pub fn notifier(&self, topic_arn: impl Into<String>) -> SnsNotifier {
        SnsNotifier::new(self.sns.clone(), topic_arn)
    }

    pub fn metrics(&self) -> CloudWatchMetrics {
        CloudWatchMetrics::new(self.cloudwatch.clone())
    }
}
