//! SNS notifier

use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;

use routemirror_core::notifier::{Notification, Notifier, NotifyError, NotifyResult};

/// SNS rejects longer subjects
pub const MAX_SUBJECT_CHARS: usize = 100;

/// Publishes notifications to one SNS topic
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, notification: &Notification) -> NotifyResult<()> {
        let output = self
            .client
            .publish()
            .target_arn(&self.topic_arn)
            .subject(clip_subject(&notification.subject))
            .message(&notification.body)
            .send()
            .await
            .map_err(|e| {
                NotifyError::Aws(format!("Failed to publish to {}: {:?}", self.topic_arn, e))
            })?;

        log::debug!(
            "Published message {} to {}",
            output.message_id().unwrap_or("<unknown>"),
            self.topic_arn
        );
        Ok(())
    }
}

/// Subjects are single-line and at most [`MAX_SUBJECT_CHARS`] characters
fn clip_subject(subject: &str) -> String {
    subject
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(MAX_SUBJECT_CHARS)
        .collect()
}
