//! Pub/sub service: publishes messages to a named subject.
//!
//! Provider: AWS (SNS).  The topic ARN comes from the config file; the
//! subject is carried as the SNS message subject line.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info};

use super::{aws_auth, Service, PROVIDER_AWS};
use crate::config::BootstrapEnv;

/// Async publish contract.
pub trait PubSubService: Service {
    /// Publish `message` under `subject`, returning the backend's
    /// message id.
    fn publish(
        &self,
        subject: &str,
        message: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}

// -- AWS / SNS ----------------------------------------------------------------

/// SNS-backed pub/sub handle.
pub struct SnsPubSub {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsPubSub {
    pub async fn new(env: &BootstrapEnv) -> anyhow::Result<Self> {
        let config = aws_auth::sdk_config(&env.env).await?;
        let client = aws_sdk_sns::Client::new(&config);
        let topic_arn = env.config.services.pubsub.topic_arn.clone();

        info!("SNS pub/sub handle initialized: topic={topic_arn}");

        Ok(Self { client, topic_arn })
    }
}

impl Service for SnsPubSub {
    fn provider(&self) -> &'static str {
        PROVIDER_AWS
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            if self.topic_arn.is_empty() {
                // No topic configured yet; verify the credentials work.
                return self.client.list_topics().send().await.is_ok();
            }
            self.client
                .get_topic_attributes()
                .topic_arn(&self.topic_arn)
                .send()
                .await
                .is_ok()
        })
    }
}

impl PubSubService for SnsPubSub {
    fn publish(
        &self,
        subject: &str,
        message: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let subject = subject.to_string();
        let message = message.to_string();
        Box::pin(async move {
            if self.topic_arn.is_empty() {
                anyhow::bail!("No SNS topic ARN configured");
            }

            debug!("SNS publish: topic={} subject={}", self.topic_arn, subject);

            let resp = self
                .client
                .publish()
                .topic_arn(&self.topic_arn)
                .subject(&subject)
                .message(&message)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("SNS publish: {e}"))?;

            resp.message_id()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("SNS publish returned no message id"))
        })
    }
}
