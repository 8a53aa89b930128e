//! NATS subscriptions for incoming batches and summary requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

use crate::config::NatsConfig;

/// Subscribes to the subjects the service answers on
pub struct RequestConsumer {
    client: Client,
    batch_subject: String,
    summary_subject: String,
}

impl RequestConsumer {
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            batch_subject: config.batch_subject.clone(),
            summary_subject: config.summary_subject.clone(),
        }
    }

    /// Subscribe to transaction batches (JSON arrays of transactions)
    pub async fn subscribe_batches(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.batch_subject.clone()).await?;
        info!(subject = %self.batch_subject, "Subscribed to batch subject");
        Ok(subscriber)
    }

    /// Subscribe to summary requests (one case per message, request/reply)
    pub async fn subscribe_summaries(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.summary_subject.clone()).await?;
        info!(subject = %self.summary_subject, "Subscribed to summary subject");
        Ok(subscriber)
    }

    pub fn batch_subject(&self) -> &str {
        &self.batch_subject
    }

    pub fn summary_subject(&self) -> &str {
        &self.summary_subject
    }
}
