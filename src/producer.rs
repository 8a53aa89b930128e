//! NATS publisher for detected cases and request replies

use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::{debug, error};

use crate::types::case::Case;

/// Publishes cases to the case subject and answers requests
#[derive(Clone)]
pub struct CaseProducer {
    client: Client,
    subject: String,
}

impl CaseProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a single case
    pub async fn publish(&self, case: &Case) -> Result<()> {
        let payload = serde_json::to_vec(case)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            case_id = %case.case_id,
            customer_id = %case.customer_id,
            transactions = case.transactions.len(),
            risk_score = case.risk_score,
            "Published case"
        );

        Ok(())
    }

    /// Publish cases one message each; returns how many went out
    pub async fn publish_batch(&self, cases: &[Case]) -> usize {
        let mut published = 0;
        for case in cases {
            match self.publish(case).await {
                Ok(()) => published += 1,
                Err(e) => error!(case_id = %case.case_id, error = %e, "Failed to publish case"),
            }
        }
        published
    }

    /// Send a JSON reply to a request's reply subject
    pub async fn reply<T: Serialize + ?Sized>(&self, reply: Subject, body: &T) -> Result<()> {
        let payload = serde_json::to_vec(body)?;
        self.client.publish(reply, payload.into()).await?;
        Ok(())
    }

    /// Send `{"error": message}` to a request's reply subject
    pub async fn reply_error(&self, reply: Subject, message: &str) -> Result<()> {
        self.reply(reply, &serde_json::json!({ "error": message })).await
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
