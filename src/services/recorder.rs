use crate::models::TipRecord;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Receives confirmed tips. Delivery is best effort; the engine only logs
/// failures.
#[async_trait]
pub trait TipRecorder: Send + Sync {
    async fn record(&self, record: &TipRecord) -> Result<()>;
}

pub struct HttpTipRecorder {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTipRecorder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl TipRecorder for HttpTipRecorder {
    async fn record(&self, record: &TipRecord) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();

        let response = self
            .client
            .post(format!("{}/api/tip", self.base_url))
            .header("x-transaction-hash", format!("{:?}", record.transaction_hash))
            .header("x-request-id", &request_id)
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Recorder rejected tip {}: {}", record.tip_id, response.status());
        }

        tracing::debug!(request_id = %request_id, "Tip {} recorded", record.tip_id);
        Ok(())
    }
}
