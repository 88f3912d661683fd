use crate::{
    client::{
        authorization::{PaymentRequired, PAYMENT_HEADER},
        signer::PaymentAuthorizer,
    },
    error::PaymentError,
    models::PaymentRequest,
};
use async_trait::async_trait;
use ethers::types::{Address, H256};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Gasless submission through a third-party relay.
#[async_trait]
pub trait PaymentRelay: Send + Sync {
    async fn submit(&self, transfer: &RelayTransfer) -> Result<H256, PaymentError>;
}

/// Request body of the relay's transfer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTransfer {
    pub to: Address,
    pub token: Address,
    /// Base units as a decimal string.
    pub amount: String,
    pub chain_id: u64,
}

impl From<&PaymentRequest> for RelayTransfer {
    fn from(request: &PaymentRequest) -> Self {
        Self {
            to: request.recipient(),
            token: request.token(),
            amount: request.base_units().to_string(),
            chain_id: request.chain_id(),
        }
    }
}

/// Only `transactionHash` is accepted; any other shape is a contract violation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    transaction_hash: H256,
}

pub struct HttpRelayClient {
    base_url: String,
    client: reqwest::Client,
    authorizer: Arc<dyn PaymentAuthorizer>,
}

impl HttpRelayClient {
    pub fn new(
        base_url: impl Into<String>,
        authorizer: Arc<dyn PaymentAuthorizer>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("Relay HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            authorizer,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/transfer", self.base_url)
    }

    async fn post(
        &self,
        transfer: &RelayTransfer,
        payment: Option<&str>,
    ) -> Result<reqwest::Response, PaymentError> {
        let mut request = self.client.post(self.endpoint()).json(transfer);
        if let Some(payment) = payment {
            request = request.header(PAYMENT_HEADER, payment);
        }
        Ok(request.send().await?)
    }

    /// Builds the payment header answering a 402 response.
    async fn answer_challenge(&self, response: reqwest::Response) -> Result<String, PaymentError> {
        let challenge: PaymentRequired = response.json().await.map_err(|e| {
            PaymentError::RelayUnavailable(format!("Unreadable payment challenge: {}", e))
        })?;

        let requirement = challenge.exact_requirement().ok_or_else(|| {
            PaymentError::RelayUnavailable("No supported payment scheme offered".to_string())
        })?;

        tracing::info!(
            "Relay requires payment of {} units on {} ({})",
            requirement.max_amount_required,
            requirement.network,
            challenge.error.as_deref().unwrap_or("no reason given")
        );

        self.authorizer.authorize(requirement).await.map_err(|e| match e {
            PaymentError::RelayRejected(_) | PaymentError::RelayUnavailable(_) => e,
            other => PaymentError::RelayRejected(other.to_string()),
        })
    }

    async fn read_hash(response: reqwest::Response) -> Result<H256, PaymentError> {
        let body: RelayResponse = response.json().await.map_err(|e| {
            tracing::warn!("Relay response did not match schema: {}", e);
            PaymentError::NoHashReturned
        })?;
        Ok(body.transaction_hash)
    }
}

fn unavailable(status: StatusCode) -> PaymentError {
    PaymentError::RelayUnavailable(format!("relay responded {}", status))
}

#[async_trait]
impl PaymentRelay for HttpRelayClient {
    async fn submit(&self, transfer: &RelayTransfer) -> Result<H256, PaymentError> {
        tracing::info!(
            "Submitting {} units of {:?} to {:?} via relay {}",
            transfer.amount,
            transfer.token,
            transfer.to,
            self.base_url
        );

        let response = self.post(transfer, None).await?;

        let response = match response.status() {
            StatusCode::PAYMENT_REQUIRED => {
                let payment = self.answer_challenge(response).await?;
                let retried = self.post(transfer, Some(&payment)).await?;
                if retried.status() == StatusCode::PAYMENT_REQUIRED {
                    let reason = retried
                        .json::<PaymentRequired>()
                        .await
                        .ok()
                        .and_then(|c| c.error)
                        .unwrap_or_else(|| "payment authorization refused".to_string());
                    return Err(PaymentError::RelayRejected(reason));
                }
                retried
            }
            _ => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(status));
        }

        let hash = Self::read_hash(response).await?;
        tracing::info!("Relay accepted transfer: {:?}", hash);
        Ok(hash)
    }
}
