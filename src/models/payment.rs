use crate::{
    error::PaymentError,
    models::{amount::to_base_units, Receipt},
};
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A validated transfer of `amount` tokens to `recipient`.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    recipient: Address,
    amount: f64,
    base_units: U256,
    token: Address,
    chain_id: u64,
}

impl PaymentRequest {
    pub fn new(
        recipient: Address,
        amount: f64,
        token: Address,
        chain_id: u64,
    ) -> Result<Self, PaymentError> {
        if recipient.is_zero() {
            return Err(PaymentError::InvalidAddress(
                "recipient is the zero address".to_string(),
            ));
        }
        let base_units = to_base_units(amount)?;

        Ok(Self {
            recipient,
            amount,
            base_units,
            token,
            chain_id,
        })
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn base_units(&self) -> U256 {
        self.base_units
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

pub fn parse_address(value: &str) -> Result<Address, PaymentError> {
    Address::from_str(value.trim())
        .map_err(|e| PaymentError::InvalidAddress(format!("{}: {}", value, e)))
}

/// Terminal outcome of one `send_payment` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
}

impl PaymentResult {
    pub fn confirmed(hash: H256, receipt: Option<Receipt>) -> Self {
        Self {
            success: true,
            transaction_hash: Some(hash),
            error: None,
            error_code: None,
            receipt,
        }
    }

    pub fn failed(error: &PaymentError) -> Self {
        Self {
            success: false,
            transaction_hash: None,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            receipt: None,
        }
    }

    /// Failure after a hash is known, e.g. a reverted transfer.
    pub fn failed_with_hash(error: &PaymentError, hash: H256) -> Self {
        Self {
            transaction_hash: Some(hash),
            ..Self::failed(error)
        }
    }

    pub fn tip_id(&self) -> Option<String> {
        self.receipt.as_ref().map(Receipt::tip_id)
    }
}

/// Identifiers attached to the record of a confirmed tip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipContext {
    pub creator_id: Option<String>,
    pub tipper_id: Option<String>,
}

/// Record handed to the recording collaborator after confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipRecord {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub tip_id: String,
    pub recipient_address: Address,
    pub token_address: Address,
    pub amount: f64,
    /// Base units as a decimal string.
    pub amount_base_units: String,
    pub chain_id: u64,
    #[serde(rename = "creatorFid")]
    pub creator_id: Option<String>,
    #[serde(rename = "tipperFid")]
    pub tipper_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TipRecord {
    pub fn new(request: &PaymentRequest, receipt: &Receipt, context: &TipContext) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            tip_id: receipt.tip_id(),
            recipient_address: request.recipient(),
            token_address: request.token(),
            amount: request.amount(),
            amount_base_units: request.base_units().to_string(),
            chain_id: request.chain_id(),
            creator_id: context.creator_id.clone(),
            tipper_id: context.tipper_id.clone(),
            recorded_at: Utc::now(),
        }
    }
}
