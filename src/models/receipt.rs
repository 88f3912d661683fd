use crate::contracts::decode_transfer_log;
use ethers::types::{Address, TransactionReceipt, H256, U256};
use serde::{Deserialize, Serialize};

/// Blocks after inclusion before a transfer is treated as settled.
pub const FINALITY_THRESHOLD: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub transaction_index: u64,
    /// ERC-20 `Transfer` events emitted by the transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transfers: Vec<TokenTransfer>,
}

/// A decoded ERC-20 `Transfer` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    /// Contract that emitted the event.
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl Receipt {
    /// Ordering key of the transfer within the chain: `{block}-{index}`.
    pub fn tip_id(&self) -> String {
        format!("{}-{}", self.block_number, self.transaction_index)
    }

    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }

    /// Whether the transaction moved exactly `value` of `token` to `recipient`.
    pub fn pays(&self, token: Address, recipient: Address, value: U256) -> bool {
        self.transfers
            .iter()
            .any(|t| t.token == token && t.to == recipient && t.value == value)
    }

    /// Returns `None` for receipts of pending transactions, which carry no
    /// block number yet.
    pub fn from_rpc(receipt: &TransactionReceipt) -> Option<Self> {
        let block_number = receipt.block_number?.as_u64();
        let status = if receipt.status == Some(1.into()) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Failure
        };

        Some(Self {
            transaction_hash: receipt.transaction_hash,
            block_number,
            status,
            transaction_index: receipt.transaction_index.as_u64(),
            transfers: receipt.logs.iter().filter_map(decode_transfer_log).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationState {
    pub confirmations: u64,
    pub block_number: u64,
    pub finality_threshold: u64,
}

impl ConfirmationState {
    pub fn new(block_number: u64) -> Self {
        Self {
            confirmations: 0,
            block_number,
            finality_threshold: FINALITY_THRESHOLD,
        }
    }

    /// Confirmation count implied by a chain head at `height`.
    pub fn at_height(&self, height: u64) -> u64 {
        if height < self.block_number {
            0
        } else {
            height - self.block_number + 1
        }
    }

    pub fn is_final(&self) -> bool {
        self.confirmations >= self.finality_threshold
    }
}
