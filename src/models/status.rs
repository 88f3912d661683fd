use ethers::types::H256;
use serde::{Deserialize, Serialize};

/// Caller-facing status of the current payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Idle,
    Pending,
    Success {
        hash: H256,
    },
    Error {
        error: String,
    },
}

impl TransactionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success { .. } | TransactionStatus::Error { .. }
        )
    }
}
