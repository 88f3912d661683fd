use ethers::providers::ProviderError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Wallet not connected")]
    SignerUnavailable,

    #[error("Transaction was rejected by user")]
    UserRejected,

    #[error("Insufficient USDC balance")]
    InsufficientFunds,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("Relay rejected payment: {0}")]
    RelayRejected(String),

    #[error("No transaction hash returned from relay")]
    NoHashReturned,

    #[error("Transaction failed on-chain")]
    OnChainFailure,

    #[error("A payment is already in progress")]
    AlreadyInProgress,

    #[error("Transaction not confirmed after {0:?}")]
    Unconfirmed(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Stable machine-readable code, suitable for callers that branch on the
    /// failure kind rather than the message.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidAmount(_) => "INVALID_AMOUNT",
            PaymentError::InvalidAddress(_) => "INVALID_ADDRESS",
            PaymentError::SignerUnavailable => "SIGNER_UNAVAILABLE",
            PaymentError::UserRejected => "USER_REJECTED",
            PaymentError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            PaymentError::Rpc(_) => "RPC_ERROR",
            PaymentError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            PaymentError::RelayUnavailable(_) => "RELAY_UNAVAILABLE",
            PaymentError::RelayRejected(_) => "RELAY_REJECTED",
            PaymentError::NoHashReturned => "NO_HASH_RETURNED",
            PaymentError::OnChainFailure => "ON_CHAIN_FAILURE",
            PaymentError::AlreadyInProgress => "ALREADY_IN_PROGRESS",
            PaymentError::Unconfirmed(_) => "UNCONFIRMED",
            PaymentError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the orchestrator may recover from this relay failure by
    /// submitting the transfer directly. Only an explicit payment rejection
    /// from the relay is surfaced to the caller.
    pub fn allows_direct_fallback(&self) -> bool {
        matches!(
            self,
            PaymentError::RelayUnavailable(_) | PaymentError::NoHashReturned
        )
    }
}

impl From<ProviderError> for PaymentError {
    fn from(err: ProviderError) -> Self {
        PaymentError::Rpc(err.to_string())
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::RelayUnavailable(err.to_string())
    }
}
