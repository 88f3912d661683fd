use crate::{
    client::authorization::{authorize_with_wallet, PaymentRequirements},
    contracts::TransferPayload,
    error::PaymentError,
};
use async_trait::async_trait;
use chrono::Utc;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionRequest, H256},
};
use std::sync::Arc;

/// The user's wallet, as seen by the payment engine.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Active account, `None` when no account is bound.
    fn account(&self) -> Option<Address>;

    async fn send_transaction(&self, payload: &TransferPayload) -> Result<H256, PaymentError>;
}

/// Produces the `X-PAYMENT` header answering a relay's 402 challenge.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(&self, requirements: &PaymentRequirements) -> Result<String, PaymentError>;
}

/// JSON-RPC / EIP-1193 code for a request the user declined.
const USER_REJECTED_CODE: i64 = 4001;

pub struct LocalWalletSigner {
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    chain_id: u64,
}

impl LocalWalletSigner {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self, PaymentError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| PaymentError::Config(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| PaymentError::Config(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }
}

#[async_trait]
impl WalletSigner for LocalWalletSigner {
    fn account(&self) -> Option<Address> {
        Some(self.client.address())
    }

    async fn send_transaction(&self, payload: &TransferPayload) -> Result<H256, PaymentError> {
        let tx = TransactionRequest::new()
            .to(payload.to)
            .data(payload.data.clone())
            .chain_id(payload.chain_id);

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_signer_error(&e))?;

        Ok(pending.tx_hash())
    }
}

#[async_trait]
impl PaymentAuthorizer for LocalWalletSigner {
    async fn authorize(&self, requirements: &PaymentRequirements) -> Result<String, PaymentError> {
        let now = Utc::now().timestamp().max(0) as u64;
        authorize_with_wallet(self.client.signer(), requirements, self.chain_id, now).await
    }
}

/// Maps a signer/node failure onto the payment error taxonomy.
pub fn classify_signer_error<E: MiddlewareError>(err: &E) -> PaymentError {
    if let Some(rpc) = err.as_error_response() {
        return classify_rpc_error(rpc.code, &rpc.message);
    }
    PaymentError::Rpc(err.to_string())
}

fn classify_rpc_error(code: i64, message: &str) -> PaymentError {
    let message = message.to_lowercase();
    let rejected = message.contains("user rejected") || message.contains("user denied");
    let underfunded = message.contains("insufficient funds")
        || message.contains("transfer amount exceeds balance");

    if code == USER_REJECTED_CODE || rejected {
        PaymentError::UserRejected
    } else if underfunded {
        PaymentError::InsufficientFunds
    } else {
        PaymentError::Rpc(format!("{} (code {})", message, code))
    }
}
