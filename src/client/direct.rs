use crate::{client::signer::WalletSigner, contracts::TransferPayload, error::PaymentError};
use ethers::types::H256;

/// Sends the transfer from the user's own account; the user pays gas.
///
/// Failures are terminal. The submitter never resubmits, so a value transfer
/// cannot be silently duplicated.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSubmitter;

impl DirectSubmitter {
    pub async fn submit(
        &self,
        signer: &dyn WalletSigner,
        payload: &TransferPayload,
    ) -> Result<H256, PaymentError> {
        let account = signer.account().ok_or(PaymentError::SignerUnavailable)?;

        tracing::info!(
            "Submitting transfer directly from {:?} to token {:?}",
            account,
            payload.to
        );

        let hash = signer.send_transaction(payload).await.map_err(|e| {
            tracing::warn!("Direct submission failed: {}", e);
            e
        })?;

        tracing::info!("Transaction sent: {:?}", hash);
        Ok(hash)
    }
}
