use crate::{
    client::{
        confirmation::ConfirmationTracker,
        direct::DirectSubmitter,
        signer::WalletSigner,
    },
    contracts::TransferPayload,
    error::PaymentError,
    models::{
        format_base_units, ConfirmationState, PaymentRequest, PaymentResult, Receipt, TipContext,
        TipRecord, TransactionStatus,
    },
    services::{ChainReader, PaymentRelay, RelayTransfer, TipRecorder},
};
use ethers::types::{Address, H256};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;

/// Settings for one orchestrator. Collaborators are attached separately.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub recipient: Option<Address>,
    pub token: Address,
    pub chain_id: u64,
    /// Upper bound on waiting for a receipt; elapsed waits fail as `Unconfirmed`.
    pub receipt_timeout: Duration,
    pub context: TipContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Validating,
    BalanceCheck,
    Encoding,
    RelayAttempt,
    DirectAttempt,
    AwaitingReceipt,
    Confirmed,
    Failed,
}

/// Releases the single in-flight slot when the attempt ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a tip from amount to confirmed transfer.
///
/// One attempt may be in flight at a time; a concurrent `send_payment` fails
/// with `AlreadyInProgress` and leaves the running attempt untouched. The
/// relay path is tried first when configured and falls back to a direct
/// submission unless the relay explicitly rejected the payment. Direct
/// submissions are never retried.
pub struct PaymentOrchestrator {
    config: EngineConfig,
    chain: Option<Arc<dyn ChainReader>>,
    signer: Option<Arc<dyn WalletSigner>>,
    relay: Option<Arc<dyn PaymentRelay>>,
    recorder: Option<Arc<dyn TipRecorder>>,
    direct: DirectSubmitter,
    status: watch::Sender<TransactionStatus>,
    in_flight: AtomicBool,
}

impl PaymentOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        let (status, _) = watch::channel(TransactionStatus::Idle);
        Self {
            config,
            chain: None,
            signer: None,
            relay: None,
            recorder: None,
            direct: DirectSubmitter,
            status,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_chain_reader(mut self, chain: Arc<dyn ChainReader>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn WalletSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_relay(mut self, relay: Arc<dyn PaymentRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn TipRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the current attempt's status.
    pub fn status(&self) -> TransactionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<TransactionStatus> {
        self.status.subscribe()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns a finished attempt's status to `Idle`. Ignored while an
    /// attempt is in flight; a `Pending` status is never replaced.
    pub fn reset_status(&self) -> bool {
        let reset = self.status.send_if_modified(|status| {
            if status.is_pending() || self.is_in_flight() {
                return false;
            }
            *status = TransactionStatus::Idle;
            true
        });
        if !reset {
            tracing::warn!("Ignoring status reset while a payment is in flight");
        }
        reset
    }

    pub async fn send_payment(&self, amount: f64) -> PaymentResult {
        let Some(_slot) = InFlight::acquire(&self.in_flight) else {
            tracing::warn!("Rejected payment of {} USDC: another payment is in flight", amount);
            return PaymentResult::failed(&PaymentError::AlreadyInProgress);
        };

        self.run(amount).await
    }

    /// Follows `receipt` to finality on the configured chain reader. `None`
    /// without a chain reader or for a failed receipt.
    pub fn track_confirmations<F>(
        &self,
        receipt: &Receipt,
        on_update: F,
    ) -> Option<ConfirmationTracker>
    where
        F: FnMut(ConfirmationState) + Send + 'static,
    {
        if !receipt.is_success() {
            return None;
        }
        let chain = self.chain.as_ref()?;
        Some(ConfirmationTracker::start(chain.as_ref(), receipt, on_update))
    }

    async fn run(&self, amount: f64) -> PaymentResult {
        self.enter(Phase::Validating);
        let signer = match self.signer.as_ref().filter(|s| s.account().is_some()) {
            Some(signer) => signer.clone(),
            None => return self.fail(PaymentError::SignerUnavailable, None),
        };
        let Some(recipient) = self.config.recipient else {
            return self.fail(
                PaymentError::InvalidAddress("Recipient address not provided".to_string()),
                None,
            );
        };

        self.status.send_replace(TransactionStatus::Pending);

        let request = PaymentRequest::new(
            recipient,
            amount,
            self.config.token,
            self.config.chain_id,
        );
        let request = match request {
            Ok(request) => request,
            Err(e) => return self.fail(e, None),
        };

        tracing::info!(
            "Sending {} USDC ({} base units) to {:?}",
            request.amount(),
            request.base_units(),
            request.recipient()
        );

        if let Err(e) = self.check_balance(signer.as_ref(), &request).await {
            return self.fail(e, None);
        }

        self.enter(Phase::Encoding);
        let payload = TransferPayload::new(
            request.token(),
            request.recipient(),
            request.base_units(),
            request.chain_id(),
        );

        let relayed = match self.try_relay(&request).await {
            Ok(hash) => hash,
            Err(e) => return self.fail(e, None),
        };

        let hash = match relayed {
            Some(hash) => hash,
            None => {
                self.enter(Phase::DirectAttempt);
                match self.direct.submit(signer.as_ref(), &payload).await {
                    Ok(hash) => hash,
                    Err(e) => return self.fail(e, None),
                }
            }
        };

        self.enter(Phase::AwaitingReceipt);
        let receipt = match self.await_receipt(&request, hash).await {
            Ok(receipt) => receipt,
            Err(e) => return self.fail(e, Some(hash)),
        };

        self.enter(Phase::Confirmed);
        if let Some(receipt) = &receipt {
            self.record(&request, receipt).await;
        }

        self.status.send_replace(TransactionStatus::Success { hash });
        tracing::info!("Payment confirmed: {:?}", hash);
        PaymentResult::confirmed(hash, receipt)
    }

    /// Best effort: an unreadable balance does not block the payment.
    async fn check_balance(
        &self,
        signer: &dyn WalletSigner,
        request: &PaymentRequest,
    ) -> Result<(), PaymentError> {
        let (Some(chain), Some(account)) = (self.chain.as_ref(), signer.account()) else {
            return Ok(());
        };
        self.enter(Phase::BalanceCheck);

        match chain.get_balance(account, request.token()).await {
            Ok(balance) if balance < request.base_units() => {
                tracing::warn!(
                    "Insufficient USDC balance: {} < {}",
                    format_base_units(balance).unwrap_or_else(|_| balance.to_string()),
                    request.amount()
                );
                Err(PaymentError::InsufficientFunds)
            }
            Ok(balance) => {
                tracing::debug!("Current USDC balance: {} base units", balance);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Balance check failed, continuing: {}", e);
                Ok(())
            }
        }
    }

    /// `Ok(None)` means the direct path should be taken.
    async fn try_relay(&self, request: &PaymentRequest) -> Result<Option<H256>, PaymentError> {
        let Some(relay) = &self.relay else {
            return Ok(None);
        };
        self.enter(Phase::RelayAttempt);

        match relay.submit(&RelayTransfer::from(request)).await {
            Ok(hash) => Ok(Some(hash)),
            Err(e) if e.allows_direct_fallback() => {
                tracing::warn!("Relay payment failed, falling back to direct transfer: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Waits for `hash` to be mined and checks that it carried the tip.
    async fn await_receipt(
        &self,
        request: &PaymentRequest,
        hash: H256,
    ) -> Result<Option<Receipt>, PaymentError> {
        let Some(chain) = &self.chain else {
            tracing::warn!("No chain reader configured; reporting {:?} unconfirmed", hash);
            return Ok(None);
        };

        let timeout = self.config.receipt_timeout;
        let receipt = tokio::time::timeout(timeout, chain.get_receipt(hash))
            .await
            .map_err(|_| PaymentError::Unconfirmed(timeout))??;

        if !receipt.is_success() {
            return Err(PaymentError::OnChainFailure);
        }
        if !receipt.pays(request.token(), request.recipient(), request.base_units()) {
            tracing::warn!(
                "Transaction {:?} has no transfer of {} base units to {:?}",
                hash,
                request.base_units(),
                request.recipient()
            );
            return Err(PaymentError::OnChainFailure);
        }
        Ok(Some(receipt))
    }

    async fn record(&self, request: &PaymentRequest, receipt: &Receipt) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let record = TipRecord::new(request, receipt, &self.config.context);
        if let Err(e) = recorder.record(&record).await {
            tracing::warn!("Transaction succeeded but recording failed: {}", e);
        }
    }

    fn fail(&self, error: PaymentError, hash: Option<H256>) -> PaymentResult {
        self.enter(Phase::Failed);
        tracing::error!(error = ?error, error_code = error.code(), "Payment failed");

        self.status.send_replace(TransactionStatus::Error {
            error: error.to_string(),
        });
        match hash {
            Some(hash) => PaymentResult::failed_with_hash(&error, hash),
            None => PaymentResult::failed(&error),
        }
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!(phase = ?phase, "payment phase");
    }
}
