use crate::{contracts::IERC20, error::PaymentError, models::Receipt};
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, H256, U256},
};
use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;

/// Invoked once per new block height. Returning `Break` deregisters it.
pub type BlockCallback = Box<dyn FnMut(u64) -> ControlFlow<()> + Send>;

/// Read-only view of the chain used by the payment engine.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn get_balance(&self, owner: Address, token: Address) -> Result<U256, PaymentError>;

    /// Waits until `hash` is mined.
    async fn get_receipt(&self, hash: H256) -> Result<Receipt, PaymentError>;

    /// Current chain head. Callers use it to show progress; the payment flow
    /// and confirmation tracking rely on `subscribe_block_height` instead.
    async fn get_block_height(&self) -> Result<u64, PaymentError>;

    fn subscribe_block_height(&self, on_block: BlockCallback) -> Subscription;
}

/// Handle to a block-height subscription.
///
/// Clones share the same registration. `unsubscribe` may be called any number
/// of times, including after the callback deregistered itself.
#[derive(Clone, Debug, Default)]
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsubscribe(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the subscription is cancelled.
    pub async fn cancelled(&self) {
        while self.is_active() {
            let notified = self.notify.notified();
            if !self.is_active() {
                break;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainReaderOptions {
    pub poll_interval: Duration,
    /// Consecutive polls a hash may be unknown to the node before the lookup
    /// fails with `TransactionNotFound`.
    pub not_found_polls: u32,
}

impl Default for ChainReaderOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            not_found_polls: 30,
        }
    }
}

pub struct RpcChainReader {
    primary: Arc<Provider<Http>>,
    fallback: Option<Arc<Provider<Http>>>,
    options: ChainReaderOptions,
}

impl RpcChainReader {
    pub fn new(
        rpc_url: &str,
        fallback_url: Option<&str>,
        options: ChainReaderOptions,
    ) -> Result<Self, PaymentError> {
        let primary = Arc::new(
            Provider::<Http>::try_from(rpc_url)
                .map_err(|e| PaymentError::Config(format!("Invalid RPC URL {}: {}", rpc_url, e)))?,
        );

        let fallback = if let Some(url) = fallback_url {
            Some(Arc::new(Provider::<Http>::try_from(url).map_err(|e| {
                PaymentError::Config(format!("Invalid fallback RPC URL {}: {}", url, e))
            })?))
        } else {
            None
        };

        Ok(Self {
            primary,
            fallback,
            options,
        })
    }

    async fn balance_of(
        provider: Arc<Provider<Http>>,
        owner: Address,
        token: Address,
    ) -> Result<U256, PaymentError> {
        IERC20::new(token, provider)
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| PaymentError::Rpc(e.to_string()))
    }

    async fn fetch_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, PaymentError> {
        match self.primary.get_transaction_receipt(hash).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Primary RPC failed ({}), trying fallback", e);
                    Ok(fallback.get_transaction_receipt(hash).await?)
                }
                None => Err(e.into()),
            },
        }
    }

    async fn is_known(&self, hash: H256) -> Result<bool, PaymentError> {
        match self.primary.get_transaction(hash).await {
            Ok(tx) => Ok(tx.is_some()),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Primary RPC failed ({}), trying fallback", e);
                    Ok(fallback.get_transaction(hash).await?.is_some())
                }
                None => Err(e.into()),
            },
        }
    }

    async fn block_number(
        primary: &Provider<Http>,
        fallback: Option<&Provider<Http>>,
    ) -> Result<u64, PaymentError> {
        match primary.get_block_number().await {
            Ok(num) => Ok(num.as_u64()),
            Err(e) => match fallback {
                Some(fallback) => Ok(fallback.get_block_number().await?.as_u64()),
                None => Err(e.into()),
            },
        }
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn get_balance(&self, owner: Address, token: Address) -> Result<U256, PaymentError> {
        match Self::balance_of(self.primary.clone(), owner, token).await {
            Ok(balance) => Ok(balance),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Primary RPC balance lookup failed ({}), trying fallback", e);
                    Self::balance_of(fallback.clone(), owner, token).await
                }
                None => Err(e),
            },
        }
    }

    async fn get_receipt(&self, hash: H256) -> Result<Receipt, PaymentError> {
        let mut unknown_polls = 0u32;

        loop {
            let fetched = self.fetch_receipt(hash).await?;
            if let Some(receipt) = fetched.as_ref().and_then(Receipt::from_rpc) {
                tracing::debug!(
                    "Receipt for {:?} in block {} (status {:?})",
                    hash,
                    receipt.block_number,
                    receipt.status
                );
                return Ok(receipt);
            }

            if self.is_known(hash).await? {
                unknown_polls = 0;
            } else {
                unknown_polls += 1;
                if unknown_polls >= self.options.not_found_polls {
                    return Err(PaymentError::TransactionNotFound(format!("{:?}", hash)));
                }
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn get_block_height(&self) -> Result<u64, PaymentError> {
        Self::block_number(&self.primary, self.fallback.as_deref()).await
    }

    fn subscribe_block_height(&self, mut on_block: BlockCallback) -> Subscription {
        let subscription = Subscription::new();
        let handle = subscription.clone();
        let primary = self.primary.clone();
        let fallback = self.fallback.clone();
        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::spawn(async move {
            let mut last_seen: Option<u64> = None;

            loop {
                tokio::select! {
                    _ = handle.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let height = match Self::block_number(&primary, fallback.as_deref()).await {
                    Ok(height) => height,
                    Err(e) => {
                        tracing::warn!("Block height poll failed: {}", e);
                        continue;
                    }
                };

                if last_seen.map_or(false, |last| height <= last) {
                    continue;
                }
                last_seen = Some(height);

                if !handle.is_active() {
                    break;
                }
                if on_block(height).is_break() {
                    handle.unsubscribe();
                    break;
                }
            }

            tracing::debug!("Block height subscription closed");
        });

        subscription
    }
}
