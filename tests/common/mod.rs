#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tip_engine::{
    client::{authorization::PaymentRequirements, EngineConfig, PaymentAuthorizer, WalletSigner},
    contracts::TransferPayload,
    error::PaymentError,
    models::{to_base_units, Receipt, ReceiptStatus, TipContext, TipRecord, TokenTransfer},
    services::{BlockCallback, ChainReader, PaymentRelay, RelayTransfer, Subscription, TipRecorder},
};
use tokio::sync::Notify;

pub const CHAIN_ID: u64 = 84532;

pub fn recipient() -> Address {
    Address::repeat_byte(0x11)
}

pub fn token() -> Address {
    Address::repeat_byte(0x22)
}

pub fn payer() -> Address {
    Address::repeat_byte(0x33)
}

pub fn tx_hash(byte: u8) -> H256 {
    H256::repeat_byte(byte)
}

pub fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        recipient: Some(recipient()),
        token: token(),
        chain_id: CHAIN_ID,
        receipt_timeout: Duration::from_secs(5),
        context: TipContext {
            creator_id: Some("creator-1".to_string()),
            tipper_id: Some("tipper-7".to_string()),
        },
    }
}

pub fn receipt(hash: H256, block_number: u64, index: u64, status: ReceiptStatus) -> Receipt {
    Receipt {
        transaction_hash: hash,
        block_number,
        status,
        transaction_index: index,
        transfers: Vec::new(),
    }
}

/// Successful receipt carrying the USDC transfer of a `tip` to `recipient()`.
pub fn paid_receipt(hash: H256, block_number: u64, index: u64, tip: f64) -> Receipt {
    Receipt {
        transfers: vec![TokenTransfer {
            token: token(),
            from: payer(),
            to: recipient(),
            value: to_base_units(tip).unwrap(),
        }],
        ..receipt(hash, block_number, index, ReceiptStatus::Success)
    }
}

struct Registration {
    callback: BlockCallback,
    subscription: Subscription,
}

/// Chain reader whose block heights are pushed by the test.
pub struct MockChain {
    pub balance: Mutex<Result<U256, PaymentError>>,
    pub receipt: Mutex<Result<Receipt, PaymentError>>,
    pub receipt_delay: Option<Duration>,
    pub balance_calls: AtomicUsize,
    pub receipt_calls: Mutex<Vec<H256>>,
    registrations: Mutex<Vec<Registration>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl MockChain {
    pub fn new(
        balance: Result<U256, PaymentError>,
        receipt: Result<Receipt, PaymentError>,
    ) -> Self {
        Self {
            balance: Mutex::new(balance),
            receipt: Mutex::new(receipt),
            receipt_delay: None,
            balance_calls: AtomicUsize::new(0),
            receipt_calls: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_receipt_delay(mut self, delay: Duration) -> Self {
        self.receipt_delay = Some(delay);
        self
    }

    /// Delivers a new chain head to every active subscriber.
    pub fn emit(&self, height: u64) {
        let mut registrations = self.registrations.lock().unwrap();
        for registration in registrations.iter_mut() {
            if !registration.subscription.is_active() {
                continue;
            }
            if (registration.callback)(height).is_break() {
                registration.subscription.unsubscribe();
            }
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_balance(&self, _owner: Address, _token: Address) -> Result<U256, PaymentError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.balance.lock().unwrap().clone()
    }

    async fn get_receipt(&self, hash: H256) -> Result<Receipt, PaymentError> {
        self.receipt_calls.lock().unwrap().push(hash);
        if let Some(delay) = self.receipt_delay {
            tokio::time::sleep(delay).await;
        }
        let receipt = self.receipt.lock().unwrap().clone()?;
        Ok(Receipt {
            transaction_hash: hash,
            ..receipt
        })
    }

    async fn get_block_height(&self) -> Result<u64, PaymentError> {
        Err(PaymentError::Rpc("not used".to_string()))
    }

    fn subscribe_block_height(&self, on_block: BlockCallback) -> Subscription {
        let subscription = Subscription::new();
        self.subscriptions.lock().unwrap().push(subscription.clone());
        self.registrations.lock().unwrap().push(Registration {
            callback: on_block,
            subscription: subscription.clone(),
        });
        subscription
    }
}

pub struct MockSigner {
    pub account: Option<Address>,
    pub result: Result<H256, PaymentError>,
    pub calls: Mutex<Vec<TransferPayload>>,
    /// When set, submissions wait for a permit before returning.
    pub gate: Option<Arc<Notify>>,
}

impl MockSigner {
    pub fn new(result: Result<H256, PaymentError>) -> Self {
        Self {
            account: Some(payer()),
            result,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn without_account() -> Self {
        Self {
            account: None,
            ..Self::new(Ok(tx_hash(1)))
        }
    }

    pub fn gated(result: Result<H256, PaymentError>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(result)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn send_transaction(&self, payload: &TransferPayload) -> Result<H256, PaymentError> {
        self.calls.lock().unwrap().push(payload.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.result.clone()
    }
}

pub struct MockRelay {
    pub result: Result<H256, PaymentError>,
    pub calls: Mutex<Vec<RelayTransfer>>,
}

impl MockRelay {
    pub fn new(result: Result<H256, PaymentError>) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentRelay for MockRelay {
    async fn submit(&self, transfer: &RelayTransfer) -> Result<H256, PaymentError> {
        self.calls.lock().unwrap().push(transfer.clone());
        self.result.clone()
    }
}

#[derive(Default)]
pub struct MockRecorder {
    pub fail: bool,
    pub records: Mutex<Vec<TipRecord>>,
}

#[async_trait]
impl TipRecorder for MockRecorder {
    async fn record(&self, record: &TipRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        if self.fail {
            bail!("recorder offline");
        }
        Ok(())
    }
}

pub struct MockAuthorizer {
    pub header: Result<String, PaymentError>,
    pub calls: AtomicUsize,
}

impl MockAuthorizer {
    pub fn new(header: Result<String, PaymentError>) -> Self {
        Self {
            header,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentAuthorizer for MockAuthorizer {
    async fn authorize(&self, _requirements: &PaymentRequirements) -> Result<String, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.header.clone()
    }
}

/// Waits (bounded) until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
