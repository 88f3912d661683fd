use crate::{
    models::{ConfirmationState, Receipt},
    services::{ChainReader, Subscription},
};
use std::ops::ControlFlow;
use tokio::sync::watch;

/// Follows a mined transaction until it reaches the finality threshold.
///
/// Each new chain head `h` yields `h - receipt_block + 1` confirmations. The
/// tracker deregisters from the chain reader once the count is final. Dropping
/// the tracker does not stop it; call [`ConfirmationTracker::cancel`] for that.
pub struct ConfirmationTracker {
    subscription: Subscription,
    state: watch::Receiver<ConfirmationState>,
}

impl ConfirmationTracker {
    pub fn start<F>(reader: &dyn ChainReader, receipt: &Receipt, mut on_update: F) -> Self
    where
        F: FnMut(ConfirmationState) + Send + 'static,
    {
        let initial = ConfirmationState::new(receipt.block_number);
        let (tx, rx) = watch::channel(initial);
        let mut last_height: Option<u64> = None;
        let hash = receipt.transaction_hash;

        let subscription = reader.subscribe_block_height(Box::new(move |height: u64| {
            // Ignore repeated or older heads.
            if last_height.map_or(false, |last| height <= last) {
                return ControlFlow::Continue(());
            }
            last_height = Some(height);

            let mut state = *tx.borrow();
            state.confirmations = state.at_height(height);
            tx.send_replace(state);
            on_update(state);

            if state.is_final() {
                tracing::info!(
                    "Transaction {:?} final after {} confirmations",
                    hash,
                    state.confirmations
                );
                ControlFlow::Break(())
            } else {
                tracing::debug!("Transaction {:?}: {} confirmations", hash, state.confirmations);
                ControlFlow::Continue(())
            }
        }));

        Self {
            subscription,
            state: rx,
        }
    }

    pub fn state(&self) -> ConfirmationState {
        *self.state.borrow()
    }

    /// Receiver that observes every confirmation update.
    pub fn watch(&self) -> watch::Receiver<ConfirmationState> {
        self.state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stops tracking. Safe to call repeatedly and after finality.
    pub fn cancel(&self) {
        self.subscription.unsubscribe();
    }

    /// Waits until the tracker reaches finality or is cancelled.
    pub async fn finished(&self) -> ConfirmationState {
        self.subscription.cancelled().await;
        self.state()
    }
}
