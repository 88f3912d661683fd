pub mod authorization;
pub mod confirmation;
pub mod direct;
pub mod payment;
pub mod signer;

pub use confirmation::ConfirmationTracker;
pub use direct::DirectSubmitter;
pub use payment::{EngineConfig, PaymentOrchestrator};
pub use signer::{LocalWalletSigner, PaymentAuthorizer, WalletSigner};
