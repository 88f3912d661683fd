pub mod client;
pub mod config;
pub mod contracts;
pub mod error;
pub mod models;
pub mod services;

pub use client::{ConfirmationTracker, EngineConfig, PaymentOrchestrator};
pub use error::PaymentError;
pub use models::{PaymentResult, Receipt, TransactionStatus};
