use crate::{
    client::EngineConfig,
    contracts::{BASE_CHAIN_ID, BASE_SEPOLIA_CHAIN_ID, USDC_BASE, USDC_BASE_SEPOLIA},
    models::TipContext,
    services::ChainReaderOptions,
};
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    // Payment network
    pub rpc_url: String,
    pub rpc_fallback_url: Option<String>,
    pub chain_id: u64,
    pub usdc_address: Address,

    // Payment
    pub recipient_address: Option<Address>,
    pub wallet_private_key: Option<String>,
    pub creator_id: Option<String>,
    pub tipper_id: Option<String>,

    // Collaborators
    pub relay_url: Option<String>,
    pub record_url: Option<String>,
    pub http_timeout_secs: u64,

    // Receipts & confirmations
    pub receipt_timeout_secs: u64,
    pub block_poll_interval_ms: u64,
    pub receipt_not_found_polls: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;
        let production = environment == Environment::Production;

        let config = Self {
            environment,

            rpc_url: std::env::var("RPC_URL").context("RPC_URL required")?,
            rpc_fallback_url: Self::optional("RPC_FALLBACK_URL"),
            chain_id: match Self::optional("CHAIN_ID") {
                Some(id) => id.parse().context("Invalid CHAIN_ID")?,
                None if production => BASE_CHAIN_ID,
                None => BASE_SEPOLIA_CHAIN_ID,
            },
            usdc_address: match Self::optional("USDC_ADDRESS") {
                Some(addr) => Self::parse_address("USDC_ADDRESS", &addr)?,
                None if production => Self::parse_address("USDC_ADDRESS", USDC_BASE)?,
                None => Self::parse_address("USDC_ADDRESS", USDC_BASE_SEPOLIA)?,
            },

            recipient_address: Self::optional("RECIPIENT_ADDRESS")
                .map(|addr| Self::parse_address("RECIPIENT_ADDRESS", &addr))
                .transpose()?,
            wallet_private_key: Self::optional("WALLET_PRIVATE_KEY"),
            creator_id: Self::optional("CREATOR_ID"),
            tipper_id: Self::optional("TIPPER_ID"),

            relay_url: Self::optional("RELAY_URL"),
            record_url: Self::optional("RECORD_URL"),
            http_timeout_secs: Self::parse_or("HTTP_TIMEOUT_SECS", 30)?,

            receipt_timeout_secs: Self::parse_or("RECEIPT_TIMEOUT_SECS", 120)?,
            block_poll_interval_ms: Self::parse_or("BLOCK_POLL_INTERVAL_MS", 2000)?,
            receipt_not_found_polls: Self::parse_or("RECEIPT_NOT_FOUND_POLLS", 30)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self::environment_from_str(&env)
    }

    fn environment_from_str(env: &str) -> Result<Environment> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn optional(var: &str) -> Option<String> {
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(var: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match Self::optional(var) {
            Some(value) => value.parse().with_context(|| format!("Invalid {}", var)),
            None => Ok(default),
        }
    }

    fn parse_address(var: &str, value: &str) -> Result<Address> {
        Address::from_str(value.trim()).with_context(|| format!("Invalid address for {}", var))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http") {
            bail!("RPC_URL must be HTTP(S) URL");
        }
        if let Some(url) = &self.rpc_fallback_url {
            if !url.starts_with("http") {
                bail!("RPC_FALLBACK_URL must be HTTP(S) URL");
            }
        }
        if let Some(url) = &self.relay_url {
            if !url.starts_with("http") {
                bail!("RELAY_URL must be HTTP(S) URL");
            }
        }
        if let Some(url) = &self.record_url {
            if !url.starts_with("http") {
                bail!("RECORD_URL must be HTTP(S) URL");
            }
        }
        if let Some(key) = &self.wallet_private_key {
            if !key.starts_with("0x") {
                bail!("WALLET_PRIVATE_KEY must start with 0x");
            }
        }
        if self.receipt_timeout_secs == 0 {
            bail!("RECEIPT_TIMEOUT_SECS must be positive");
        }

        tracing::info!(
            "Configuration validated for {:?} environment (chain {})",
            self.environment,
            self.chain_id
        );

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            recipient: self.recipient_address,
            token: self.usdc_address,
            chain_id: self.chain_id,
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            context: TipContext {
                creator_id: self.creator_id.clone(),
                tipper_id: self.tipper_id.clone(),
            },
        }
    }

    pub fn chain_reader_options(&self) -> ChainReaderOptions {
        ChainReaderOptions {
            poll_interval: Duration::from_millis(self.block_poll_interval_ms),
            not_found_polls: self.receipt_not_found_polls,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
