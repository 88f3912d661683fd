//! x402 "exact" scheme authorization for EVM tokens.
//!
//! A relay answering `402 Payment Required` lists the payments it accepts.
//! For the `exact` scheme the payer signs an EIP-3009
//! `TransferWithAuthorization` message (EIP-712 typed data) and sends it back,
//! base64-encoded, in the `X-PAYMENT` header of the retried request.

use crate::{
    contracts::{BASE_CHAIN_ID, BASE_SEPOLIA_CHAIN_ID},
    error::PaymentError,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ethers::{
    core::rand,
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip712::{EIP712Domain, Eip712, Eip712DomainType, TypedData, Types},
        Address, Signature, H256, U256,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const EXACT_SCHEME: &str = "exact";
pub const X402_VERSION: u8 = 1;

const PRIMARY_TYPE: &str = "TransferWithAuthorization";

const DOMAIN_FIELDS: [(&str, &str); 4] = [
    ("name", "string"),
    ("version", "string"),
    ("chainId", "uint256"),
    ("verifyingContract", "address"),
];

const AUTHORIZATION_FIELDS: [(&str, &str); 6] = [
    ("from", "address"),
    ("to", "address"),
    ("value", "uint256"),
    ("validAfter", "uint256"),
    ("validBefore", "uint256"),
    ("nonce", "bytes32"),
];

/// Seconds an authorization is back-dated to tolerate clock skew.
const VALID_AFTER_SKEW_SECS: u64 = 600;

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: u8,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
}

impl PaymentRequired {
    /// First requirement this client knows how to satisfy.
    pub fn exact_requirement(&self) -> Option<&PaymentRequirements> {
        self.accepts.iter().find(|r| r.scheme == EXACT_SCHEME)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub max_amount_required: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    pub pay_to: Address,
    #[serde(default = "default_timeout")]
    pub max_timeout_seconds: u64,
    pub asset: Address,
    #[serde(default)]
    pub extra: Option<TokenDomain>,
}

fn default_timeout() -> u64 {
    60
}

impl PaymentRequirements {
    pub fn amount(&self) -> Result<U256, PaymentError> {
        U256::from_dec_str(&self.max_amount_required).map_err(|e| {
            PaymentError::RelayUnavailable(format!(
                "Unreadable payment amount {}: {}",
                self.max_amount_required, e
            ))
        })
    }

    /// EIP-155 chain id of the requirement's network, `default` when the
    /// network name is not one we know.
    pub fn chain_id(&self, default: u64) -> u64 {
        match self.network.as_str() {
            "base" => BASE_CHAIN_ID,
            "base-sepolia" => BASE_SEPOLIA_CHAIN_ID,
            _ => default,
        }
    }
}

/// EIP-712 domain name and version of the token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDomain {
    pub name: String,
    pub version: String,
}

impl Default for TokenDomain {
    fn default() -> Self {
        Self {
            name: "USD Coin".to_string(),
            version: "2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: H256,
}

impl TransferAuthorization {
    pub fn new(
        from: Address,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> Result<Self, PaymentError> {
        Ok(Self {
            from,
            to: requirements.pay_to,
            value: requirements.amount()?,
            valid_after: now.saturating_sub(VALID_AFTER_SKEW_SECS),
            valid_before: now + requirements.max_timeout_seconds,
            nonce: random_nonce(),
        })
    }

    /// EIP-712 typed data for `transferWithAuthorization` on `token`.
    pub fn typed_data(&self, domain: &TokenDomain, chain_id: u64, token: Address) -> TypedData {
        let types: Types = BTreeMap::from([
            ("EIP712Domain".to_string(), domain_types(&DOMAIN_FIELDS)),
            (PRIMARY_TYPE.to_string(), domain_types(&AUTHORIZATION_FIELDS)),
        ]);

        let message: BTreeMap<String, Value> = BTreeMap::from([
            ("from".to_string(), json!(self.from)),
            ("to".to_string(), json!(self.to)),
            ("value".to_string(), json!(self.value.to_string())),
            ("validAfter".to_string(), json!(self.valid_after.to_string())),
            ("validBefore".to_string(), json!(self.valid_before.to_string())),
            ("nonce".to_string(), json!(self.nonce)),
        ]);

        TypedData {
            domain: EIP712Domain {
                name: Some(domain.name.clone()),
                version: Some(domain.version.clone()),
                chain_id: Some(U256::from(chain_id)),
                verifying_contract: Some(token),
                salt: None,
            },
            types,
            primary_type: PRIMARY_TYPE.to_string(),
            message,
        }
    }

    /// EIP-712 digest signed by the payer.
    pub fn signing_hash(
        &self,
        domain: &TokenDomain,
        chain_id: u64,
        token: Address,
    ) -> Result<H256, PaymentError> {
        self.typed_data(domain, chain_id, token)
            .encode_eip712()
            .map(H256::from)
            .map_err(|e| PaymentError::RelayRejected(format!("Cannot hash authorization: {}", e)))
    }
}

fn domain_types(fields: &[(&str, &str)]) -> Vec<Eip712DomainType> {
    fields
        .iter()
        .map(|(name, ty)| Eip712DomainType {
            name: name.to_string(),
            r#type: ty.to_string(),
        })
        .collect()
}

fn random_nonce() -> H256 {
    H256::from(rand::random::<[u8; 32]>())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    pub payload: ExactPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactPayload {
    pub signature: String,
    pub authorization: AuthorizationFields,
}

/// Wire form of [`TransferAuthorization`]: integers as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFields {
    pub from: Address,
    pub to: Address,
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    pub nonce: H256,
}

impl From<&TransferAuthorization> for AuthorizationFields {
    fn from(auth: &TransferAuthorization) -> Self {
        Self {
            from: auth.from,
            to: auth.to,
            value: auth.value.to_string(),
            valid_after: auth.valid_after.to_string(),
            valid_before: auth.valid_before.to_string(),
            nonce: auth.nonce,
        }
    }
}

pub fn encode_payment_header(
    requirements: &PaymentRequirements,
    authorization: &TransferAuthorization,
    signature: &Signature,
) -> Result<String, PaymentError> {
    let payload = PaymentPayload {
        x402_version: X402_VERSION,
        scheme: requirements.scheme.clone(),
        network: requirements.network.clone(),
        payload: ExactPayload {
            signature: format!("0x{}", hex::encode(signature.to_vec())),
            authorization: authorization.into(),
        },
    };

    let json = serde_json::to_vec(&payload)
        .map_err(|e| PaymentError::RelayRejected(format!("Cannot encode payment: {}", e)))?;
    Ok(STANDARD.encode(json))
}

pub fn decode_payment_header(header: &str) -> Result<PaymentPayload, PaymentError> {
    let json = STANDARD
        .decode(header.trim())
        .map_err(|e| PaymentError::RelayRejected(format!("Invalid payment header: {}", e)))?;
    serde_json::from_slice(&json)
        .map_err(|e| PaymentError::RelayRejected(format!("Invalid payment header: {}", e)))
}

/// Signs `requirements` with `wallet` and returns the `X-PAYMENT` header value.
pub async fn authorize_with_wallet(
    wallet: &LocalWallet,
    requirements: &PaymentRequirements,
    default_chain_id: u64,
    now: u64,
) -> Result<String, PaymentError> {
    let authorization = TransferAuthorization::new(wallet.address(), requirements, now)?;
    let domain = requirements.extra.clone().unwrap_or_default();
    let typed_data = authorization.typed_data(
        &domain,
        requirements.chain_id(default_chain_id),
        requirements.asset,
    );

    let signature = wallet
        .sign_typed_data(&typed_data)
        .await
        .map_err(|e| PaymentError::RelayRejected(format!("Authorization signing failed: {}", e)))?;

    tracing::debug!(
        "Signed payment authorization for {} units to {:?} on {}",
        authorization.value,
        authorization.to,
        requirements.network
    );

    encode_payment_header(requirements, &authorization, &signature)
}
