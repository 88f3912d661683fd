use crate::{
    error::PaymentError,
    models::{parse_address, TokenTransfer},
};
use ethers::{
    abi::AbiEncode,
    prelude::*,
    types::{Address, Bytes, U256},
};

// USDC contract ABI: transfer, balance lookup and the Transfer event
abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        event Transfer(address indexed from, address indexed to, uint256 value)
    ]"#
);

pub const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const USDC_BASE_SEPOLIA: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

pub const BASE_CHAIN_ID: u64 = 8453;
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

/// Calldata for `transfer(recipient, amount)`.
pub fn encode_transfer(recipient: &str, amount: U256) -> Result<Bytes, PaymentError> {
    let to = parse_address(recipient)?;
    Ok(transfer_calldata(to, amount))
}

pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    TransferCall { to, amount }.encode().into()
}

/// Decodes an ERC-20 `Transfer` event; `None` for any other log.
pub fn decode_transfer_log(log: &Log) -> Option<TokenTransfer> {
    let event: TransferFilter = ethers::contract::parse_log(log.clone()).ok()?;
    Some(TokenTransfer {
        token: log.address,
        from: event.from,
        to: event.to,
        value: event.value,
    })
}

/// A contract call ready to hand to a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPayload {
    /// Token contract receiving the call.
    pub to: Address,
    pub data: Bytes,
    pub chain_id: u64,
}

impl TransferPayload {
    pub fn new(token: Address, recipient: Address, amount: U256, chain_id: u64) -> Self {
        Self {
            to: token,
            data: transfer_calldata(recipient, amount),
            chain_id,
        }
    }
}
