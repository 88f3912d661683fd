pub mod erc20;

pub use erc20::*;
