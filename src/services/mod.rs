pub mod ethereum;
pub mod recorder;
pub mod relay;

pub use ethereum::{BlockCallback, ChainReader, ChainReaderOptions, RpcChainReader, Subscription};
pub use recorder::{HttpTipRecorder, TipRecorder};
pub use relay::{HttpRelayClient, PaymentRelay, RelayTransfer};
