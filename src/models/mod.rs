pub mod amount;
pub mod payment;
pub mod receipt;
pub mod status;

pub use amount::*;
pub use payment::*;
pub use receipt::*;
pub use status::*;
