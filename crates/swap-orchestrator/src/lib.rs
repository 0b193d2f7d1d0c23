//! Maker and taker negotiation/settlement orchestrators (C8/C9).
//!
//! Everything here is generic over the capability traits in [`transport`],
//! [`ln`], and [`oracle`] — no concrete sidechannel, Lightning node, or
//! price feed ships in this crate (§1/§6). `swapd` wires concrete
//! implementations in.

pub mod config;
pub mod error;
mod ids;
pub mod ln;
pub mod maker;
pub mod oracle;
pub mod pricing;
mod sign;
pub mod taker;
pub mod transport;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use ln::{LnInvoiceResult, LnRpc, LnRpcError};
pub use maker::MakerOrchestrator;
pub use oracle::{PriceOracle, PriceOracleError};
pub use taker::TakerOrchestrator;
pub use transport::{Sidechannel, SidechannelMessage, TransportError};
