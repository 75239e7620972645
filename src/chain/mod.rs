pub mod anchor;
pub mod client;
pub mod monitor;

pub use anchor::ChainAnchorService;
pub use client::{ChainClient, ExtrinsicOutcome, RpcChainClient};
pub use monitor::TransactionMonitor;
