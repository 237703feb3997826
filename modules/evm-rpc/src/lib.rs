//! Scan registry publishing over Ethereum JSON-RPC.
//!
//! Transactions are built, signed and broadcast locally (legacy EIP-155);
//! the node is only asked for chain state.

pub mod abi;
mod backend;
pub mod config;
pub mod rpc;
pub mod signer;
pub mod tx;

pub use backend::{Authorization, EvmBackend};
pub use config::EvmConfig;
pub use rpc::{HttpTransport, RpcError, RpcTransport};
