//! ============================================================================
//! Chain Module - EVM access for the payment contract
//! ============================================================================
//! - rpc: alloy HTTP provider setup + RPC error classification
//! - abi: contract interface bindings
//! - contract: on-chain access check + price/stats reads
//! - signer: wallet-backed transaction submission with receipt watching
//! ============================================================================

pub mod abi;
mod contract;
pub mod rpc;
mod signer;

pub use contract::RpcContract;
pub use rpc::RpcError;
pub use signer::{classify_submit_error, ConfirmConfig, RpcSubmitter};

/// Static description of an EVM chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: &'static str,
    pub rpc_url: &'static str,
    pub native_symbol: &'static str,
    pub explorer_url: &'static str,
}

impl ChainConfig {
    /// Explorer link for a transaction hash
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

/// Polygon Amoy testnet, where the payment contract is deployed
pub const POLYGON_AMOY: ChainConfig = ChainConfig {
    chain_id: 80002,
    name: "Polygon Amoy",
    rpc_url: "https://rpc-amoy.polygon.technology",
    native_symbol: "POL",
    explorer_url: "https://amoy.polygonscan.com",
};

/// Look up a known chain by id
pub fn chain_by_id(chain_id: u64) -> Option<ChainConfig> {
    match chain_id {
        80002 => Some(POLYGON_AMOY),
        _ => None,
    }
}
