//! ============================================================================
//! RPC Provider - alloy HTTP provider + error classification
//! ============================================================================
//! Contract reads and wallet submission share one provider setup:
//! - plain HTTP transport with a bounded request timeout
//! - no fillers (the wallet behind the signer endpoint fills and signs)
//! - node/wallet failures folded into RpcError for classification
//! ============================================================================

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::types::AccessError;

/// Default HTTP timeout for a single RPC round trip
const RPC_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors surfaced by the RPC layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object returned by the node or wallet
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("Failed to decode RPC response: {0}")]
    Decode(String),
}

impl From<RpcError> for AccessError {
    fn from(err: RpcError) -> Self {
        AccessError::Transport(err.to_string())
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ErrorResp(payload) => RpcError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
                data: payload.data.map(|data| data.get().to_string()),
            },
            TransportError::NullResp => RpcError::Decode("null response".into()),
            TransportError::DeserError { err, text } => {
                RpcError::Decode(format!("{} - body: {}", err, text))
            }
            other => RpcError::Transport(other.to_string()),
        }
    }
}

impl From<alloy::contract::Error> for RpcError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) => e.into(),
            // Undecodable or empty return data (e.g. no contract at the address)
            other => RpcError::Decode(other.to_string()),
        }
    }
}

/// HTTP provider for `url`, polling at `poll_interval` when watching transactions
pub fn connect(url: &str, poll_interval: Duration) -> Result<DynProvider, AccessError> {
    let parsed: Url = url
        .parse()
        .map_err(|e| AccessError::Configuration(format!("Invalid RPC URL '{}': {}", url, e)))?;

    let http = alloy::transports::http::reqwest::Client::builder()
        .timeout(RPC_HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| alloy::transports::http::reqwest::Client::new());

    let client = RpcClient::new(Http::with_client(http, parsed), false).with_poll_interval(poll_interval);

    debug!("RPC provider -> {}", url);

    Ok(ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_client(client)
        .erased())
}
