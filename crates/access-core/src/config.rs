//! ============================================================================
//! Access Config - Environment-driven configuration
//! ============================================================================
//! Recognized variables: API_BASE, CONTRACT_ADDRESS, RPC_URL, SIGNER_URL,
//! CHAIN_ID, WEATHER_API_KEY, WALLET_CLIENT_ID, ACCESS_CHECK_TIMEOUT_SECS.
//! An absent CONTRACT_ADDRESS disables contract checks; an absent
//! WEATHER_API_KEY makes weather fetches report a configuration message.
//! ============================================================================

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::chain::POLYGON_AMOY;
use crate::types::AccessError;

/// Default backend base URL (local payment server)
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Default per-check timeout in seconds
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration for resolver, payment and weather clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub api_base: String,
    pub contract_address: Option<Address>,
    pub rpc_url: String,
    /// Wallet-backed endpoint that signs `eth_sendTransaction` requests
    pub signer_url: String,
    pub chain_id: u64,
    pub weather_api_key: Option<String>,
    pub wallet_client_id: Option<String>,
    pub check_timeout_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            contract_address: None,
            rpc_url: POLYGON_AMOY.rpc_url.to_string(),
            signer_url: POLYGON_AMOY.rpc_url.to_string(),
            chain_id: POLYGON_AMOY.chain_id,
            weather_api_key: None,
            wallet_client_id: None,
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
        }
    }
}

impl AccessConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, AccessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit key/value map
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, AccessError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AccessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty strings are treated the same as unset
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let api_base = get("API_BASE").unwrap_or(defaults.api_base);
        validate_url("API_BASE", &api_base)?;

        let rpc_url = get("RPC_URL").unwrap_or(defaults.rpc_url);
        validate_url("RPC_URL", &rpc_url)?;

        let signer_url = get("SIGNER_URL").unwrap_or_else(|| rpc_url.clone());
        validate_url("SIGNER_URL", &signer_url)?;

        let contract_address = get("CONTRACT_ADDRESS")
            .map(|raw| {
                Address::from_str(&raw).map_err(|e| {
                    AccessError::Configuration(format!("Invalid CONTRACT_ADDRESS '{}': {}", raw, e))
                })
            })
            .transpose()?;

        let chain_id = parse_u64("CHAIN_ID", get("CHAIN_ID"))?.unwrap_or(defaults.chain_id);
        let check_timeout_secs = parse_u64("ACCESS_CHECK_TIMEOUT_SECS", get("ACCESS_CHECK_TIMEOUT_SECS"))?
            .unwrap_or(defaults.check_timeout_secs);

        if check_timeout_secs == 0 {
            return Err(AccessError::Configuration(
                "ACCESS_CHECK_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            contract_address,
            rpc_url,
            signer_url,
            chain_id,
            weather_api_key: get("WEATHER_API_KEY"),
            wallet_client_id: get("WALLET_CLIENT_ID"),
            check_timeout_secs,
        })
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    /// Whether contract-based checks and payments are available
    pub fn contract_configured(&self) -> bool {
        self.contract_address.is_some()
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), AccessError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| AccessError::Configuration(format!("Invalid {} '{}': {}", key, value, e)))
}

fn parse_u64(key: &str, value: Option<String>) -> Result<Option<u64>, AccessError> {
    value
        .map(|raw| {
            raw.parse::<u64>().map_err(|e| {
                AccessError::Configuration(format!("Invalid {} '{}': {}", key, raw, e))
            })
        })
        .transpose()
}
