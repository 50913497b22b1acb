//! ============================================================================
//! Access Checks - Backend subscription record + on-chain contract
//! ============================================================================
//! The two independent sources of truth the resolver merges:
//! - BackendAccessCheck: POST /verify-access on the subscription backend
//! - ContractAccessCheck: hasAccess/getAccessPrice/stats on the contract
//! ============================================================================

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{AccessError, ContractStats};

/// HTTP timeout for backend requests
const BACKEND_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Off-chain subscription check
#[async_trait]
pub trait BackendAccessCheck: Send + Sync {
    async fn verify_access(&self, address: Address) -> Result<VerifyAccessResponse, AccessError>;
}

/// On-chain reads against one configured payment contract
#[async_trait]
pub trait ContractAccessCheck: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn has_access(&self, user: Address) -> Result<bool, AccessError>;

    /// Current access price in wei
    async fn access_price(&self) -> Result<U256, AccessError>;

    async fn stats(&self) -> Result<ContractStats, AccessError>;
}

#[derive(Debug, Serialize)]
struct VerifyAccessRequest {
    wallet_address: String,
}

/// Body of a `/verify-access` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyAccessResponse {
    pub has_access: bool,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub subscription_date: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VerifyAccessResponse {
    /// Parsed `subscription_date`, if present and well-formed
    pub fn active_since(&self) -> Option<DateTime<Utc>> {
        self.subscription_date
            .as_deref()
            .and_then(parse_subscription_date)
    }

    /// Backend message, ignoring blanks
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// Accepts RFC 3339 or a naive ISO 8601 timestamp (taken as UTC)
pub fn parse_subscription_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Backend check over HTTP
pub struct HttpBackendCheck {
    client: reqwest::Client,
    api_base: String,
}

impl HttpBackendCheck {
    /// Create a new backend check against the given base URL
    pub fn new(api_base: &str) -> Self {
        Self::with_timeout(api_base, BACKEND_HTTP_TIMEOUT)
    }

    /// Create with a custom HTTP timeout
    pub fn with_timeout(api_base: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn verify_url(&self) -> String {
        format!("{}/verify-access", self.api_base)
    }
}

#[async_trait]
impl BackendAccessCheck for HttpBackendCheck {
    async fn verify_access(&self, address: Address) -> Result<VerifyAccessResponse, AccessError> {
        debug!("Verifying backend access for {}", address);

        let request = VerifyAccessRequest {
            wallet_address: address.to_string(),
        };

        let response = self
            .client
            .post(self.verify_url())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AccessError::Transport(format!("Failed to verify subscription: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AccessError::Transport(format!("Failed to read backend response: {}", e)))?;

        if !status.is_success() {
            return Err(AccessError::Transport(format!(
                "Backend error {}: {}",
                status, body
            )));
        }

        let verdict: VerifyAccessResponse = serde_json::from_str(&body).map_err(|e| {
            AccessError::Transport(format!("Failed to parse backend response: {} - body: {}", e, body))
        })?;

        ensure_same_wallet(address, &verdict)?;

        debug!("Backend access for {}: {}", address, verdict.has_access);
        Ok(verdict)
    }
}

/// Reject a response the backend produced for some other wallet
fn ensure_same_wallet(address: Address, verdict: &VerifyAccessResponse) -> Result<(), AccessError> {
    let Some(echoed) = verdict.wallet_address.as_deref() else {
        return Ok(());
    };

    match Address::from_str(echoed) {
        Ok(echoed) if echoed == address => Ok(()),
        Ok(echoed) => {
            warn!("Backend answered for {} while checking {}", echoed, address);
            Err(AccessError::Transport(format!(
                "Backend answered for a different wallet ({})",
                echoed
            )))
        }
        // Unparseable echo is informational only
        Err(_) => Ok(()),
    }
}
