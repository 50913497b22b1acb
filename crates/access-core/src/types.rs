//! ============================================================================
//! Core Types for Weather Access
//! ============================================================================
//! Error taxonomy plus the result structs handed to the presentation layer:
//! payment receipts, contract statistics and weather conditions.
//! ============================================================================

use alloy::primitives::{utils::format_ether, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error types for access resolution, payments and weather fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AccessError {
    /// Missing address or configuration. Not retried; must be fixed by the operator.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The signer declined the request. Informational.
    #[error("Transaction was cancelled by user")]
    UserRejected,

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Access price unavailable from contract")]
    PriceUnavailable,

    /// Not a fault: the address simply has no active subscription.
    #[error("No active subscription")]
    NotSubscribed,
}

impl AccessError {
    /// Whether an explicit user retry can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::Transport(_) | AccessError::Timeout(_))
    }

    /// Whether this should be presented as an error (as opposed to an
    /// expected outcome like a cancelled signature or a missing subscription)
    pub fn is_user_facing_error(&self) -> bool {
        !matches!(self, AccessError::UserRejected | AccessError::NotSubscribed)
    }
}

/// Result of a confirmed `makePayment()` transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub tx_hash: B256,
    pub payer: Address,
    /// Value sent with the call, in wei
    pub price: U256,
    pub block_number: Option<u64>,
}

impl PaymentReceipt {
    pub fn price_formatted(&self) -> String {
        format_native(self.price)
    }
}

/// Aggregate payment statistics read from the contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStats {
    /// Sum of all payments, in wei
    pub total_payments: U256,
    pub payment_count: U256,
}

// ============================================================================
// Weather Types (WeatherAPI.com current.json)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location: WeatherLocation,
    pub current: WeatherConditions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    pub temp_c: f64,
    pub feelslike_c: f64,
    pub humidity: f64,
    pub pressure_mb: f64,
    pub wind_kph: f64,
    pub condition: WeatherCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub text: String,
    /// Protocol-relative icon URL as returned by the provider
    pub icon: String,
}

impl WeatherCondition {
    pub fn icon_url(&self) -> String {
        if self.icon.starts_with("//") {
            format!("https:{}", self.icon)
        } else {
            self.icon.clone()
        }
    }
}

// ============================================================================
// Display Helpers
// ============================================================================

/// Format a wei amount in whole native units (POL on Amoy)
pub fn format_native(wei: U256) -> String {
    format_ether(wei)
}

/// Shorten an address for display: `0x1234...abcd`
pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Shorten a transaction hash for display: first 10 and last 8 characters
pub fn short_hash(hash: &str) -> String {
    if hash.len() <= 18 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..10], &hash[hash.len() - 8..])
}
