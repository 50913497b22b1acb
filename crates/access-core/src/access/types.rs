//! ============================================================================
//! Access Types - Resolved subscription state per wallet address
//! ============================================================================
//! AccessState is replaced wholesale on every resolution and always carries
//! the address it was computed for.
//! ============================================================================

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checker::VerifyAccessResponse;
use crate::types::AccessError;

/// Detail used when no check supplied a reason for a negative verdict
pub const NO_SUBSCRIPTION_DETAIL: &str = "No active subscription found";

/// Subscription status for the connected wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// No wallet connected
    #[default]
    NotConnected,
    /// At least one check is outstanding
    Checking,
    Active,
    /// All enabled checks completed and none granted access
    Inactive,
    /// A check failed before any granted access; retryable
    Error,
}

impl AccessStatus {
    /// Get human-readable status name
    pub fn display_name(&self) -> &'static str {
        match self {
            AccessStatus::NotConnected => "Not Connected",
            AccessStatus::Checking => "Checking",
            AccessStatus::Active => "Subscription Active",
            AccessStatus::Inactive => "No Active Subscription",
            AccessStatus::Error => "Error",
        }
    }

    /// Whether this is a settled verdict (not waiting on any check)
    pub fn is_settled(&self) -> bool {
        !matches!(self, AccessStatus::Checking)
    }
}

/// Which check produced an Active/Inactive verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSource {
    /// Off-chain subscription record
    Backend,
    /// On-chain `hasAccess`
    Contract,
    Both,
}

/// Optional supporting detail for a verdict
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDetail {
    pub reason: Option<String>,
    pub tx_hash: Option<String>,
    pub active_since: Option<DateTime<Utc>>,
    pub payment_amount: Option<String>,
}

impl AccessDetail {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Detail carried over from a positive backend record
    pub fn from_backend(response: &VerifyAccessResponse) -> Self {
        Self {
            reason: response.message.clone(),
            tx_hash: response.tx_hash.clone(),
            active_since: response.active_since(),
            payment_amount: response.payment_amount.clone(),
        }
    }
}

/// Resolved access state for one address at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessState {
    /// Address this state was computed for; `None` only when not connected
    pub address: Option<Address>,
    pub status: AccessStatus,
    pub source: Option<AccessSource>,
    pub detail: AccessDetail,
    /// Failure behind an `Error` status
    pub error: Option<AccessError>,
    pub checked_at: DateTime<Utc>,
}

impl Default for AccessState {
    fn default() -> Self {
        Self::not_connected()
    }
}

impl AccessState {
    pub fn not_connected() -> Self {
        Self::build(None, AccessStatus::NotConnected, None, AccessDetail::default(), None)
    }

    pub fn checking(address: Address) -> Self {
        Self::build(Some(address), AccessStatus::Checking, None, AccessDetail::default(), None)
    }

    pub fn active(address: Address, source: AccessSource, detail: AccessDetail) -> Self {
        Self::build(Some(address), AccessStatus::Active, Some(source), detail, None)
    }

    pub fn inactive(address: Address, source: AccessSource, reason: impl Into<String>) -> Self {
        Self::build(
            Some(address),
            AccessStatus::Inactive,
            Some(source),
            AccessDetail::with_reason(reason),
            None,
        )
    }

    pub fn error(address: Address, error: AccessError) -> Self {
        Self::build(
            Some(address),
            AccessStatus::Error,
            None,
            AccessDetail::with_reason(error.to_string()),
            Some(error),
        )
    }

    fn build(
        address: Option<Address>,
        status: AccessStatus,
        source: Option<AccessSource>,
        detail: AccessDetail,
        error: Option<AccessError>,
    ) -> Self {
        Self {
            address,
            status,
            source,
            detail,
            error,
            checked_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccessStatus::Active
    }

    /// Error and Inactive states offer an explicit re-check
    pub fn can_retry(&self) -> bool {
        self.address.is_some()
            && matches!(self.status, AccessStatus::Error | AccessStatus::Inactive)
    }

    /// Whether this state describes the given address
    pub fn is_for(&self, address: Option<Address>) -> bool {
        self.address == address
    }
}
