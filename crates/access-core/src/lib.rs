//! ============================================================================
//! ACCESS-CORE: Subscription access for the weather service
//! ============================================================================
//! This crate handles all backend logic for Weather Access:
//! - Access resolution merging the backend record and the on-chain contract
//! - Subscription payments via makePayment() on Polygon Amoy
//! - Wallet address-change tracking
//! - Weather fetches gated on an active subscription
//! ============================================================================

pub mod access;
pub mod chain;
pub mod config;
pub mod payment;
pub mod types;
pub mod wallet;
pub mod weather;

// Re-export main types for convenience
pub use types::*;
pub use access::{AccessResolver, AccessState, AccessStatus};
pub use config::AccessConfig;
pub use payment::PaymentInitiator;
pub use wallet::{spawn_address_watcher, ChannelWallet, WalletSource};
pub use weather::WeatherClient;

#[cfg(test)]
pub(crate) mod test_support;
