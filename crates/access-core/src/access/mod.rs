//! ============================================================================
//! Access Module - Subscription access resolution per wallet
//! ============================================================================
//! Decides whether the connected wallet holds an active subscription by
//! OR-merging two independent checks:
//!
//! ## Checks
//! - **Backend**: `POST {api_base}/verify-access` subscription record
//! - **Contract**: `hasAccess(address)` on the payment contract (optional)
//!
//! ## Usage
//! ```rust,ignore
//! use access_core::access::AccessResolver;
//!
//! let resolver = AccessResolver::from_config(&config)?;
//! let mut states = resolver.subscribe();
//! resolver.request(Some(address));
//! ```
//! ============================================================================

mod checker;
mod resolver;
mod types;

// Re-export public types
pub use checker::{
    parse_subscription_date, BackendAccessCheck, ContractAccessCheck, HttpBackendCheck,
    VerifyAccessResponse,
};
pub use resolver::AccessResolver;
pub use types::{AccessDetail, AccessSource, AccessState, AccessStatus, NO_SUBSCRIPTION_DETAIL};
