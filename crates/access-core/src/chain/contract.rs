//! ============================================================================
//! Payment Contract Reader - On-chain access verification
//! ============================================================================
//! Reads access state, price and payment statistics from the deployed
//! payment contract through the generated contract instance.
//! ============================================================================

use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::abi::IWeatherAccess::{self, IWeatherAccessInstance};
use super::rpc::{self, RpcError};
use crate::access::ContractAccessCheck;
use crate::types::{AccessError, ContractStats};

/// Reads never watch transactions; the interval only matters for the signer
const READ_POLL_INTERVAL: Duration = Duration::from_secs(7);

/// Contract reader bound to one deployed payment contract
pub struct RpcContract {
    instance: IWeatherAccessInstance<DynProvider>,
}

impl RpcContract {
    /// Create a reader for the contract at `address` on the given RPC endpoint
    pub fn new(rpc_url: &str, address: Address) -> Result<Self, AccessError> {
        let provider = rpc::connect(rpc_url, READ_POLL_INTERVAL)?;
        Ok(Self::with_provider(provider, address))
    }

    fn with_provider(provider: DynProvider, address: Address) -> Self {
        Self {
            instance: IWeatherAccess::new(address, provider),
        }
    }

    /// `checkAccess(address)`, the contract's alternative access view
    pub async fn check_access(&self, user: Address) -> Result<bool, RpcError> {
        Ok(self.instance.checkAccess(user).call().await?)
    }

    async fn get_access_price(&self) -> Result<U256, RpcError> {
        Ok(self.instance.getAccessPrice().call().await?)
    }

    async fn public_access_price(&self) -> Result<U256, RpcError> {
        Ok(self.instance.accessPrice().call().await?)
    }

    async fn total_payments(&self) -> Result<U256, RpcError> {
        Ok(self.instance.getTotalPayments().call().await?)
    }

    async fn payment_count(&self) -> Result<U256, RpcError> {
        Ok(self.instance.getPaymentCount().call().await?)
    }
}

#[async_trait]
impl ContractAccessCheck for RpcContract {
    fn contract_address(&self) -> Address {
        *self.instance.address()
    }

    async fn has_access(&self, user: Address) -> Result<bool, AccessError> {
        debug!("Checking hasAccess({}) on contract {}", user, self.instance.address());

        let has_access = self
            .instance
            .hasAccess(user)
            .call()
            .await
            .map_err(RpcError::from)?;

        debug!("hasAccess({}) = {}", user, has_access);
        Ok(has_access)
    }

    async fn access_price(&self) -> Result<U256, AccessError> {
        match self.get_access_price().await {
            Ok(price) => Ok(price),
            Err(RpcError::Transport(e)) => Err(AccessError::Transport(e)),
            Err(e) => {
                // Older deployments only expose the public getter
                warn!("getAccessPrice() failed ({}), falling back to accessPrice()", e);
                Ok(self.public_access_price().await?)
            }
        }
    }

    async fn stats(&self) -> Result<ContractStats, AccessError> {
        let (total_payments, payment_count) =
            tokio::try_join!(self.total_payments(), self.payment_count())?;

        Ok(ContractStats {
            total_payments,
            payment_count,
        })
    }
}
