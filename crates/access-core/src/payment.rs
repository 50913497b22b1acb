//! ============================================================================
//! Payment Initiator - Subscription purchase flow
//! ============================================================================
//! Reads the live access price, submits `makePayment()` with exactly that
//! value, waits for the receipt and then asks the resolver to re-check the
//! payer if the payer is still the current address. The published
//! AccessState is only ever written by the resolver.
//!
//! Flow: config checks -> price read -> chain id check -> submit -> confirm
//! -> re-resolve
//! ============================================================================

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{AccessResolver, ContractAccessCheck};
use crate::chain::{abi, RpcSubmitter};
use crate::config::AccessConfig;
use crate::types::{format_native, AccessError, PaymentReceipt};

/// A fully priced `makePayment()` call, ready for the signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCall {
    pub contract: Address,
    pub payer: Address,
    /// Value attached to the call, in wei
    pub price: U256,
    pub data: Bytes,
    pub chain_id: u64,
}

/// A mined, successful transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedTx {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Signs and broadcasts transactions on behalf of the connected wallet
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Chain the signer is currently connected to
    async fn chain_id(&self) -> Result<u64, AccessError>;

    async fn submit(&self, call: &PaymentCall) -> Result<B256, AccessError>;

    /// Wait until the transaction is mined; a reverted receipt is a `PaymentRejected`
    async fn confirm(&self, tx_hash: B256) -> Result<ConfirmedTx, AccessError>;
}

/// Purchases a subscription for the connected wallet
pub struct PaymentInitiator {
    contract: Option<Arc<dyn ContractAccessCheck>>,
    submitter: Arc<dyn TransactionSubmitter>,
    resolver: AccessResolver,
    chain_id: u64,
}

impl PaymentInitiator {
    pub fn new(
        contract: Option<Arc<dyn ContractAccessCheck>>,
        submitter: Arc<dyn TransactionSubmitter>,
        resolver: AccessResolver,
        chain_id: u64,
    ) -> Self {
        Self {
            contract,
            submitter,
            resolver,
            chain_id,
        }
    }

    /// Share the resolver's contract and submit through the configured signer
    pub fn from_config(config: &AccessConfig, resolver: AccessResolver) -> Result<Self, AccessError> {
        let submitter: Arc<dyn TransactionSubmitter> = Arc::new(RpcSubmitter::new(&config.signer_url)?);
        Ok(Self::new(resolver.contract(), submitter, resolver, config.chain_id))
    }

    /// Pay for access from `payer` and re-resolve once the payment is mined
    pub async fn subscribe(&self, payer: Option<Address>) -> Result<PaymentReceipt, AccessError> {
        let payer = payer.ok_or_else(|| AccessError::Configuration("no wallet connected".into()))?;
        let contract = self
            .contract
            .as_ref()
            .ok_or_else(|| AccessError::Configuration("no contract configured".into()))?;

        let price = contract.access_price().await?;
        if price.is_zero() {
            warn!("Contract {} reported a zero access price", contract.contract_address());
            return Err(AccessError::PriceUnavailable);
        }

        let signer_chain = self.submitter.chain_id().await?;
        if signer_chain != self.chain_id {
            return Err(AccessError::Configuration(format!(
                "Signer is on chain {} but the contract is on chain {}",
                signer_chain, self.chain_id
            )));
        }

        info!(
            "Subscribing {} for {} on contract {}",
            payer,
            format_native(price),
            contract.contract_address()
        );

        let call = PaymentCall {
            contract: contract.contract_address(),
            payer,
            price,
            data: abi::encode_make_payment(),
            chain_id: self.chain_id,
        };

        let tx_hash = self.submitter.submit(&call).await?;
        let confirmed = self.submitter.confirm(tx_hash).await?;

        info!("Payment confirmed for {}: {}", payer, confirmed.tx_hash);

        // The receipt stands on its own; a wallet that moved on keeps its state
        if self.resolver.refresh_if_current(payer).await.is_none() {
            info!("{} is no longer the current address, access not refreshed", payer);
        }

        Ok(PaymentReceipt {
            tx_hash: confirmed.tx_hash,
            payer,
            price,
            block_number: confirmed.block_number,
        })
    }
}
