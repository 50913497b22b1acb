//! ============================================================================
//! Wallet Submitter - Payment submission & receipt watching
//! ============================================================================
//! Sends the payment through a wallet-backed JSON-RPC endpoint (the wallet
//! holds the key and prompts the user), then waits for the receipt:
//! - Signer error classification (user rejection vs payment rejection)
//! - Receipt polling at a fixed interval, bounded by a total timeout
//! ============================================================================

use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::B256;
use alloy::providers::{DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, WatchTxError};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::rpc::{self, RpcError};
use crate::payment::{ConfirmedTx, PaymentCall, TransactionSubmitter};
use crate::types::AccessError;

/// EIP-1193 "user rejected request" error code
const USER_REJECTED_CODE: i64 = 4001;

/// Configuration for receipt polling
#[derive(Debug, Clone)]
pub struct ConfirmConfig {
    /// Maximum number of receipt polls
    pub max_confirm_retries: u32,
    /// Interval between polls
    pub poll_interval_ms: u64,
}

impl ConfirmConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total time to wait for a receipt
    pub fn timeout(&self) -> Duration {
        self.poll_interval() * self.max_confirm_retries
    }
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            max_confirm_retries: 60,
            poll_interval_ms: 1000,
        }
    }
}

/// Map a signer/RPC failure onto the payment error taxonomy
pub fn classify_submit_error(error: &RpcError) -> AccessError {
    let message = match error {
        RpcError::Rpc { code, .. } if *code == USER_REJECTED_CODE => {
            return AccessError::UserRejected;
        }
        RpcError::Rpc { message, .. } => message,
        RpcError::Transport(message) | RpcError::Decode(message) => {
            return AccessError::Transport(message.clone());
        }
    };

    let lower = message.to_lowercase();

    if lower.contains("user rejected")
        || lower.contains("user denied")
        || lower.contains("rejected by user")
        || lower.contains("cancelled by user")
    {
        return AccessError::UserRejected;
    }

    if lower.contains("insufficient funds")
        || lower.contains("insufficient payment")
        || lower.contains("insufficient balance")
        || lower.contains("revert")
    {
        return AccessError::PaymentRejected(message.clone());
    }

    // Unknown node errors (rate limits, internal errors) are worth a manual retry
    AccessError::Transport(message.clone())
}

/// Transaction submitter backed by a wallet JSON-RPC endpoint
pub struct RpcSubmitter {
    provider: DynProvider,
    config: ConfirmConfig,
}

impl RpcSubmitter {
    /// Create a new submitter for the given signer endpoint
    pub fn new(signer_url: &str) -> Result<Self, AccessError> {
        let config = ConfirmConfig::default();
        Ok(Self {
            provider: rpc::connect(signer_url, config.poll_interval())?,
            config,
        })
    }
}

#[async_trait]
impl TransactionSubmitter for RpcSubmitter {
    async fn chain_id(&self) -> Result<u64, AccessError> {
        Ok(self.provider.get_chain_id().await.map_err(RpcError::from)?)
    }

    async fn submit(&self, call: &PaymentCall) -> Result<B256, AccessError> {
        let request = TransactionRequest::default()
            .with_from(call.payer)
            .with_to(call.contract)
            .with_value(call.price)
            .with_input(call.data.clone())
            .with_chain_id(call.chain_id);

        match self.provider.send_transaction(request).await {
            Ok(pending) => {
                let hash = *pending.tx_hash();
                info!("Payment transaction sent: {}", hash);
                Ok(hash)
            }
            Err(e) => {
                let error = RpcError::from(e);
                let classified = classify_submit_error(&error);
                warn!("Payment submission failed ({:?}): {}", classified, error);
                Err(classified)
            }
        }
    }

    async fn confirm(&self, tx_hash: B256) -> Result<ConfirmedTx, AccessError> {
        let timeout = self.config.timeout();
        info!("Waiting up to {:?} for confirmation of {}", timeout, tx_hash);

        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(1)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await;

        match receipt {
            Ok(receipt) if receipt.status() => {
                info!("Transaction confirmed: {}", tx_hash);
                Ok(ConfirmedTx {
                    tx_hash,
                    block_number: receipt.block_number(),
                })
            }
            Ok(_) => {
                warn!("Transaction reverted on-chain: {}", tx_hash);
                Err(AccessError::PaymentRejected(format!(
                    "Transaction {} reverted",
                    tx_hash
                )))
            }
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => {
                warn!("Confirmation timed out for {} after {:?}", tx_hash, timeout);
                Err(AccessError::Transport(format!(
                    "Transaction {} not confirmed after {:?}; it may still confirm",
                    tx_hash, timeout
                )))
            }
            Err(PendingTransactionError::TransportError(e)) => Err(RpcError::from(e).into()),
            Err(e) => Err(AccessError::Transport(format!(
                "Lost track of transaction {}: {}",
                tx_hash, e
            ))),
        }
    }
}
