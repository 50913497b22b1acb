//! ============================================================================
//! Wallet Source - Connected account & address-change events
//! ============================================================================
//! The wallet is passed in explicitly; there is no global wallet state.
//! `spawn_address_watcher` turns address changes into ordered resolver
//! requests so that the latest address always wins.
//! ============================================================================

use alloy::primitives::Address;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::access::AccessResolver;

/// Capacity of the address-change channel
const WALLET_EVENT_CAPACITY: usize = 16;

/// Supplies the connected account and notifies on changes
pub trait WalletSource: Send + Sync {
    fn current_address(&self) -> Option<Address>;

    /// Stream of address changes; `None` means disconnected
    fn subscribe(&self) -> broadcast::Receiver<Option<Address>>;
}

/// In-process wallet driven by explicit connect/switch/disconnect calls
pub struct ChannelWallet {
    current: RwLock<Option<Address>>,
    events: broadcast::Sender<Option<Address>>,
}

impl ChannelWallet {
    pub fn new(initial: Option<Address>) -> Self {
        let (events, _) = broadcast::channel(WALLET_EVENT_CAPACITY);
        Self {
            current: RwLock::new(initial),
            events,
        }
    }

    pub fn connect(&self, address: Address) {
        self.set(Some(address));
    }

    /// Switch to another account (same as connecting it)
    pub fn switch(&self, address: Address) {
        self.set(Some(address));
    }

    pub fn disconnect(&self) {
        self.set(None);
    }

    fn set(&self, address: Option<Address>) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = address;
        // No receivers is fine; the watcher may not be running yet
        let _ = self.events.send(address);
    }
}

impl Default for ChannelWallet {
    fn default() -> Self {
        Self::new(None)
    }
}

impl WalletSource for ChannelWallet {
    fn current_address(&self) -> Option<Address> {
        *self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<Address>> {
        self.events.subscribe()
    }
}

/// Resolve the current address, then re-resolve on every change, in order.
///
/// Unchanged addresses are skipped. If events are missed the watcher drops the
/// backlog and jumps to the wallet's current address. Ends when the wallet's
/// event channel closes.
pub fn spawn_address_watcher(
    wallet: Arc<dyn WalletSource>,
    resolver: AccessResolver,
) -> JoinHandle<()> {
    // Subscribe before reading the current address so no change is lost
    let mut events = wallet.subscribe();
    let mut last = wallet.current_address();
    resolver.request(last);

    // The wallet owns the event sender; holding it here would keep the channel open
    let wallet = Arc::downgrade(&wallet);

    tokio::spawn(async move {
        info!("Address watcher started ({:?})", last);

        loop {
            let next = match events.recv().await {
                Ok(address) => address,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Address watcher skipped {} wallet events", skipped);
                    // Retained events are older than the current address
                    events = events.resubscribe();
                    match wallet.upgrade() {
                        Some(wallet) => wallet.current_address(),
                        None => break,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if next == last {
                debug!("Wallet address unchanged ({:?}), skipping", next);
                continue;
            }

            info!("Wallet address changed: {:?} -> {:?}", last, next);
            last = next;
            resolver.request(next);
        }

        info!("Address watcher stopped");
    })
}
