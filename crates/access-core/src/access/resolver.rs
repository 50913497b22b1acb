//! ============================================================================
//! Access Resolver - Single writer of the published AccessState
//! ============================================================================
//! Fans out to the backend and (when configured) contract checks, OR-merges
//! their verdicts and publishes one AccessState. Every resolution carries a
//! generation number; only the latest requested generation may publish.
//! ============================================================================

use alloy::primitives::Address;
use futures_util::future::OptionFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::checker::{BackendAccessCheck, ContractAccessCheck, HttpBackendCheck, VerifyAccessResponse};
use super::types::{AccessDetail, AccessSource, AccessState, NO_SUBSCRIPTION_DETAIL};
use crate::chain::RpcContract;
use crate::config::AccessConfig;
use crate::types::AccessError;

/// Handle for one requested resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    address: Option<Address>,
}

struct ResolverInner {
    backend: Arc<dyn BackendAccessCheck>,
    contract: Option<Arc<dyn ContractAccessCheck>>,
    check_timeout: Duration,
    /// Latest issued generation; held while publishing
    generation: Mutex<u64>,
    state_tx: watch::Sender<AccessState>,
}

/// Resolves and publishes access state for the connected wallet
#[derive(Clone)]
pub struct AccessResolver {
    inner: Arc<ResolverInner>,
}

impl AccessResolver {
    /// Create a resolver from explicit check implementations
    pub fn new(
        backend: Arc<dyn BackendAccessCheck>,
        contract: Option<Arc<dyn ContractAccessCheck>>,
        check_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(AccessState::not_connected());

        Self {
            inner: Arc::new(ResolverInner {
                backend,
                contract,
                check_timeout,
                generation: Mutex::new(0),
                state_tx,
            }),
        }
    }

    /// Create a resolver with the HTTP backend and, if configured, the RPC contract
    pub fn from_config(config: &AccessConfig) -> Result<Self, AccessError> {
        let backend: Arc<dyn BackendAccessCheck> = Arc::new(HttpBackendCheck::new(&config.api_base));
        let contract = match config.contract_address {
            Some(address) => {
                let contract = RpcContract::new(&config.rpc_url, address)?;
                Some(Arc::new(contract) as Arc<dyn ContractAccessCheck>)
            }
            None => {
                info!("No contract configured - contract access checks disabled");
                None
            }
        };

        Ok(Self::new(backend, contract, config.check_timeout()))
    }

    /// The configured contract, shared with payment and stats readers
    pub fn contract(&self) -> Option<Arc<dyn ContractAccessCheck>> {
        self.inner.contract.clone()
    }

    /// Snapshot of the currently published state
    pub fn state(&self) -> AccessState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receiver notified on every published state
    pub fn subscribe(&self) -> watch::Receiver<AccessState> {
        self.inner.state_tx.subscribe()
    }

    /// Resolve access for `address`, superseding any resolution in flight.
    ///
    /// `NotConnected` / `Checking` is published before the first await.
    /// Returns the final state if it was published, or `None` if a newer
    /// request superseded this one.
    pub async fn resolve(&self, address: Option<Address>) -> Option<AccessState> {
        let ticket = self.begin(address);
        self.complete(ticket).await
    }

    /// Like [`resolve`](Self::resolve), but runs the checks on a spawned task.
    /// The request is ordered (and `Checking` published) before this returns.
    pub fn request(&self, address: Option<Address>) -> JoinHandle<Option<AccessState>> {
        let ticket = self.begin(address);
        let resolver = self.clone();
        tokio::spawn(async move { resolver.complete(ticket).await })
    }

    /// Re-resolve the address of the current state
    pub async fn retry(&self) -> Option<AccessState> {
        let address = self.state().address;
        info!("Retrying access resolution for {:?}", address);
        self.resolve(address).await
    }

    /// Re-resolve `address` only while it is still the current subject.
    ///
    /// Returns `None` without publishing if the published state belongs to
    /// another address (the wallet moved on), or if superseded mid-flight.
    pub async fn refresh_if_current(&self, address: Address) -> Option<AccessState> {
        let ticket = {
            let mut generation = self.lock_generation();
            let is_current = self.inner.state_tx.borrow().is_for(Some(address));
            if !is_current {
                debug!("Skipping refresh for {}: no longer the current address", address);
                return None;
            }
            self.issue(&mut generation, Some(address))
        };
        self.complete(ticket).await
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.inner
            .generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issue a new generation and publish its initial state
    fn begin(&self, address: Option<Address>) -> Ticket {
        let mut generation = self.lock_generation();
        self.issue(&mut generation, address)
    }

    /// Bump the generation (lock held) and publish the initial state for `address`
    fn issue(&self, generation: &mut u64, address: Option<Address>) -> Ticket {
        *generation += 1;

        let initial = match address {
            Some(address) => AccessState::checking(address),
            None => AccessState::not_connected(),
        };
        self.inner.state_tx.send_replace(initial);

        debug!("Resolution #{} requested for {:?}", *generation, address);

        Ticket {
            generation: *generation,
            address,
        }
    }

    async fn complete(&self, ticket: Ticket) -> Option<AccessState> {
        let Some(address) = ticket.address else {
            // NotConnected was published by begin(); report it only if still current
            let generation = self.lock_generation();
            return (*generation == ticket.generation).then(|| self.state());
        };

        let state = self.run_checks(address).await;

        if self.publish_if_current(ticket, state.clone()) {
            info!(
                "Access for {}: {} ({:?})",
                address,
                state.status.display_name(),
                state.source
            );
            Some(state)
        } else {
            debug!(
                "Discarding stale resolution #{} for {}",
                ticket.generation, address
            );
            None
        }
    }

    fn publish_if_current(&self, ticket: Ticket, state: AccessState) -> bool {
        let generation = self.lock_generation();

        if *generation != ticket.generation {
            return false;
        }

        self.inner.state_tx.send_replace(state);
        true
    }

    async fn run_checks(&self, address: Address) -> AccessState {
        let timeout = self.inner.check_timeout;

        let backend = Arc::clone(&self.inner.backend);
        let backend_check = bounded(timeout, async move { backend.verify_access(address).await });

        let contract_check: OptionFuture<_> = self
            .inner
            .contract
            .clone()
            .map(|contract| bounded(timeout, async move { contract.has_access(address).await }))
            .into();

        let (backend_result, contract_result) = tokio::join!(backend_check, contract_check);

        if let Err(e) = &backend_result {
            warn!("Backend access check failed for {}: {}", address, e);
        }
        if let Some(Err(e)) = &contract_result {
            warn!("Contract access check failed for {}: {}", address, e);
        }

        merge_verdicts(address, backend_result, contract_result)
    }
}

/// Apply the per-check timeout, mapping expiry to `AccessError::Timeout`
async fn bounded<T, F>(timeout: Duration, check: F) -> Result<T, AccessError>
where
    F: Future<Output = Result<T, AccessError>>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(result) => result,
        Err(_) => Err(AccessError::Timeout(timeout)),
    }
}

/// OR-merge of the backend verdict and the optional contract verdict.
///
/// Any `true` wins. Without a `true`, any failure yields `Error`; only when
/// every issued check answered `false` is the address `Inactive`.
fn merge_verdicts(
    address: Address,
    backend: Result<VerifyAccessResponse, AccessError>,
    contract: Option<Result<bool, AccessError>>,
) -> AccessState {
    let backend_granted = matches!(&backend, Ok(response) if response.has_access);
    let contract_granted = matches!(&contract, Some(Ok(true)));

    if backend_granted || contract_granted {
        let source = match (backend_granted, contract_granted) {
            (true, true) => AccessSource::Both,
            (true, false) => AccessSource::Backend,
            _ => AccessSource::Contract,
        };
        let detail = match &backend {
            Ok(response) if response.has_access => AccessDetail::from_backend(response),
            _ => AccessDetail::default(),
        };
        return AccessState::active(address, source, detail);
    }

    let response = match backend {
        Ok(response) => response,
        Err(e) => return AccessState::error(address, e),
    };

    let source = match contract {
        Some(Err(e)) => return AccessState::error(address, e),
        Some(Ok(_)) => AccessSource::Both,
        None => AccessSource::Backend,
    };

    let reason = response.message().unwrap_or(NO_SUBSCRIPTION_DETAIL).to_string();
    AccessState::inactive(address, source, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::types::AccessStatus;
    use crate::types::ContractStats;
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const TIMEOUT: Duration = Duration::from_secs(5);

    enum Reply {
        Respond(VerifyAccessResponse),
        Fail(AccessError),
        Hang,
    }

    /// Scripted backend: per-address reply, optionally held until released
    struct FakeBackend {
        replies: HashMap<Address, Reply>,
        gates: HashMap<Address, Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                replies: HashMap::new(),
                gates: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn reply(mut self, address: Address, reply: Reply) -> Self {
            self.replies.insert(address, reply);
            self
        }

        fn gated(mut self, address: Address, gate: Arc<Notify>) -> Self {
            self.gates.insert(address, gate);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendAccessCheck for FakeBackend {
        async fn verify_access(&self, address: Address) -> Result<VerifyAccessResponse, AccessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.gates.get(&address) {
                gate.notified().await;
            }
            match self.replies.get(&address) {
                Some(Reply::Respond(response)) => Ok(response.clone()),
                Some(Reply::Fail(e)) => Err(e.clone()),
                Some(Reply::Hang) => std::future::pending().await,
                None => Ok(VerifyAccessResponse::default()),
            }
        }
    }

    struct FakeContract {
        granted: Result<bool, AccessError>,
        calls: AtomicUsize,
    }

    impl FakeContract {
        fn new(granted: Result<bool, AccessError>) -> Self {
            Self {
                granted,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContractAccessCheck for FakeContract {
        fn contract_address(&self) -> Address {
            Address::repeat_byte(0xcc)
        }

        async fn has_access(&self, _user: Address) -> Result<bool, AccessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.granted.clone()
        }

        async fn access_price(&self) -> Result<U256, AccessError> {
            Ok(U256::from(1u64))
        }

        async fn stats(&self) -> Result<ContractStats, AccessError> {
            Ok(ContractStats::default())
        }
    }

    fn granted() -> Reply {
        Reply::Respond(VerifyAccessResponse {
            has_access: true,
            tx_hash: Some("0xfeed".into()),
            subscription_date: Some("2025-01-02T03:04:05".into()),
            ..Default::default()
        })
    }

    fn denied(message: Option<&str>) -> Reply {
        Reply::Respond(VerifyAccessResponse {
            has_access: false,
            message: message.map(str::to_string),
            ..Default::default()
        })
    }

    fn resolver(backend: Arc<FakeBackend>, contract: Option<Arc<FakeContract>>) -> AccessResolver {
        AccessResolver::new(
            backend,
            contract.map(|c| c as Arc<dyn ContractAccessCheck>),
            TIMEOUT,
        )
    }

    #[tokio::test]
    async fn test_no_address_is_not_connected_without_network() {
        let backend = Arc::new(FakeBackend::new());
        let contract = Arc::new(FakeContract::new(Ok(true)));
        let resolver = resolver(backend.clone(), Some(contract.clone()));

        let handle = resolver.request(None);
        // Published before any await
        assert_eq!(resolver.state().status, AccessStatus::NotConnected);

        let state = handle.await.unwrap().unwrap();
        assert_eq!(state.status, AccessStatus::NotConnected);
        assert_eq!(backend.calls(), 0);
        assert_eq!(contract.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_true_without_contract_is_active() {
        let address = Address::repeat_byte(0x01);
        let backend = Arc::new(FakeBackend::new().reply(address, granted()));
        let resolver = resolver(backend, None);

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Active);
        assert_eq!(state.source, Some(AccessSource::Backend));
        assert_eq!(state.detail.tx_hash.as_deref(), Some("0xfeed"));
        assert!(state.detail.active_since.is_some());
        assert_eq!(resolver.state(), state);
    }

    #[tokio::test]
    async fn test_contract_true_overrides_backend_false() {
        let address = Address::repeat_byte(0x02);
        let backend = Arc::new(FakeBackend::new().reply(address, denied(None)));
        let contract = Arc::new(FakeContract::new(Ok(true)));
        let resolver = resolver(backend, Some(contract));

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Active);
        assert_eq!(state.source, Some(AccessSource::Contract));
    }

    #[tokio::test]
    async fn test_both_true_is_both() {
        let address = Address::repeat_byte(0x03);
        let backend = Arc::new(FakeBackend::new().reply(address, granted()));
        let contract = Arc::new(FakeContract::new(Ok(true)));
        let resolver = resolver(backend, Some(contract));

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.source, Some(AccessSource::Both));
    }

    #[tokio::test]
    async fn test_both_false_is_inactive_with_detail() {
        let address = Address::repeat_byte(0x04);
        let backend = Arc::new(FakeBackend::new().reply(address, denied(None)));
        let contract = Arc::new(FakeContract::new(Ok(false)));
        let resolver = resolver(backend, Some(contract));

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Inactive);
        assert_eq!(state.source, Some(AccessSource::Both));
        assert_eq!(state.detail.reason.as_deref(), Some(NO_SUBSCRIPTION_DETAIL));
    }

    #[tokio::test]
    async fn test_expired_message_becomes_detail() {
        let address: Address = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".parse().unwrap();
        let backend = Arc::new(FakeBackend::new().reply(address, denied(Some("expired"))));
        let resolver = resolver(backend, None);

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Inactive);
        assert_eq!(state.source, Some(AccessSource::Backend));
        assert_eq!(state.detail.reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_backend_timeout_with_contract_true_is_active_from_contract() {
        let address: Address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".parse().unwrap();
        let backend = Arc::new(FakeBackend::new().reply(address, Reply::Hang));
        let contract = Arc::new(FakeContract::new(Ok(true)));
        let resolver = AccessResolver::new(
            backend,
            Some(contract as Arc<dyn ContractAccessCheck>),
            Duration::from_millis(50),
        );

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Active);
        assert_eq!(state.source, Some(AccessSource::Contract));
    }

    #[tokio::test]
    async fn test_backend_timeout_alone_is_error_not_inactive() {
        let address = Address::repeat_byte(0x05);
        let backend = Arc::new(FakeBackend::new().reply(address, Reply::Hang));
        let resolver = AccessResolver::new(backend, None, Duration::from_millis(50));

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Error);
        assert_eq!(state.error, Some(AccessError::Timeout(Duration::from_millis(50))));
        assert!(state.can_retry());
    }

    #[tokio::test]
    async fn test_contract_failure_with_backend_false_is_error() {
        let address = Address::repeat_byte(0x06);
        let backend = Arc::new(FakeBackend::new().reply(address, denied(None)));
        let contract = Arc::new(FakeContract::new(Err(AccessError::Transport("rpc down".into()))));
        let resolver = resolver(backend, Some(contract));

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Error);
        assert_eq!(state.error, Some(AccessError::Transport("rpc down".into())));
    }

    #[tokio::test]
    async fn test_latest_address_wins_over_late_completion() {
        let a = Address::repeat_byte(0x0a);
        let b = Address::repeat_byte(0x0b);
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(
            FakeBackend::new()
                .reply(a, granted())
                .gated(a, gate.clone())
                .reply(b, denied(Some("expired"))),
        );
        let resolver = resolver(backend, None);

        let first = resolver.request(Some(a));
        let second = resolver.resolve(Some(b)).await;
        assert_eq!(second.unwrap().status, AccessStatus::Inactive);

        // A completes after B was requested and resolved
        gate.notify_one();
        assert!(first.await.unwrap().is_none());

        let state = resolver.state();
        assert_eq!(state.address, Some(b));
        assert_eq!(state.status, AccessStatus::Inactive);
        assert_eq!(state.detail.reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_disconnect_discards_in_flight_result() {
        let a = Address::repeat_byte(0x0c);
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(FakeBackend::new().reply(a, granted()).gated(a, gate.clone()));
        let resolver = resolver(backend, None);

        let pending = resolver.request(Some(a));
        assert_eq!(resolver.state().status, AccessStatus::Checking);

        resolver.resolve(None).await;
        gate.notify_one();
        assert!(pending.await.unwrap().is_none());

        let state = resolver.state();
        assert_eq!(state.status, AccessStatus::NotConnected);
        assert!(state.address.is_none());
    }

    #[tokio::test]
    async fn test_retry_rechecks_same_address() {
        let address = Address::repeat_byte(0x0d);
        let backend = Arc::new(
            FakeBackend::new().reply(address, Reply::Fail(AccessError::Transport("502".into()))),
        );
        let resolver = resolver(backend.clone(), None);

        let state = resolver.resolve(Some(address)).await.unwrap();
        assert_eq!(state.status, AccessStatus::Error);

        let retried = resolver.retry().await.unwrap();
        assert_eq!(retried.address, Some(address));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_switching_back_rechecks_from_scratch() {
        let a = Address::repeat_byte(0x0e);
        let b = Address::repeat_byte(0x0f);
        let backend = Arc::new(FakeBackend::new().reply(a, denied(None)).reply(b, denied(None)));
        let resolver = resolver(backend.clone(), None);

        resolver.resolve(Some(a)).await;
        resolver.resolve(Some(b)).await;
        resolver.resolve(Some(a)).await;
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_checking_then_verdict() {
        let address = Address::repeat_byte(0x10);
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(FakeBackend::new().reply(address, granted()).gated(address, gate.clone()));
        let resolver = resolver(backend, None);
        let mut rx = resolver.subscribe();

        let handle = resolver.request(Some(address));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, AccessStatus::Checking);

        gate.notify_one();
        handle.await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, AccessStatus::Active);
    }

    #[tokio::test]
    async fn test_superseded_disconnect_reports_nothing() {
        let a = Address::repeat_byte(0x13);
        let backend = Arc::new(FakeBackend::new().reply(a, granted()));
        let resolver = resolver(backend, None);

        let disconnect = resolver.request(None);
        resolver.resolve(Some(a)).await;

        assert!(disconnect.await.unwrap().is_none());
        assert_eq!(resolver.state().status, AccessStatus::Active);
    }

    #[tokio::test]
    async fn test_refresh_rechecks_current_address() {
        let a = Address::repeat_byte(0x14);
        let backend = Arc::new(FakeBackend::new().reply(a, denied(None)));
        let resolver = resolver(backend.clone(), None);

        resolver.resolve(Some(a)).await;
        let refreshed = resolver.refresh_if_current(a).await.unwrap();

        assert_eq!(refreshed.address, Some(a));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_skips_address_no_longer_current() {
        let a = Address::repeat_byte(0x15);
        let b = Address::repeat_byte(0x16);
        let backend = Arc::new(FakeBackend::new().reply(a, granted()).reply(b, denied(None)));
        let resolver = resolver(backend.clone(), None);

        resolver.resolve(Some(a)).await;
        resolver.resolve(Some(b)).await;

        assert!(resolver.refresh_if_current(a).await.is_none());
        assert_eq!(backend.calls(), 2);

        let state = resolver.state();
        assert_eq!(state.address, Some(b));
        assert_eq!(state.status, AccessStatus::Inactive);
    }

    #[tokio::test]
    async fn test_refresh_while_disconnected_is_skipped() {
        let backend = Arc::new(FakeBackend::new());
        let resolver = resolver(backend.clone(), None);

        assert!(resolver.refresh_if_current(Address::repeat_byte(0x17)).await.is_none());
        assert_eq!(backend.calls(), 0);
        assert_eq!(resolver.state().status, AccessStatus::NotConnected);
    }

    #[test]
    fn test_merge_backend_error_without_contract() {
        let address = Address::repeat_byte(0x11);
        let state = merge_verdicts(address, Err(AccessError::Transport("boom".into())), None);
        assert_eq!(state.status, AccessStatus::Error);
        assert_eq!(state.address, Some(address));
    }

    #[test]
    fn test_merge_backend_error_with_contract_false_is_error() {
        let address = Address::repeat_byte(0x12);
        let state = merge_verdicts(
            address,
            Err(AccessError::Timeout(Duration::from_secs(10))),
            Some(Ok(false)),
        );
        assert_eq!(state.status, AccessStatus::Error);
    }
}
