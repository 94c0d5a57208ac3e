//! In-process connector and network implementations.
//!
//! Used by the REPL and by tests. Behavior is scriptable: the next attach or
//! switch can be rejected, address resolution can be deferred, and attaches
//! can be held on a [`Notify`] gate to interleave them with disconnects.

use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::chain::ChainId;
use crate::error::{ConnectError, SwitchError};
use crate::wallet::address::{is_valid_checksum, normalize_wallet_address, to_checksum_address};
use crate::wallet::connector::{Attachment, ConnectParams, ConnectorId, WalletConnector};
use crate::wallet::network::NetworkOracle;

/// Chain state of a simulated wallet provider.
#[derive(Debug)]
pub struct SandboxNetwork {
    chain: AtomicU64,
    supported: Option<Vec<ChainId>>,
    reject_next: AtomicBool,
    switch_calls: AtomicUsize,
    switch_gate: Option<Arc<Notify>>,
}

impl SandboxNetwork {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain: AtomicU64::new(chain.id()),
            supported: None,
            reject_next: AtomicBool::new(false),
            switch_calls: AtomicUsize::new(0),
            switch_gate: None,
        }
    }

    /// Restrict which chains `request_switch` accepts.
    pub fn with_supported_chains(mut self, chains: Vec<ChainId>) -> Self {
        self.supported = Some(chains);
        self
    }

    /// Hold every switch request until the gate is notified.
    pub fn with_switch_gate(mut self, gate: Arc<Notify>) -> Self {
        self.switch_gate = Some(gate);
        self
    }

    pub fn chain(&self) -> ChainId {
        ChainId(self.chain.load(Ordering::SeqCst))
    }

    /// Simulate the user changing chains inside the wallet.
    pub fn set_chain(&self, chain: ChainId) {
        self.chain.store(chain.id(), Ordering::SeqCst);
    }

    pub fn reject_next_switch(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    pub fn switch_calls(&self) -> usize {
        self.switch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkOracle for SandboxNetwork {
    async fn current_chain_id(&self) -> ChainId {
        self.chain()
    }

    async fn request_switch(&self, target: ChainId) -> Result<(), SwitchError> {
        self.switch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.switch_gate {
            gate.notified().await;
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(SwitchError::Rejected);
        }
        if let Some(supported) = &self.supported
            && !supported.contains(&target)
        {
            return Err(SwitchError::Unsupported(target));
        }
        self.set_chain(target);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Controls {
    reject_next: AtomicBool,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
    attach_gate: Option<Arc<Notify>>,
    hold_next: Mutex<Option<Arc<Notify>>>,
}

impl Controls {
    fn hold_next_attach(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    async fn begin_attach(&self) -> Result<(), ConnectError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        let held = self
            .hold_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = held {
            gate.notified().await;
        }
        if let Some(gate) = &self.attach_gate {
            gate.notified().await;
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(ConnectError::Rejected);
        }
        Ok(())
    }
}

/// Simulated personal wallet (injected, Coinbase, WalletConnect, ...).
#[derive(Debug)]
pub struct SandboxWallet {
    id: ConnectorId,
    address: String,
    network: Arc<SandboxNetwork>,
    address_pending: AtomicBool,
    controls: Controls,
}

impl SandboxWallet {
    /// Wallet with its own network starting on `chain`.
    pub fn new(id: ConnectorId, address: &str, chain: ChainId) -> Self {
        Self::on_network(id, address, Arc::new(SandboxNetwork::new(chain)))
    }

    /// Wallet whose chain is read from a shared network.
    pub fn on_network(id: ConnectorId, address: &str, network: Arc<SandboxNetwork>) -> Self {
        Self {
            id,
            address: address.to_string(),
            network,
            address_pending: AtomicBool::new(false),
            controls: Controls::default(),
        }
    }

    pub fn with_attach_gate(mut self, gate: Arc<Notify>) -> Self {
        self.controls.attach_gate = Some(gate);
        self
    }

    pub fn network(&self) -> Arc<SandboxNetwork> {
        self.network.clone()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// When set, attach reports no address; resolve it through the registry.
    pub fn set_address_pending(&self, pending: bool) {
        self.address_pending.store(pending, Ordering::SeqCst);
    }

    pub fn reject_next_attach(&self) {
        self.controls.reject_next.store(true, Ordering::SeqCst);
    }

    /// Hold only the next attach until the returned gate is notified.
    pub fn hold_next_attach(&self) -> Arc<Notify> {
        self.controls.hold_next_attach()
    }

    pub fn attach_calls(&self) -> usize {
        self.controls.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.controls.detach_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletConnector for SandboxWallet {
    fn id(&self) -> ConnectorId {
        self.id
    }

    async fn attach(&self, _params: Option<&ConnectParams>) -> Result<Attachment, ConnectError> {
        self.controls.begin_attach().await?;
        let address = if self.address_pending.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.address.clone())
        };
        Ok(Attachment {
            address,
            chain_id: self.network.chain(),
        })
    }

    async fn detach(&self) {
        self.controls.detach_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Simulated Safe connector.
///
/// Checks the Safe address format (EIP-55 when mixed case) and, when bound
/// to the signer's network, that the Safe chain matches it.
#[derive(Debug, Default)]
pub struct SandboxSafe {
    signer_network: Option<Arc<SandboxNetwork>>,
    controls: Controls,
}

impl SandboxSafe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer_network(mut self, network: Arc<SandboxNetwork>) -> Self {
        self.signer_network = Some(network);
        self
    }

    pub fn with_attach_gate(mut self, gate: Arc<Notify>) -> Self {
        self.controls.attach_gate = Some(gate);
        self
    }

    pub fn reject_next_attach(&self) {
        self.controls.reject_next.store(true, Ordering::SeqCst);
    }

    /// Hold only the next attach until the returned gate is notified.
    pub fn hold_next_attach(&self) -> Arc<Notify> {
        self.controls.hold_next_attach()
    }

    pub fn attach_calls(&self) -> usize {
        self.controls.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.controls.detach_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletConnector for SandboxSafe {
    fn id(&self) -> ConnectorId {
        ConnectorId::GnosisSafe
    }

    async fn attach(&self, params: Option<&ConnectParams>) -> Result<Attachment, ConnectError> {
        self.controls.begin_attach().await?;
        let Some(ConnectParams::Safe {
            safe_address,
            safe_chain_id,
        }) = params
        else {
            return Err(ConnectError::InvalidSafeParams(
                "safe_address and safe_chain_id are required".to_string(),
            ));
        };

        if normalize_wallet_address(safe_address).is_none() || !is_valid_checksum(safe_address) {
            return Err(ConnectError::InvalidSafeParams(format!(
                "'{}' is not a valid Safe address",
                safe_address.trim()
            )));
        }
        if let Some(network) = &self.signer_network
            && network.chain() != *safe_chain_id
        {
            return Err(ConnectError::Provider(format!(
                "signer is on chain {} but the Safe is on chain {}",
                network.chain(),
                safe_chain_id
            )));
        }

        Ok(Attachment {
            address: to_checksum_address(safe_address),
            chain_id: *safe_chain_id,
        })
    }

    async fn detach(&self) {
        self.controls.detach_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn params(address: &str, chain: ChainId) -> ConnectParams {
        ConnectParams::Safe {
            safe_address: address.to_string(),
            safe_chain_id: chain,
        }
    }

    #[tokio::test]
    async fn network_switch_updates_chain_and_honours_rejection() {
        let network = SandboxNetwork::new(ChainId::MAINNET);
        network.reject_next_switch();
        assert_eq!(
            network.request_switch(ChainId::GOERLI).await,
            Err(SwitchError::Rejected)
        );
        assert_eq!(network.current_chain_id().await, ChainId::MAINNET);

        network.request_switch(ChainId::GOERLI).await.unwrap();
        assert_eq!(network.current_chain_id().await, ChainId::GOERLI);
        assert_eq!(network.switch_calls(), 2);
    }

    #[tokio::test]
    async fn network_rejects_unsupported_chain() {
        let network = SandboxNetwork::new(ChainId::MAINNET).with_supported_chains(vec![ChainId::MAINNET]);
        assert_eq!(
            network.request_switch(ChainId::GOERLI).await,
            Err(SwitchError::Unsupported(ChainId::GOERLI))
        );
    }

    #[tokio::test]
    async fn wallet_reports_network_chain_and_pending_address() {
        let network = Arc::new(SandboxNetwork::new(ChainId::MAINNET));
        let wallet = SandboxWallet::on_network(
            ConnectorId::Metamask,
            "0x0000000000000000000000000000000000000001",
            network.clone(),
        );
        wallet.set_address_pending(true);
        network.set_chain(ChainId::GOERLI);

        let attachment = wallet.attach(None).await.unwrap();
        assert_eq!(attachment.address, None);
        assert_eq!(attachment.chain_id, ChainId::GOERLI);
    }

    #[tokio::test]
    async fn safe_validates_address_format_and_chain() {
        let network = Arc::new(SandboxNetwork::new(ChainId::GOERLI));
        let safe = SandboxSafe::new().with_signer_network(network.clone());

        let attachment = safe
            .attach(Some(&params(&SAFE.to_ascii_lowercase(), ChainId::GOERLI)))
            .await
            .unwrap();
        assert_eq!(attachment.address.as_deref(), Some(SAFE));

        let err = safe
            .attach(Some(&params("0x1234", ChainId::GOERLI)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::InvalidSafeParams(_)));

        let err = safe
            .attach(Some(&params(SAFE, ChainId::MAINNET)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Provider(_)));
        assert_eq!(safe.attach_calls(), 3);
    }
}
