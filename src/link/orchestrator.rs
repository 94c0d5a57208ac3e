//! Link orchestrator: derives the phase and routes user actions.
//!
//! The orchestrator owns no connection state. Every phase is recomputed from
//! the registry snapshot and the configured target chain; the only thing kept
//! here is the Safe-link form draft.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use crate::chain::ChainId;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::phase::{LinkAction, Phase, compute_phase};
use crate::wallet::{
    ConnectParams, ConnectionRegistry, ConnectionRole, ConnectorId, NetworkOracle,
};

/// Safe address and chain entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeLinkRequest {
    pub safe_address: String,
    pub safe_chain_id: ChainId,
}

impl SafeLinkRequest {
    pub fn new(safe_address: impl Into<String>, safe_chain_id: ChainId) -> Self {
        Self {
            safe_address: safe_address.into(),
            safe_chain_id,
        }
    }

    /// Empty form defaulted to `target`.
    pub fn for_target(target: ChainId) -> Self {
        Self::new(String::new(), target)
    }
}

/// Read model for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub phase: Phase,
    pub target_chain: ChainId,
    pub personal_connector: Option<ConnectorId>,
    pub personal_address: Option<String>,
    pub chain_id: Option<ChainId>,
    pub safe_address: Option<String>,
    pub allowed_actions: Vec<LinkAction>,
}

pub struct LinkOrchestrator {
    config: LinkConfig,
    registry: Arc<ConnectionRegistry>,
    network: Arc<dyn NetworkOracle>,
    draft: Mutex<Option<SafeLinkRequest>>,
}

impl LinkOrchestrator {
    pub fn new(
        config: LinkConfig,
        registry: Arc<ConnectionRegistry>,
        network: Arc<dyn NetworkOracle>,
    ) -> Self {
        Self {
            config,
            registry,
            network,
            draft: Mutex::new(None),
        }
    }

    pub fn target_chain(&self) -> ChainId {
        self.config.target_chain
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn phase(&self) -> Phase {
        compute_phase(&self.registry.snapshot(), self.config.target_chain)
    }

    pub fn view(&self) -> LinkView {
        let snapshot = self.registry.snapshot();
        let phase = compute_phase(&snapshot, self.config.target_chain);
        LinkView {
            phase,
            target_chain: self.config.target_chain,
            personal_connector: snapshot.personal.as_ref().map(|c| c.connector),
            personal_address: snapshot.personal_address().map(str::to_string),
            chain_id: snapshot.personal.as_ref().map(|c| c.chain_id),
            safe_address: snapshot.safe.as_ref().and_then(|c| c.address.clone()),
            allowed_actions: phase.allowed_actions().to_vec(),
        }
    }

    /// Phases as the registry changes, starting with the current one.
    /// Consecutive duplicates are dropped.
    pub fn watch(&self) -> impl Stream<Item = Phase> + Send + 'static {
        let target = self.config.target_chain;
        let mut last = None;
        WatchStream::new(self.registry.subscribe())
            .map(move |snapshot| compute_phase(&snapshot, target))
            .filter_map(move |phase| {
                if last == Some(phase) {
                    None
                } else {
                    last = Some(phase);
                    Some(phase)
                }
            })
    }

    /// Attach a personal wallet.
    pub async fn connect_personal(&self, connector: ConnectorId) -> Result<Phase, LinkError> {
        if connector.role() != ConnectionRole::Personal {
            return Err(LinkError::WrongRole {
                connector,
                expected: ConnectionRole::Personal,
            });
        }
        let before = self.ensure_allowed(LinkAction::ConnectPersonal)?;
        self.registry.connect(connector, None).await?;
        Ok(self.finish(LinkAction::ConnectPersonal, before))
    }

    /// Ask the wallet to move to the target chain. Not retried on failure.
    pub async fn switch_network(&self) -> Result<Phase, LinkError> {
        let before = self.ensure_allowed(LinkAction::SwitchNetwork)?;
        let target = self.config.target_chain;
        let Some(attachment_id) = self
            .registry
            .snapshot()
            .personal
            .as_ref()
            .map(|c| c.attachment_id)
        else {
            return Err(LinkError::ActionNotAllowed {
                action: LinkAction::SwitchNetwork,
                phase: before,
            });
        };

        if let Err(e) = self.network.request_switch(target).await {
            tracing::warn!(target_chain = target.id(), error = %e, "Network switch failed");
            return Err(e.into());
        }

        let observed = self.network.current_chain_id().await;
        if !self
            .registry
            .observe_chain_for(attachment_id, observed)
            .await
        {
            tracing::debug!(
                chain_id = observed.id(),
                "Chain observation after switch not applied"
            );
        }
        Ok(self.finish(LinkAction::SwitchNetwork, before))
    }

    /// Re-read the wallet's chain, e.g. after the user switched inside the
    /// wallet.
    pub async fn refresh_chain(&self) -> Phase {
        let attachment_id = self
            .registry
            .snapshot()
            .personal
            .as_ref()
            .map(|c| c.attachment_id);
        if let Some(attachment_id) = attachment_id {
            let chain = self.network.current_chain_id().await;
            self.registry.observe_chain_for(attachment_id, chain).await;
        }
        self.phase()
    }

    /// Open the Safe-link form, or return the draft already open.
    pub fn open_safe_link(&self) -> SafeLinkRequest {
        let mut draft = self.draft.lock().unwrap_or_else(PoisonError::into_inner);
        draft
            .get_or_insert_with(|| SafeLinkRequest::for_target(self.config.target_chain))
            .clone()
    }

    pub fn set_safe_address(&self, safe_address: &str) -> SafeLinkRequest {
        let mut draft = self.draft.lock().unwrap_or_else(PoisonError::into_inner);
        let request =
            draft.get_or_insert_with(|| SafeLinkRequest::for_target(self.config.target_chain));
        request.safe_address = safe_address.to_string();
        request.clone()
    }

    pub fn safe_link_draft(&self) -> Option<SafeLinkRequest> {
        self.draft
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn discard_safe_link(&self) {
        self.draft
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Submit the open draft (an empty one if none is open).
    pub async fn submit_draft(&self) -> Result<Phase, LinkError> {
        let request = self.open_safe_link();
        self.submit_safe_link(request).await
    }

    /// Link the Safe. An empty address fails before the connector or the
    /// phase gate is consulted.
    pub async fn submit_safe_link(&self, request: SafeLinkRequest) -> Result<Phase, LinkError> {
        if request.safe_address.trim().is_empty() {
            tracing::debug!("Rejecting Safe link with empty address");
            return Err(LinkError::InvalidSafeParams(
                "safe_address must not be empty".to_string(),
            ));
        }
        let before = self.ensure_allowed(LinkAction::SubmitSafeLink)?;

        let params = ConnectParams::Safe {
            safe_address: request.safe_address.trim().to_string(),
            safe_chain_id: request.safe_chain_id,
        };
        self.registry
            .connect(ConnectorId::GnosisSafe, Some(params))
            .await?;
        self.discard_safe_link();
        Ok(self.finish(LinkAction::SubmitSafeLink, before))
    }

    /// Disconnect. `None` or a personal connector disconnects everything;
    /// the Safe connector only unlinks the Safe.
    pub async fn disconnect(&self, connector: Option<ConnectorId>) -> Phase {
        let before = self.phase();
        match connector {
            Some(ConnectorId::GnosisSafe) => {
                self.registry.disconnect(Some(ConnectorId::GnosisSafe)).await;
            }
            _ => {
                self.registry.disconnect(None).await;
                self.discard_safe_link();
            }
        }
        self.finish(LinkAction::Disconnect, before)
    }

    fn ensure_allowed(&self, action: LinkAction) -> Result<Phase, LinkError> {
        let phase = self.phase();
        if phase.allows(action) {
            Ok(phase)
        } else {
            tracing::debug!(action = %action, phase = %phase, "Action not allowed in phase");
            Err(LinkError::ActionNotAllowed { action, phase })
        }
    }

    fn finish(&self, action: LinkAction, before: Phase) -> Phase {
        let after = self.phase();
        if after != before {
            tracing::info!(
                action = %action,
                from = %before,
                to = %after,
                target_chain = self.config.target_chain.id(),
                "Link phase transition"
            );
        }
        after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectError, SwitchError};
    use crate::wallet::sandbox::{SandboxNetwork, SandboxSafe, SandboxWallet};
    use crate::wallet::{DEFAULT_EVENT_LOG_CAP, WalletConnector};

    use tokio::sync::Notify;

    const ALICE: &str = "0x9431cf5da0ce60664661341db650763b08286b18";
    const SAFE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    struct Harness {
        orchestrator: LinkOrchestrator,
        network: Arc<SandboxNetwork>,
        wallet: Arc<SandboxWallet>,
        safe: Arc<SandboxSafe>,
    }

    fn harness_with(network: SandboxNetwork, safe: SandboxSafe) -> Harness {
        let network = Arc::new(network);
        let wallet = Arc::new(SandboxWallet::on_network(
            ConnectorId::Injected,
            ALICE,
            network.clone(),
        ));
        let safe = Arc::new(safe.with_signer_network(network.clone()));
        let connectors: Vec<Arc<dyn WalletConnector>> = vec![safe.clone(), wallet.clone()];
        let registry = Arc::new(ConnectionRegistry::new(connectors, DEFAULT_EVENT_LOG_CAP));
        let orchestrator =
            LinkOrchestrator::new(LinkConfig::default(), registry, network.clone());
        Harness {
            orchestrator,
            network,
            wallet,
            safe,
        }
    }

    fn harness(chain: ChainId) -> Harness {
        harness_with(SandboxNetwork::new(chain), SandboxSafe::new())
    }

    #[tokio::test]
    async fn full_flow_reaches_linked() {
        let h = harness(ChainId::MAINNET);
        assert_eq!(h.orchestrator.phase(), Phase::Unauthenticated);

        let phase = h
            .orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();
        assert_eq!(phase, Phase::NetworkMismatch);

        let phase = h.orchestrator.switch_network().await.unwrap();
        assert_eq!(phase, Phase::AwaitingSafeLink);

        h.orchestrator.set_safe_address(SAFE);
        let phase = h.orchestrator.submit_draft().await.unwrap();
        assert_eq!(phase, Phase::Linked);
        assert!(h.orchestrator.safe_link_draft().is_none());

        let view = h.orchestrator.view();
        assert_eq!(view.personal_address.as_deref(), Some(ALICE));
        assert_eq!(view.safe_address.as_deref(), Some(SAFE));
        assert_eq!(view.allowed_actions, vec![LinkAction::Disconnect]);

        assert_eq!(h.orchestrator.disconnect(None).await, Phase::Unauthenticated);
    }

    #[tokio::test]
    async fn rejected_switch_stays_in_mismatch() {
        let h = harness(ChainId::MAINNET);
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();

        h.network.reject_next_switch();
        let err = h.orchestrator.switch_network().await.unwrap_err();
        assert_eq!(err, LinkError::Switch(SwitchError::Rejected));
        assert_eq!(h.orchestrator.phase(), Phase::NetworkMismatch);
        assert_eq!(h.network.switch_calls(), 1);

        // Retry is the caller's decision.
        assert_eq!(
            h.orchestrator.switch_network().await.unwrap(),
            Phase::AwaitingSafeLink
        );
    }

    #[tokio::test]
    async fn empty_safe_address_fails_fast_in_any_phase() {
        let h = harness(ChainId::GOERLI);
        let request = SafeLinkRequest::new("", ChainId(5));

        let err = h
            .orchestrator
            .submit_safe_link(request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidSafeParams(_)));

        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();
        let err = h.orchestrator.submit_safe_link(request).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidSafeParams(_)));
        assert_eq!(h.safe.attach_calls(), 0);
        assert_eq!(h.orchestrator.phase(), Phase::AwaitingSafeLink);
    }

    #[tokio::test]
    async fn safe_link_blocked_on_wrong_network() {
        let h = harness(ChainId::MAINNET);
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();

        let err = h
            .orchestrator
            .submit_safe_link(SafeLinkRequest::new(SAFE, ChainId::GOERLI))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LinkError::ActionNotAllowed {
                action: LinkAction::SubmitSafeLink,
                phase: Phase::NetworkMismatch,
            }
        );
        assert_eq!(h.safe.attach_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_safe_connect_keeps_draft_and_phase() {
        let h = harness(ChainId::GOERLI);
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();
        h.orchestrator.set_safe_address(SAFE);
        h.safe.reject_next_attach();

        let err = h.orchestrator.submit_draft().await.unwrap_err();
        assert_eq!(err, LinkError::Connect(ConnectError::Rejected));
        assert_eq!(h.orchestrator.phase(), Phase::AwaitingSafeLink);
        assert_eq!(
            h.orchestrator.safe_link_draft().map(|d| d.safe_address),
            Some(SAFE.to_string())
        );
    }

    #[tokio::test]
    async fn safe_connector_cannot_be_personal() {
        let h = harness(ChainId::GOERLI);
        let err = h
            .orchestrator
            .connect_personal(ConnectorId::GnosisSafe)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::WrongRole { .. }));
    }

    #[tokio::test]
    async fn draft_defaults_to_target_chain() {
        let h = harness(ChainId::GOERLI);
        let draft = h.orchestrator.open_safe_link();
        assert_eq!(draft, SafeLinkRequest::for_target(ChainId::GOERLI));

        h.orchestrator.discard_safe_link();
        assert!(h.orchestrator.safe_link_draft().is_none());
    }

    #[tokio::test]
    async fn unlinking_safe_returns_to_awaiting() {
        let h = harness(ChainId::GOERLI);
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();
        h.orchestrator
            .submit_safe_link(SafeLinkRequest::new(SAFE, ChainId::GOERLI))
            .await
            .unwrap();

        let phase = h.orchestrator.disconnect(Some(ConnectorId::GnosisSafe)).await;
        assert_eq!(phase, Phase::AwaitingSafeLink);
        assert_eq!(h.wallet.detach_calls(), 0);
    }

    #[tokio::test]
    async fn wallet_side_chain_change_is_picked_up() {
        let h = harness(ChainId::GOERLI);
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();
        h.orchestrator
            .submit_safe_link(SafeLinkRequest::new(SAFE, ChainId::GOERLI))
            .await
            .unwrap();

        h.network.set_chain(ChainId::MAINNET);
        assert_eq!(h.orchestrator.refresh_chain().await, Phase::NetworkMismatch);
    }

    #[tokio::test]
    async fn safe_resolution_after_disconnect_is_discarded() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            SandboxNetwork::new(ChainId::GOERLI),
            SandboxSafe::new().with_attach_gate(gate.clone()),
        );
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();

        let (submitted, disconnected) = tokio::join!(
            h.orchestrator
                .submit_safe_link(SafeLinkRequest::new(SAFE, ChainId::GOERLI)),
            async {
                let phase = h.orchestrator.disconnect(None).await;
                gate.notify_one();
                phase
            }
        );

        assert_eq!(disconnected, Phase::Unauthenticated);
        assert_eq!(
            submitted.unwrap_err(),
            LinkError::Connect(ConnectError::Superseded(ConnectorId::GnosisSafe))
        );
        assert_eq!(h.orchestrator.phase(), Phase::Unauthenticated);
        assert!(!h.orchestrator.registry().is_connected(ConnectorId::GnosisSafe));
        assert_eq!(h.safe.detach_calls(), 1);
    }

    #[tokio::test]
    async fn switch_resolving_after_disconnect_records_nothing() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            SandboxNetwork::new(ChainId::MAINNET).with_switch_gate(gate.clone()),
            SandboxSafe::new(),
        );
        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();

        let (switched, _) = tokio::join!(h.orchestrator.switch_network(), async {
            h.orchestrator.disconnect(None).await;
            gate.notify_one();
        });

        assert_eq!(switched.unwrap(), Phase::Unauthenticated);
        assert!(h.orchestrator.registry().snapshot().personal.is_none());
    }

    #[tokio::test]
    async fn watch_emits_distinct_phases() {
        let h = harness(ChainId::MAINNET);
        let mut phases = Box::pin(h.orchestrator.watch());
        assert_eq!(phases.next().await, Some(Phase::Unauthenticated));

        h.orchestrator
            .connect_personal(ConnectorId::Injected)
            .await
            .unwrap();
        assert_eq!(phases.next().await, Some(Phase::NetworkMismatch));

        h.orchestrator.switch_network().await.unwrap();
        assert_eq!(phases.next().await, Some(Phase::AwaitingSafeLink));
    }
}
