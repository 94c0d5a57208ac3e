//! Connection registry: which connectors are attached and who they resolve to.
//!
//! The registry holds one personal slot and one Safe slot. Every mutation
//! updates the slots and publishes a fresh [`RegistrySnapshot`] under the same
//! write guard, so subscribers never observe a half-applied change.
//!
//! Every attach in flight holds a ticket. `disconnect` revokes the tickets of
//! the connectors it names, and an attach whose ticket was revoked is
//! discarded when it resolves.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::chain::ChainId;
use crate::error::ConnectError;
use crate::wallet::connector::{
    ConnectParams, ConnectionRole, ConnectorDescriptor, ConnectorId, WalletConnector,
};

pub const DEFAULT_EVENT_LOG_CAP: usize = 256;

/// A connector that attached successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveConnection {
    pub attachment_id: Uuid,
    pub connector: ConnectorId,
    pub role: ConnectionRole,
    pub address: Option<String>,
    pub chain_id: ChainId,
    pub attached_at: DateTime<Utc>,
}

/// Point-in-time view of both slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub personal: Option<ActiveConnection>,
    pub safe: Option<ActiveConnection>,
}

impl RegistrySnapshot {
    pub fn slot(&self, role: ConnectionRole) -> Option<&ActiveConnection> {
        match role {
            ConnectionRole::Personal => self.personal.as_ref(),
            ConnectionRole::Safe => self.safe.as_ref(),
        }
    }

    pub fn personal_address(&self) -> Option<&str> {
        self.personal.as_ref().and_then(|c| c.address.as_deref())
    }

    pub fn is_connected(&self, connector: ConnectorId) -> bool {
        self.slot(connector.role())
            .is_some_and(|c| c.connector == connector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryEventKind {
    Attached,
    Detached,
    AddressResolved,
    ChainChanged,
    Discarded,
}

impl RegistryEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::AddressResolved => "address_resolved",
            Self::ChainChanged => "chain_changed",
            Self::Discarded => "discarded",
        }
    }
}

/// Entry of the registry mutation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEvent {
    pub seq_id: u64,
    pub kind: RegistryEventKind,
    pub connector: ConnectorId,
    pub detail: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct PendingAttach {
    ticket: u64,
    connector: ConnectorId,
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: RegistrySnapshot,
    pending: Vec<PendingAttach>,
    next_ticket: u64,
    events: VecDeque<RegistryEvent>,
    next_seq_id: u64,
}

impl RegistryState {
    fn slot_mut(&mut self, role: ConnectionRole) -> &mut Option<ActiveConnection> {
        match role {
            ConnectionRole::Personal => &mut self.slots.personal,
            ConnectionRole::Safe => &mut self.slots.safe,
        }
    }

    fn begin_attach(&mut self, connector: ConnectorId) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.pending.push(PendingAttach { ticket, connector });
        ticket
    }

    /// Retire `ticket`. False when a disconnect revoked it.
    fn finish_attach(&mut self, ticket: u64) -> bool {
        match self.pending.iter().position(|p| p.ticket == ticket) {
            Some(index) => {
                self.pending.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Revoke the tickets of every attach in flight for `connector`, or for
    /// all connectors when `None`. Returns how many were revoked.
    fn revoke_attaches(&mut self, connector: Option<ConnectorId>) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|p| connector.is_some_and(|id| id != p.connector));
        before - self.pending.len()
    }

    /// Whether `connector` still has a live session: it sits in its slot or
    /// has another attach in flight.
    fn holds_session(&self, connector: ConnectorId) -> bool {
        self.slots.is_connected(connector) || self.pending.iter().any(|p| p.connector == connector)
    }
}

pub struct ConnectionRegistry {
    connectors: HashMap<ConnectorId, Arc<dyn WalletConnector>>,
    order: Vec<ConnectorId>,
    state: RwLock<RegistryState>,
    snapshot_tx: watch::Sender<RegistrySnapshot>,
    event_log_cap: usize,
}

impl ConnectionRegistry {
    /// Build a registry over the configured connectors. Later duplicates of
    /// the same id replace earlier ones.
    pub fn new(connectors: Vec<Arc<dyn WalletConnector>>, event_log_cap: usize) -> Self {
        let mut order = Vec::with_capacity(connectors.len());
        let mut by_id = HashMap::with_capacity(connectors.len());
        for connector in connectors {
            let id = connector.id();
            if by_id.insert(id, connector).is_none() {
                order.push(id);
            }
        }
        let (snapshot_tx, _) = watch::channel(RegistrySnapshot::default());
        Self {
            connectors: by_id,
            order,
            state: RwLock::new(RegistryState::default()),
            snapshot_tx,
            event_log_cap: event_log_cap.max(1),
        }
    }

    /// Configured connectors, in configuration order.
    pub fn descriptors(&self) -> Vec<ConnectorDescriptor> {
        self.order
            .iter()
            .copied()
            .map(ConnectorDescriptor::new)
            .collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The connector in the personal slot.
    pub fn active_connector(&self) -> Option<ConnectorDescriptor> {
        self.snapshot_tx
            .borrow()
            .personal
            .as_ref()
            .map(|c| ConnectorDescriptor::new(c.connector))
    }

    /// Resolved personal address. `None` is a normal transient state.
    pub fn address(&self) -> Option<String> {
        self.snapshot_tx
            .borrow()
            .personal_address()
            .map(str::to_string)
    }

    pub fn is_connected(&self, connector: ConnectorId) -> bool {
        self.snapshot_tx.borrow().is_connected(connector)
    }

    pub async fn events(&self) -> Vec<RegistryEvent> {
        self.state.read().await.events.iter().cloned().collect()
    }

    /// Attach a connector and register it in its role's slot.
    ///
    /// The Safe connector requires [`ConnectParams::Safe`] with a non-empty
    /// address; this is checked before the connector is contacted.
    pub async fn connect(
        &self,
        connector_id: ConnectorId,
        params: Option<ConnectParams>,
    ) -> Result<ActiveConnection, ConnectError> {
        let connector = self
            .connectors
            .get(&connector_id)
            .cloned()
            .ok_or(ConnectError::UnknownConnector(connector_id))?;
        let role = connector_id.role();
        if role == ConnectionRole::Safe {
            validate_safe_params(params.as_ref())?;
        }

        let ticket = self.state.write().await.begin_attach(connector_id);
        let attachment = match connector.attach(params.as_ref()).await {
            Ok(attachment) => attachment,
            Err(e) => {
                self.state.write().await.finish_attach(ticket);
                tracing::debug!(connector = %connector_id, error = %e, "Connector attach failed");
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if !state.finish_attach(ticket) {
            self.push_event(
                &mut state,
                RegistryEventKind::Discarded,
                connector_id,
                "attach resolved after disconnect",
            );
            let in_use = state.holds_session(connector_id);
            drop(state);
            if in_use {
                tracing::debug!(connector = %connector_id, "Keeping newer session of discarded attach");
            } else {
                connector.detach().await;
            }
            return Err(ConnectError::Superseded(connector_id));
        }

        let connection = ActiveConnection {
            attachment_id: Uuid::new_v4(),
            connector: connector_id,
            role,
            address: attachment
                .address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            chain_id: attachment.chain_id,
            attached_at: Utc::now(),
        };
        let replaced = state.slot_mut(role).replace(connection.clone());
        let detail = format!(
            "role={} chain_id={} address={}",
            role,
            connection.chain_id.id(),
            connection.address.as_deref().unwrap_or("<pending>")
        );
        self.push_event(&mut state, RegistryEventKind::Attached, connector_id, &detail);
        let replaced = replaced.filter(|old| old.connector != connector_id);
        let detach_replaced = replaced
            .as_ref()
            .is_some_and(|old| !state.holds_session(old.connector));
        if let Some(old) = replaced.as_ref() {
            self.push_event(
                &mut state,
                RegistryEventKind::Detached,
                old.connector,
                "replaced by newer connector",
            );
        }
        self.publish(&state);
        drop(state);

        if let Some(old) = replaced
            && detach_replaced
            && let Some(old_connector) = self.connectors.get(&old.connector)
        {
            old_connector.detach().await;
        }

        Ok(connection)
    }

    /// Remove the named connection, or every connection when `None`.
    ///
    /// Idempotent. Attaches in flight for the named connector (all of them
    /// when `None`) are discarded when they resolve. Naming a connector that
    /// is neither attached nor attaching changes nothing.
    pub async fn disconnect(&self, connector_id: Option<ConnectorId>) {
        let mut state = self.state.write().await;
        let revoked = state.revoke_attaches(connector_id);
        if revoked > 0 {
            tracing::debug!(revoked, "Revoked attaches in flight");
        }

        let roles: &[ConnectionRole] = match connector_id {
            Some(id) if id.role() == ConnectionRole::Safe => &[ConnectionRole::Safe],
            Some(_) => &[ConnectionRole::Personal],
            None => &[ConnectionRole::Personal, ConnectionRole::Safe],
        };

        let mut removed = Vec::new();
        for role in roles {
            let slot = state.slot_mut(*role);
            let matches = match (slot.as_ref(), connector_id) {
                (Some(conn), Some(id)) => conn.connector == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if matches && let Some(conn) = slot.take() {
                removed.push(conn);
            }
        }

        if removed.is_empty() {
            return;
        }
        for conn in &removed {
            self.push_event(
                &mut state,
                RegistryEventKind::Detached,
                conn.connector,
                &format!("role={}", conn.role),
            );
        }
        self.publish(&state);
        drop(state);

        for conn in removed {
            if let Some(connector) = self.connectors.get(&conn.connector) {
                connector.detach().await;
            }
        }
    }

    /// Record the account a connector resolved to. Ignored when the connector
    /// is no longer attached.
    pub async fn resolve_address(&self, connector_id: ConnectorId, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }
        let mut state = self.state.write().await;
        let Some(conn) = state.slot_mut(connector_id.role()).as_mut() else {
            return false;
        };
        if conn.connector != connector_id || conn.address.as_deref() == Some(address) {
            return false;
        }
        conn.address = Some(address.to_string());
        self.push_event(
            &mut state,
            RegistryEventKind::AddressResolved,
            connector_id,
            address,
        );
        self.publish(&state);
        true
    }

    /// Record the personal wallet's current chain.
    pub async fn observe_chain(&self, chain_id: ChainId) -> bool {
        let mut state = self.state.write().await;
        self.apply_chain(&mut state, None, chain_id)
    }

    /// Like [`observe_chain`](Self::observe_chain), but only if the personal
    /// slot still holds `attachment_id`.
    pub async fn observe_chain_for(&self, attachment_id: Uuid, chain_id: ChainId) -> bool {
        let mut state = self.state.write().await;
        self.apply_chain(&mut state, Some(attachment_id), chain_id)
    }

    fn apply_chain(
        &self,
        state: &mut RegistryState,
        attachment_id: Option<Uuid>,
        chain_id: ChainId,
    ) -> bool {
        let Some(conn) = state.slots.personal.as_mut() else {
            return false;
        };
        if attachment_id.is_some_and(|id| id != conn.attachment_id) {
            tracing::debug!(chain_id = chain_id.id(), "Dropping chain observation for stale attachment");
            return false;
        }
        if conn.chain_id == chain_id {
            return false;
        }
        let detail = format!("{} -> {}", conn.chain_id.id(), chain_id.id());
        let connector = conn.connector;
        conn.chain_id = chain_id;
        self.push_event(state, RegistryEventKind::ChainChanged, connector, &detail);
        self.publish(state);
        true
    }

    fn publish(&self, state: &RegistryState) {
        self.snapshot_tx.send_replace(state.slots.clone());
    }

    fn push_event(
        &self,
        state: &mut RegistryState,
        kind: RegistryEventKind,
        connector: ConnectorId,
        detail: &str,
    ) {
        let seq_id = state.next_seq_id;
        state.next_seq_id = state.next_seq_id.saturating_add(1);
        state.events.push_back(RegistryEvent {
            seq_id,
            kind,
            connector,
            detail: detail.to_string(),
            at: Utc::now(),
        });
        while state.events.len() > self.event_log_cap {
            state.events.pop_front();
        }
        tracing::info!(
            seq_id,
            event_type = kind.as_str(),
            connector = %connector,
            role = %connector.role(),
            detail = detail,
            "Connection registry event"
        );
    }
}

fn validate_safe_params(params: Option<&ConnectParams>) -> Result<(), ConnectError> {
    match params {
        Some(ConnectParams::Safe { safe_address, .. }) if !safe_address.trim().is_empty() => Ok(()),
        Some(ConnectParams::Safe { .. }) => Err(ConnectError::InvalidSafeParams(
            "safe_address must not be empty".to_string(),
        )),
        None => Err(ConnectError::InvalidSafeParams(
            "safe_address and safe_chain_id are required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::sandbox::{SandboxSafe, SandboxWallet};

    const ALICE: &str = "0x9431cf5da0ce60664661341db650763b08286b18";
    const SAFE: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    fn registry_with(cap: usize) -> (ConnectionRegistry, Arc<SandboxWallet>, Arc<SandboxSafe>) {
        let injected = Arc::new(SandboxWallet::new(ConnectorId::Injected, ALICE, ChainId::GOERLI));
        let safe = Arc::new(SandboxSafe::new());
        let coinbase = Arc::new(SandboxWallet::new(
            ConnectorId::Coinbase,
            "0x0000000000000000000000000000000000000002",
            ChainId::MAINNET,
        ));
        let connectors: Vec<Arc<dyn WalletConnector>> =
            vec![injected.clone(), safe.clone(), coinbase];
        (ConnectionRegistry::new(connectors, cap), injected, safe)
    }

    fn safe_params(address: &str) -> Option<ConnectParams> {
        Some(ConnectParams::Safe {
            safe_address: address.to_string(),
            safe_chain_id: ChainId::GOERLI,
        })
    }

    #[tokio::test]
    async fn connect_registers_and_disconnect_removes() {
        let (registry, _, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        assert!(!registry.is_connected(ConnectorId::Injected));

        let conn = registry.connect(ConnectorId::Injected, None).await.unwrap();
        assert_eq!(conn.role, ConnectionRole::Personal);
        assert!(registry.is_connected(ConnectorId::Injected));
        assert_eq!(registry.address().as_deref(), Some(ALICE));
        assert_eq!(
            registry.active_connector().map(|d| d.id),
            Some(ConnectorId::Injected)
        );

        registry.disconnect(Some(ConnectorId::Injected)).await;
        assert!(!registry.is_connected(ConnectorId::Injected));
        assert!(registry.address().is_none());
    }

    #[tokio::test]
    async fn personal_and_safe_coexist() {
        let (registry, _, safe) = registry_with(DEFAULT_EVENT_LOG_CAP);
        registry.connect(ConnectorId::Injected, None).await.unwrap();
        registry
            .connect(ConnectorId::GnosisSafe, safe_params(SAFE))
            .await
            .unwrap();

        assert!(registry.is_connected(ConnectorId::Injected));
        assert!(registry.is_connected(ConnectorId::GnosisSafe));
        assert_eq!(safe.attach_calls(), 1);
        assert_eq!(
            registry.active_connector().map(|d| d.id),
            Some(ConnectorId::Injected)
        );
    }

    #[tokio::test]
    async fn second_personal_connector_replaces_first() {
        let (registry, injected, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        registry.connect(ConnectorId::Injected, None).await.unwrap();
        registry.connect(ConnectorId::Coinbase, None).await.unwrap();

        assert!(!registry.is_connected(ConnectorId::Injected));
        assert!(registry.is_connected(ConnectorId::Coinbase));
        assert_eq!(injected.detach_calls(), 1);
    }

    #[tokio::test]
    async fn safe_connect_requires_non_empty_address() {
        let (registry, _, safe) = registry_with(DEFAULT_EVENT_LOG_CAP);

        let err = registry
            .connect(ConnectorId::GnosisSafe, safe_params("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::InvalidSafeParams(_)));

        let err = registry
            .connect(ConnectorId::GnosisSafe, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::InvalidSafeParams(_)));
        assert_eq!(safe.attach_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_connector_is_rejected() {
        let (registry, _, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        let err = registry
            .connect(ConnectorId::Magic, None)
            .await
            .unwrap_err();
        assert_eq!(err, ConnectError::UnknownConnector(ConnectorId::Magic));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (registry, injected, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        registry.connect(ConnectorId::Injected, None).await.unwrap();

        registry.disconnect(Some(ConnectorId::Injected)).await;
        let once = registry.snapshot();
        let events_once = registry.events().await.len();
        registry.disconnect(Some(ConnectorId::Injected)).await;

        assert_eq!(registry.snapshot(), once);
        assert_eq!(registry.events().await.len(), events_once);
        assert_eq!(injected.detach_calls(), 1);
    }

    #[tokio::test]
    async fn stale_attach_leaves_reconnected_session_alone() {
        let (registry, injected, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        let registry = Arc::new(registry);
        let gate = injected.hold_next_attach();

        let stale = tokio::spawn({
            let registry = registry.clone();
            async move { registry.connect(ConnectorId::Injected, None).await }
        });
        while injected.attach_calls() == 0 {
            tokio::task::yield_now().await;
        }

        registry.disconnect(None).await;
        registry.connect(ConnectorId::Injected, None).await.unwrap();
        gate.notify_one();

        let err = stale.await.unwrap().unwrap_err();
        assert_eq!(err, ConnectError::Superseded(ConnectorId::Injected));
        assert!(registry.is_connected(ConnectorId::Injected));
        assert_eq!(injected.detach_calls(), 0);
        assert_eq!(
            registry.events().await.last().map(|e| e.kind),
            Some(RegistryEventKind::Discarded)
        );
    }

    #[tokio::test]
    async fn stale_attach_without_newer_session_is_detached() {
        let (registry, injected, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        let registry = Arc::new(registry);
        let gate = injected.hold_next_attach();

        let stale = tokio::spawn({
            let registry = registry.clone();
            async move { registry.connect(ConnectorId::Injected, None).await }
        });
        while injected.attach_calls() == 0 {
            tokio::task::yield_now().await;
        }

        registry.disconnect(Some(ConnectorId::Injected)).await;
        gate.notify_one();

        let err = stale.await.unwrap().unwrap_err();
        assert_eq!(err, ConnectError::Superseded(ConnectorId::Injected));
        assert!(!registry.is_connected(ConnectorId::Injected));
        assert_eq!(injected.detach_calls(), 1);
    }

    #[tokio::test]
    async fn disconnecting_absent_connector_keeps_other_attach() {
        let (registry, injected, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        let registry = Arc::new(registry);
        let gate = injected.hold_next_attach();

        let pending = tokio::spawn({
            let registry = registry.clone();
            async move { registry.connect(ConnectorId::Injected, None).await }
        });
        while injected.attach_calls() == 0 {
            tokio::task::yield_now().await;
        }

        let events_before = registry.events().await.len();
        registry.disconnect(Some(ConnectorId::Coinbase)).await;
        assert_eq!(registry.events().await.len(), events_before);
        gate.notify_one();

        let conn = pending.await.unwrap().unwrap();
        assert_eq!(conn.connector, ConnectorId::Injected);
        assert!(registry.is_connected(ConnectorId::Injected));
        assert_eq!(injected.detach_calls(), 0);
    }

    #[tokio::test]
    async fn disconnect_all_clears_both_slots() {
        let (registry, _, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        registry.connect(ConnectorId::Injected, None).await.unwrap();
        registry
            .connect(ConnectorId::GnosisSafe, safe_params(SAFE))
            .await
            .unwrap();

        registry.disconnect(None).await;
        assert_eq!(registry.snapshot(), RegistrySnapshot::default());
    }

    #[tokio::test]
    async fn address_resolution_is_observed_and_ignored_when_detached() {
        let (registry, injected, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        injected.set_address_pending(true);

        registry.connect(ConnectorId::Injected, None).await.unwrap();
        assert!(registry.is_connected(ConnectorId::Injected));
        assert!(registry.address().is_none());

        assert!(registry.resolve_address(ConnectorId::Injected, ALICE).await);
        assert_eq!(registry.address().as_deref(), Some(ALICE));

        registry.disconnect(None).await;
        assert!(!registry.resolve_address(ConnectorId::Injected, ALICE).await);
        assert!(registry.address().is_none());
    }

    #[tokio::test]
    async fn chain_observation_respects_attachment() {
        let (registry, _, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        let first = registry.connect(ConnectorId::Injected, None).await.unwrap();
        registry.disconnect(None).await;
        registry.connect(ConnectorId::Injected, None).await.unwrap();

        assert!(
            !registry
                .observe_chain_for(first.attachment_id, ChainId::MAINNET)
                .await
        );
        assert!(registry.observe_chain(ChainId::MAINNET).await);
        assert!(!registry.observe_chain(ChainId::MAINNET).await);
        assert_eq!(
            registry.snapshot().personal.map(|c| c.chain_id),
            Some(ChainId::MAINNET)
        );
    }

    #[tokio::test]
    async fn event_log_is_capped_with_monotonic_ids() {
        let (registry, _, _) = registry_with(3);
        for _ in 0..4 {
            registry.connect(ConnectorId::Injected, None).await.unwrap();
            registry.disconnect(None).await;
        }

        let events = registry.events().await;
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].seq_id < w[1].seq_id));
        assert_eq!(events.last().map(|e| e.seq_id), Some(7));
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let (registry, _, _) = registry_with(DEFAULT_EVENT_LOG_CAP);
        let mut rx = registry.subscribe();

        registry.connect(ConnectorId::Injected, None).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().personal.is_some());

        registry.disconnect(None).await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().personal.is_none());
    }
}
