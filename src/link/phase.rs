//! Linking phases and the pure rule that selects one.

use std::fmt;

use serde::Serialize;

use crate::chain::ChainId;
use crate::wallet::RegistrySnapshot;

/// Stage of the linking flow presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No personal address resolved yet.
    Unauthenticated,
    /// Personal wallet is on a chain other than the target.
    NetworkMismatch,
    /// On the target chain, Safe not linked.
    AwaitingSafeLink,
    /// Personal and Safe wallets both connected.
    Linked,
}

/// User actions routed through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    ConnectPersonal,
    SwitchNetwork,
    SubmitSafeLink,
    Disconnect,
}

impl LinkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectPersonal => "connect_personal",
            Self::SwitchNetwork => "switch_network",
            Self::SubmitSafeLink => "submit_safe_link",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for LinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NetworkMismatch => "network_mismatch",
            Self::AwaitingSafeLink => "awaiting_safe_link",
            Self::Linked => "linked",
        }
    }

    /// Phase from raw observations. The chain check runs before the Safe
    /// check, so a Safe left over from another chain still reports a
    /// mismatch.
    pub fn from_inputs(
        personal_address: Option<&str>,
        chain_id: Option<ChainId>,
        safe_connected: bool,
        target: ChainId,
    ) -> Self {
        if personal_address.is_none() {
            return Self::Unauthenticated;
        }
        if chain_id != Some(target) {
            return Self::NetworkMismatch;
        }
        if safe_connected {
            Self::Linked
        } else {
            Self::AwaitingSafeLink
        }
    }

    /// Actions enabled in this phase. Disconnect is always available.
    pub fn allowed_actions(self) -> &'static [LinkAction] {
        match self {
            Self::Unauthenticated => &[LinkAction::ConnectPersonal, LinkAction::Disconnect],
            Self::NetworkMismatch => &[LinkAction::SwitchNetwork, LinkAction::Disconnect],
            Self::AwaitingSafeLink => &[LinkAction::SubmitSafeLink, LinkAction::Disconnect],
            Self::Linked => &[LinkAction::Disconnect],
        }
    }

    pub fn allows(self, action: LinkAction) -> bool {
        self.allowed_actions().contains(&action)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase for a registry snapshot.
pub fn compute_phase(snapshot: &RegistrySnapshot, target: ChainId) -> Phase {
    Phase::from_inputs(
        snapshot.personal_address(),
        snapshot.personal.as_ref().map(|c| c.chain_id),
        snapshot.safe.is_some(),
        target,
    )
}
