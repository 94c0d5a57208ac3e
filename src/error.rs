//! Error types for safelink.

use crate::chain::ChainId;
use crate::link::{LinkAction, Phase};
use crate::wallet::{ConnectionRole, ConnectorId};

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Network switch error: {0}")]
    Switch(#[from] SwitchError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures attaching a wallet connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid Safe parameters: {0}")]
    InvalidSafeParams(String),

    #[error("Connector '{0}' is not configured")]
    UnknownConnector(ConnectorId),

    #[error("Connection request rejected by the user")]
    Rejected,

    #[error("Connection request timed out")]
    TimedOut,

    #[error("Connection attempt for '{0}' was superseded by a disconnect")]
    Superseded(ConnectorId),

    #[error("Wallet provider error: {0}")]
    Provider(String),
}

/// Failures requesting a network switch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchError {
    #[error("Network switch rejected by the user")]
    Rejected,

    #[error("Wallet does not support switching to chain {0}")]
    Unsupported(ChainId),

    #[error("Network provider error: {0}")]
    Provider(String),
}

/// Failures surfaced by the link orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("Invalid Safe parameters: {0}")]
    InvalidSafeParams(String),

    #[error(transparent)]
    Connect(ConnectError),

    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error("Action '{action}' is not allowed in phase '{phase}'")]
    ActionNotAllowed { action: LinkAction, phase: Phase },

    #[error("Connector '{connector}' is not a {expected} connector")]
    WrongRole {
        connector: ConnectorId,
        expected: ConnectionRole,
    },
}

impl From<ConnectError> for LinkError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::InvalidSafeParams(message) => Self::InvalidSafeParams(message),
            other => Self::Connect(other),
        }
    }
}

impl LinkError {
    /// Whether re-invoking the same action may succeed without other changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(err) => matches!(
                err,
                ConnectError::Rejected | ConnectError::TimedOut | ConnectError::Provider(_)
            ),
            Self::Switch(err) => matches!(err, SwitchError::Rejected | SwitchError::Provider(_)),
            Self::InvalidSafeParams(_) | Self::ActionNotAllowed { .. } | Self::WrongRole { .. } => {
                false
            }
        }
    }
}
