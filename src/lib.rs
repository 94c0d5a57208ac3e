//! safelink: link a personal wallet to a Gnosis Safe on a target chain.
//!
//! The [`wallet::ConnectionRegistry`] tracks which connectors are attached,
//! and the [`link::LinkOrchestrator`] derives a [`link::Phase`] from it and
//! gates user actions on that phase.

pub mod bootstrap;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod link;
pub mod observability;
pub mod settings;
pub mod wallet;

pub use chain::ChainId;
pub use config::{Config, LinkConfig};
pub use error::{ConnectError, Error, LinkError, SwitchError};
pub use link::{LinkAction, LinkOrchestrator, LinkView, Phase, SafeLinkRequest, compute_phase};
pub use wallet::{ConnectionRegistry, ConnectorId, NetworkOracle, WalletConnector};
