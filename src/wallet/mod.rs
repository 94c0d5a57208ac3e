//! Wallet connectors, the network oracle seam, and the connection registry.

pub mod address;
mod connector;
mod network;
mod registry;
pub mod sandbox;

pub use self::connector::{
    Attachment, ConnectParams, ConnectionRole, ConnectorDescriptor, ConnectorId, WalletConnector,
};
pub use self::network::NetworkOracle;
pub use self::registry::{
    ActiveConnection, ConnectionRegistry, DEFAULT_EVENT_LOG_CAP, RegistryEvent,
    RegistryEventKind, RegistrySnapshot,
};
