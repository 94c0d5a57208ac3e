//! Connector identities and the wallet-provider seam.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::error::ConnectError;

/// Known wallet connector types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorId {
    #[serde(rename = "injected")]
    Injected,
    #[serde(rename = "metamask")]
    Metamask,
    #[serde(rename = "coinbase")]
    Coinbase,
    #[serde(rename = "walletConnect")]
    WalletConnect,
    #[serde(rename = "magic")]
    Magic,
    #[serde(rename = "gnosis")]
    GnosisSafe,
}

impl ConnectorId {
    pub const ALL: [ConnectorId; 6] = [
        Self::Injected,
        Self::Metamask,
        Self::Coinbase,
        Self::WalletConnect,
        Self::Magic,
        Self::GnosisSafe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Injected => "injected",
            Self::Metamask => "metamask",
            Self::Coinbase => "coinbase",
            Self::WalletConnect => "walletConnect",
            Self::Magic => "magic",
            Self::GnosisSafe => "gnosis",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Injected => "Browser Wallet",
            Self::Metamask => "MetaMask",
            Self::Coinbase => "Coinbase Wallet",
            Self::WalletConnect => "WalletConnect",
            Self::Magic => "Magic Link",
            Self::GnosisSafe => "Gnosis Safe",
        }
    }

    pub fn role(self) -> ConnectionRole {
        match self {
            Self::GnosisSafe => ConnectionRole::Safe,
            _ => ConnectionRole::Personal,
        }
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' ', '_'], "");
        match normalized.as_str() {
            "injected" => Ok(Self::Injected),
            "metamask" => Ok(Self::Metamask),
            "coinbase" | "coinbasewallet" | "walletlink" => Ok(Self::Coinbase),
            "walletconnect" | "wc" => Ok(Self::WalletConnect),
            "magic" | "magiclink" => Ok(Self::Magic),
            "gnosis" | "gnosissafe" | "safe" => Ok(Self::GnosisSafe),
            _ => Err(format!(
                "unknown connector '{s}': expected one of injected, metamask, coinbase, walletConnect, magic, gnosis"
            )),
        }
    }
}

/// Which slot of the session a connection occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    Personal,
    Safe,
}

impl ConnectionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Safe => "safe",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a configured connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorDescriptor {
    pub id: ConnectorId,
    pub name: &'static str,
}

impl ConnectorDescriptor {
    pub fn new(id: ConnectorId) -> Self {
        Self {
            id,
            name: id.display_name(),
        }
    }

    pub fn role(&self) -> ConnectionRole {
        self.id.role()
    }
}

/// Parameters passed to a connector on attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectParams {
    Safe {
        safe_address: String,
        safe_chain_id: ChainId,
    },
}

/// Identity reported by a connector after a successful attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// `None` while the provider is still resolving the account.
    pub address: Option<String>,
    pub chain_id: ChainId,
}

/// A wallet provider (injected, WalletConnect, Safe, ...).
///
/// Implementations own the provider popup / handshake. The Safe connector is
/// expected to validate the Safe address against chain-specific rules.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    fn id(&self) -> ConnectorId;

    async fn attach(&self, params: Option<&ConnectParams>) -> Result<Attachment, ConnectError>;

    async fn detach(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names_and_aliases() {
        assert_eq!("walletConnect".parse(), Ok(ConnectorId::WalletConnect));
        assert_eq!("wallet_connect".parse(), Ok(ConnectorId::WalletConnect));
        assert_eq!("gnosisSafe".parse(), Ok(ConnectorId::GnosisSafe));
        assert_eq!("safe".parse(), Ok(ConnectorId::GnosisSafe));
        assert_eq!("walletlink".parse(), Ok(ConnectorId::Coinbase));
        assert!("ledger".parse::<ConnectorId>().is_err());
    }

    #[test]
    fn only_gnosis_has_safe_role() {
        for id in ConnectorId::ALL {
            let expected = if id == ConnectorId::GnosisSafe {
                ConnectionRole::Safe
            } else {
                ConnectionRole::Personal
            };
            assert_eq!(id.role(), expected, "{id}");
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ConnectorId::WalletConnect).unwrap();
        assert_eq!(json, "\"walletConnect\"");
        let back: ConnectorId = serde_json::from_str("\"gnosis\"").unwrap();
        assert_eq!(back, ConnectorId::GnosisSafe);
    }
}
