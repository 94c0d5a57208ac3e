//! Chain identifiers and the named-chain table used for configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// EVM chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: ChainId = ChainId(1);
    pub const GOERLI: ChainId = ChainId(5);
    pub const SEPOLIA: ChainId = ChainId(11_155_111);
    pub const POLYGON: ChainId = ChainId(137);
    pub const MUMBAI: ChainId = ChainId(80_001);

    pub fn id(self) -> u64 {
        self.0
    }

    /// Canonical name for well-known chains.
    pub fn name(self) -> Option<&'static str> {
        NAMED_CHAINS
            .iter()
            .find(|(_, id)| *id == self.0)
            .map(|(name, _)| *name)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Error returned when a chain name or id cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chain '{0}': expected a chain name (e.g. 'goerli') or a decimal chain id")]
pub struct UnknownChain(pub String);

const NAMED_CHAINS: &[(&str, u64)] = &[
    ("mainnet", 1),
    ("goerli", 5),
    ("sepolia", 11_155_111),
    ("polygon", 137),
    ("mumbai", 80_001),
    ("optimism", 10),
    ("optimism_goerli", 420),
    ("arbitrum", 42_161),
    ("arbitrum_goerli", 421_613),
    ("avalanche", 43_114),
    ("avalanche_fuji", 43_113),
    ("fantom", 250),
    ("fantom_testnet", 4_002),
    ("binance", 56),
    ("binance_testnet", 97),
    ("localhost", 1_337),
    ("hardhat", 31_337),
];

impl FromStr for ChainId {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<u64>() {
            if id == 0 {
                return Err(UnknownChain(s.to_string()));
            }
            return Ok(Self(id));
        }

        let normalized = trimmed.to_ascii_lowercase().replace(['-', ' '], "_");
        let normalized = match normalized.as_str() {
            "ethereum" | "homestead" => "mainnet",
            "matic" => "polygon",
            "bsc" => "binance",
            "bsc_testnet" => "binance_testnet",
            "fuji" => "avalanche_fuji",
            other => other,
        };
        NAMED_CHAINS
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, id)| Self(*id))
            .ok_or_else(|| UnknownChain(s.to_string()))
    }
}
