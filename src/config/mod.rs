//! Configuration for safelink.
//!
//! Values are resolved with priority: env var > `~/.safelink/config.toml` >
//! default. Env files (`./.env`, `~/.safelink/.env`) are loaded by
//! [`crate::bootstrap`] before resolution.

pub(crate) mod helpers;

use std::path::Path;

use crate::chain::ChainId;
use crate::error::ConfigError;
use crate::observability::ObservabilityConfig;
use crate::settings::Settings;
use crate::wallet::{ConnectionRole, ConnectorId, DEFAULT_EVENT_LOG_CAP};

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub link: LinkConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Resolve from env vars over already-loaded settings.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            link: LinkConfig::resolve(settings)?,
            observability: ObservabilityConfig::resolve(settings)?,
        })
    }

    /// Load the TOML file at `path` (defaults if missing) and resolve.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Settings::load_or_default(path).map_err(ConfigError::ParseError)?;
        Self::resolve(&settings)
    }
}

/// Linking flow configuration, passed to the orchestrator at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Chain both wallets must be on. Fixed for the life of the process.
    pub target_chain: ChainId,
    /// Connectors offered to the user, in display order.
    pub connectors: Vec<ConnectorId>,
    pub event_log_cap: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            target_chain: ChainId::GOERLI,
            connectors: vec![
                ConnectorId::GnosisSafe,
                ConnectorId::Injected,
                ConnectorId::Coinbase,
                ConnectorId::WalletConnect,
            ],
            event_log_cap: DEFAULT_EVENT_LOG_CAP,
        }
    }
}

impl LinkConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw_chain = helpers::optional_env("SAFELINK_TARGET_CHAIN")?
            .unwrap_or_else(|| settings.target_chain.clone());
        let target_chain = raw_chain
            .parse::<ChainId>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "SAFELINK_TARGET_CHAIN".to_string(),
                message: e.to_string(),
            })?;

        let connectors = match helpers::optional_env("SAFELINK_CONNECTORS")? {
            Some(raw) => parse_connectors(raw.split(','))?,
            None => parse_connectors(settings.connectors.iter().map(String::as_str))?,
        };

        let event_log_cap = helpers::optional_env("SAFELINK_EVENT_LOG_CAP")?
            .map(|s| s.trim().parse())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "SAFELINK_EVENT_LOG_CAP".to_string(),
                message: format!("must be a positive integer: {e}"),
            })?
            .unwrap_or(settings.event_log_cap);
        if event_log_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SAFELINK_EVENT_LOG_CAP".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            target_chain,
            connectors,
            event_log_cap,
        })
    }
}

fn parse_connectors<'a>(
    values: impl Iterator<Item = &'a str>,
) -> Result<Vec<ConnectorId>, ConfigError> {
    let mut connectors = Vec::new();
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        let id = value
            .parse::<ConnectorId>()
            .map_err(|message| ConfigError::InvalidValue {
                key: "SAFELINK_CONNECTORS".to_string(),
                message,
            })?;
        if !connectors.contains(&id) {
            connectors.push(id);
        }
    }

    if !connectors.contains(&ConnectorId::GnosisSafe) {
        return Err(ConfigError::MissingRequired {
            key: "SAFELINK_CONNECTORS".to_string(),
            hint: "Include 'gnosis' so a Safe can be linked.".to_string(),
        });
    }
    if !connectors
        .iter()
        .any(|c| c.role() == ConnectionRole::Personal)
    {
        return Err(ConfigError::MissingRequired {
            key: "SAFELINK_CONNECTORS".to_string(),
            hint: "Include at least one personal wallet connector (e.g. 'injected').".to_string(),
        });
    }
    Ok(connectors)
}
