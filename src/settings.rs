//! User settings persistence.
//!
//! Stores settings in `~/.safelink/config.toml`.
//! Settings are resolved with env var > config.toml > default priority.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Settings persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Chain both wallets must be on: a name ("goerli") or a decimal id.
    #[serde(default = "default_target_chain", alias = "active_chain")]
    pub target_chain: String,

    /// Connectors offered to the user, in display order.
    #[serde(default = "default_connectors", alias = "wallet_connectors")]
    pub connectors: Vec<String>,

    /// Maximum number of registry events kept in memory.
    #[serde(default = "default_event_log_cap")]
    pub event_log_cap: usize,

    /// Log output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_target_chain() -> String {
    "goerli".to_string()
}

fn default_connectors() -> Vec<String> {
    ["gnosis", "injected", "coinbase", "walletConnect"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_event_log_cap() -> usize {
    crate::wallet::DEFAULT_EVENT_LOG_CAP
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_chain: default_target_chain(),
            connectors: default_connectors(),
            event_log_cap: default_event_log_cap(),
            log_format: default_log_format(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.safelink/config.toml).
    pub fn default_toml_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".safelink")
            .join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        toml::from_str(&data)
            .map(Some)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        Ok(Self::load_toml(path)?.unwrap_or_default())
    }

    /// Write a commented TOML config file with current settings.
    pub fn save_toml(&self, path: &Path) -> Result<(), String> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize settings: {}", e))?;

        let content = format!(
            "# safelink configuration file.\n\
             #\n\
             # Priority: env var > this file > defaults.\n\
             # Run `safelink config init` to regenerate this file.\n\
             \n\
             {raw}"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
        }

        std::fs::write(path, content)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }
}
