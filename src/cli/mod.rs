//! Command-line interface.

pub mod doctor;
pub mod repl;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::chain::ChainId;
use crate::config::Config;
use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "safelink", version, about = "Link a personal wallet to a Gnosis Safe")]
pub struct Cli {
    /// Config file (default: ~/.safelink/config.toml).
    #[arg(long, global = true, env = "SAFELINK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(Settings::default_toml_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the linking flow interactively against sandbox wallets.
    Repl {
        /// Chain the sandbox wallet starts on.
        #[arg(long, default_value = "mainnet")]
        start_chain: ChainId,
    },
    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Check configuration and run the flow self-test.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print the settings file and the resolved configuration.
    Show,
    /// Write a config file with default settings.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run_config_command(command: &ConfigCommand, path: &Path) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            let settings = Settings::load_or_default(path).map_err(anyhow::Error::msg)?;
            let config = Config::resolve(&settings)?;
            println!("# {}", path.display());
            println!("{}", toml::to_string_pretty(&settings)?);
            println!("# resolved");
            println!("target_chain = {}", config.link.target_chain);
            let connectors: Vec<&str> = config.link.connectors.iter().map(|c| c.as_str()).collect();
            println!("connectors = [{}]", connectors.join(", "));
            println!("event_log_cap = {}", config.link.event_log_cap);
            println!("log_format = {:?}", config.observability.format);
            Ok(())
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Settings::default()
                .save_toml(path)
                .map_err(anyhow::Error::msg)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
