use clap::Parser;

use safelink::bootstrap;
use safelink::cli::repl::{SandboxSession, run_repl};
use safelink::cli::{Cli, Command, doctor, run_config_command};
use safelink::config::Config;
use safelink::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::load_safelink_env();
    let cli = Cli::parse();
    let config_path = cli.config_path();

    match cli.command {
        Command::Config { command } => run_config_command(&command, &config_path),
        Command::Doctor { strict } => doctor::run_doctor_command(&config_path, strict).await,
        Command::Repl { start_chain } => {
            let config = Config::load(&config_path)?;
            init_tracing(&config.observability);
            tracing::info!(
                target_chain = %config.link.target_chain,
                config = %config_path.display(),
                "Starting safelink REPL"
            );
            run_repl(SandboxSession::new(config.link, start_chain)).await
        }
    }
}
