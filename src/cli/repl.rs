//! Interactive REPL that drives the linking flow against sandbox wallets.
//!
//! Uses rustyline for line editing, history, and tab-completion. Lines are
//! read on a dedicated thread and handed to the async loop over a channel.
//!
//! ## Commands
//!
//! - `status` / `json` - Show the current phase and identities
//! - `connect <id>` - Attach a personal wallet
//! - `switch` - Ask the wallet to move to the target chain
//! - `safe <address>` - Fill in the Safe-link form
//! - `link [address] [chain]` - Submit the Safe link
//! - `disconnect [id]` - Disconnect everything, or only the Safe
//! - `help`, `quit`

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use rustyline::completion::Completer;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use tokio::sync::mpsc;

use crate::chain::ChainId;
use crate::config::LinkConfig;
use crate::link::{LinkOrchestrator, LinkView, SafeLinkRequest};
use crate::wallet::sandbox::{SandboxNetwork, SandboxSafe, SandboxWallet};
use crate::wallet::{ConnectionRegistry, ConnectionRole, ConnectorId, WalletConnector};

/// Commands available in the REPL.
const COMMANDS: &[&str] = &[
    "help",
    "status",
    "json",
    "connectors",
    "connect",
    "pending",
    "resolve",
    "chain",
    "switch",
    "reject",
    "safe",
    "link",
    "disconnect",
    "log",
    "quit",
    "exit",
];

/// Address every sandbox personal wallet resolves to.
pub const SANDBOX_PERSONAL_ADDRESS: &str = "0x9431cf5da0ce60664661341db650763b08286b18";

/// Orchestrator wired to sandbox connectors, plus handles to script them.
pub struct SandboxSession {
    pub orchestrator: LinkOrchestrator,
    pub network: Arc<SandboxNetwork>,
    pub wallets: HashMap<ConnectorId, Arc<SandboxWallet>>,
    pub safe: Arc<SandboxSafe>,
}

impl SandboxSession {
    pub fn new(config: LinkConfig, start_chain: ChainId) -> Self {
        let network = Arc::new(SandboxNetwork::new(start_chain));
        let safe = Arc::new(SandboxSafe::new().with_signer_network(network.clone()));

        let mut wallets = HashMap::new();
        let mut connectors: Vec<Arc<dyn WalletConnector>> = Vec::new();
        for id in &config.connectors {
            if id.role() == ConnectionRole::Safe {
                connectors.push(safe.clone());
                continue;
            }
            let wallet = Arc::new(SandboxWallet::on_network(
                *id,
                SANDBOX_PERSONAL_ADDRESS,
                network.clone(),
            ));
            wallets.insert(*id, wallet.clone());
            connectors.push(wallet);
        }

        let registry = Arc::new(ConnectionRegistry::new(connectors, config.event_log_cap));
        let orchestrator = LinkOrchestrator::new(config, registry, network.clone());
        Self {
            orchestrator,
            network,
            wallets,
            safe,
        }
    }

    fn wallet(&self, id: ConnectorId) -> Result<&Arc<SandboxWallet>, String> {
        self.wallets
            .get(&id)
            .ok_or_else(|| format!("'{id}' is not a configured personal connector"))
    }
}

/// Parsed REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Status,
    Json,
    Connectors,
    Connect(ConnectorId),
    Pending(ConnectorId),
    Resolve(String),
    Chain(ChainId),
    Switch,
    Reject(RejectTarget),
    Safe(String),
    Link {
        address: Option<String>,
        chain: Option<ChainId>,
    },
    Disconnect(Option<ConnectorId>),
    Log,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectTarget {
    Connector(ConnectorId),
    Network,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err("empty command".to_string());
        };
        let args: Vec<&str> = parts.collect();
        let arg = |i: usize, usage: &str| {
            args.get(i)
                .copied()
                .ok_or_else(|| format!("usage: {usage}"))
        };
        let chain = |value: &str| value.parse::<ChainId>().map_err(|e| e.to_string());

        let command = match head.trim_start_matches('/').to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "status" => Self::Status,
            "json" => Self::Json,
            "connectors" => Self::Connectors,
            "connect" => Self::Connect(arg(0, "connect <connector>")?.parse()?),
            "pending" => Self::Pending(arg(0, "pending <connector>")?.parse()?),
            "resolve" => Self::Resolve(arg(0, "resolve <address>")?.to_string()),
            "chain" => Self::Chain(chain(arg(0, "chain <name|id>")?)?),
            "switch" => Self::Switch,
            "reject" => match arg(0, "reject <connector|network>")? {
                "network" => Self::Reject(RejectTarget::Network),
                other => Self::Reject(RejectTarget::Connector(other.parse()?)),
            },
            "safe" => Self::Safe(arg(0, "safe <address>")?.to_string()),
            "link" => Self::Link {
                address: args.first().map(|a| a.to_string()),
                chain: args.get(1).copied().map(chain).transpose()?,
            },
            "disconnect" => Self::Disconnect(args.first().map(|a| a.parse()).transpose()?),
            "log" => Self::Log,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(command)
    }
}

/// Run one command and return the text to print.
pub async fn execute(session: &SandboxSession, command: ReplCommand) -> String {
    let orchestrator = &session.orchestrator;
    let result: Result<String, String> = match command {
        ReplCommand::Help => Ok(help_text()),
        ReplCommand::Status => Ok(render_view(&orchestrator.view())),
        ReplCommand::Json => serde_json::to_string_pretty(&orchestrator.view())
            .map_err(|e| format!("failed to serialize view: {e}")),
        ReplCommand::Connectors => Ok(orchestrator
            .registry()
            .descriptors()
            .iter()
            .map(|d| format!("  {:<14} {} ({})", d.id.as_str(), d.name, d.role()))
            .collect::<Vec<_>>()
            .join("\n")),
        ReplCommand::Connect(id) => orchestrator
            .connect_personal(id)
            .await
            .map(|phase| format!("connected {id}; phase: {phase}"))
            .map_err(|e| e.to_string()),
        ReplCommand::Pending(id) => session.wallet(id).map(|wallet| {
            wallet.set_address_pending(true);
            format!("{id} will attach without an address; use 'resolve <address>'")
        }),
        ReplCommand::Resolve(address) => {
            match orchestrator.registry().active_connector() {
                Some(active) => {
                    if orchestrator
                        .registry()
                        .resolve_address(active.id, &address)
                        .await
                    {
                        Ok(format!("resolved {address}; phase: {}", orchestrator.phase()))
                    } else {
                        Ok("nothing to resolve".to_string())
                    }
                }
                None => Err("no personal wallet attached".to_string()),
            }
        }
        ReplCommand::Chain(chain) => {
            session.network.set_chain(chain);
            let phase = orchestrator.refresh_chain().await;
            Ok(format!("wallet now on {chain}; phase: {phase}"))
        }
        ReplCommand::Switch => orchestrator
            .switch_network()
            .await
            .map(|phase| format!("switched to {}; phase: {phase}", orchestrator.target_chain()))
            .map_err(|e| e.to_string()),
        ReplCommand::Reject(RejectTarget::Network) => {
            session.network.reject_next_switch();
            Ok("next network switch will be rejected".to_string())
        }
        ReplCommand::Reject(RejectTarget::Connector(ConnectorId::GnosisSafe)) => {
            session.safe.reject_next_attach();
            Ok("next Safe connection will be rejected".to_string())
        }
        ReplCommand::Reject(RejectTarget::Connector(id)) => session.wallet(id).map(|wallet| {
            wallet.reject_next_attach();
            format!("next {id} connection will be rejected")
        }),
        ReplCommand::Safe(address) => {
            let draft = orchestrator.set_safe_address(&address);
            Ok(format!(
                "Safe form: {} on {}",
                draft.safe_address, draft.safe_chain_id
            ))
        }
        ReplCommand::Link { address, chain } => {
            let result = match address {
                Some(address) => {
                    let chain = chain.unwrap_or_else(|| orchestrator.target_chain());
                    orchestrator
                        .submit_safe_link(SafeLinkRequest::new(address, chain))
                        .await
                }
                None => orchestrator.submit_draft().await,
            };
            result
                .map(|phase| format!("Safe linked; phase: {phase}"))
                .map_err(|e| e.to_string())
        }
        ReplCommand::Disconnect(id) => {
            let phase = orchestrator.disconnect(id).await;
            Ok(format!("disconnected; phase: {phase}"))
        }
        ReplCommand::Log => Ok(orchestrator
            .registry()
            .events()
            .await
            .iter()
            .map(|e| {
                format!(
                    "  #{:<4} {:<16} {:<14} {}",
                    e.seq_id,
                    e.kind.as_str(),
                    e.connector.as_str(),
                    e.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
        ReplCommand::Quit => Ok(String::new()),
    };

    match result {
        Ok(text) => text,
        Err(err) => format!("error: {err}"),
    }
}

fn render_view(view: &LinkView) -> String {
    let mut lines = vec![
        format!("  phase:     {}", view.phase),
        format!("  target:    {}", view.target_chain),
    ];
    match (view.personal_connector, view.personal_address.as_deref()) {
        (Some(connector), Some(address)) => {
            lines.push(format!("  personal:  {address} via {connector}"))
        }
        (Some(connector), None) => {
            lines.push(format!("  personal:  <resolving> via {connector}"))
        }
        _ => lines.push("  personal:  -".to_string()),
    }
    if let Some(chain) = view.chain_id {
        lines.push(format!("  chain:     {chain}"));
    }
    lines.push(format!(
        "  safe:      {}",
        view.safe_address.as_deref().unwrap_or("-")
    ));
    lines.push(format!(
        "  next:      {}",
        view.allowed_actions
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    lines.join("\n")
}

fn help_text() -> String {
    [
        "  status                   show phase and identities",
        "  json                     show the view as JSON",
        "  connectors               list configured connectors",
        "  connect <id>             attach a personal wallet",
        "  pending <id>             next attach of <id> resolves no address",
        "  resolve <address>        complete address resolution",
        "  chain <name|id>          change chain inside the wallet",
        "  switch                   request a switch to the target chain",
        "  reject <id|network>      reject the next connect or switch",
        "  safe <address>           fill in the Safe form",
        "  link [address] [chain]   submit the Safe link",
        "  disconnect [id]          disconnect all, or only 'gnosis'",
        "  log                      registry events",
        "  quit                     exit",
    ]
    .join("\n")
}

/// Rustyline helper for command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = &line[..pos];
        if prefix.contains(' ') {
            return Ok((0, vec![]));
        }
        let matches: Vec<String> = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if line.is_empty() || line.contains(' ') || pos < line.len() {
            return None;
        }

        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

fn history_path() -> std::path::PathBuf {
    crate::bootstrap::safelink_home().join("history")
}

fn spawn_line_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let config = match Config::builder().history_ignore_dups(true) {
            Ok(builder) => builder
                .auto_add_history(true)
                .completion_type(CompletionType::List)
                .build(),
            Err(e) => {
                eprintln!("Failed to configure line editor: {e}");
                return;
            }
        };

        let mut rl = match Editor::with_config(config) {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("Failed to initialize line editor: {e}");
                return;
            }
        };
        rl.set_helper(Some(ReplHelper));

        let hist_path = history_path();
        if let Some(parent) = hist_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.load_history(&hist_path);

        loop {
            match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.blocking_send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send("quit".to_string());
                    break;
                }
                Err(e) => {
                    eprintln!("Input error: {e}");
                    break;
                }
            }
        }

        let _ = rl.save_history(&hist_path);
    });
}

/// Read commands until `quit` or end of input.
pub async fn run_repl(session: SandboxSession) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(32);
    spawn_line_reader(tx);

    println!(
        "\x1b[1msafelink\x1b[0m  target chain {}  'help' for commands, 'quit' to exit",
        session.orchestrator.target_chain()
    );
    println!();

    while let Some(line) = rx.recv().await {
        let command = match ReplCommand::parse(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(command) => command,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };
        println!("{}", execute(&session, command).await);
    }
    Ok(())
}
