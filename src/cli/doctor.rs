//! `safelink doctor` - configuration and flow diagnostics.
//!
//! Validates the config file and env overrides, then drives the linking flow
//! once against sandbox wallets. Each check reports pass/fail with guidance.

use std::path::Path;

use crate::chain::ChainId;
use crate::cli::repl::SandboxSession;
use crate::config::LinkConfig;
use crate::link::{Phase, SafeLinkRequest};
use crate::observability::ObservabilityConfig;
use crate::settings::Settings;
use crate::wallet::ConnectorId;

/// Address used for the sandbox Safe in the flow self-test.
const SELF_TEST_SAFE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(config_path: &Path, strict: bool) -> anyhow::Result<()> {
    println!("safelink doctor");
    println!("===============\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    check(
        "Home directory",
        check_home_dir(&crate::bootstrap::safelink_home()),
        &mut passed,
        &mut failed,
    );

    let settings = Settings::load_or_default(config_path);
    check(
        "Config file",
        check_settings_file(config_path, &settings),
        &mut passed,
        &mut failed,
    );
    let settings = settings.unwrap_or_default();

    let link = LinkConfig::resolve(&settings).map_err(|e| e.to_string());
    check(
        "Link configuration",
        check_link_config(&link),
        &mut passed,
        &mut failed,
    );

    check(
        "Log format",
        match ObservabilityConfig::resolve(&settings) {
            Ok(config) => CheckResult::Pass(format!("{:?}", config.format).to_lowercase()),
            Err(e) => CheckResult::Fail(e.to_string()),
        },
        &mut passed,
        &mut failed,
    );

    let self_test = match link {
        Ok(link) => check_flow_self_test(link).await,
        Err(_) => CheckResult::Skip("link configuration is invalid".to_string()),
    };
    check("Linking flow self-test", self_test, &mut passed, &mut failed);

    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 && strict {
        anyhow::bail!("doctor strict mode failed with {failed} check(s)");
    }
    Ok(())
}

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_home_dir(dir: &Path) -> CheckResult {
    if dir.exists() {
        if dir.is_dir() {
            CheckResult::Pass(format!("{}", dir.display()))
        } else {
            CheckResult::Fail(format!("{} exists but is not a directory", dir.display()))
        }
    } else {
        CheckResult::Pass(format!("{} will be created on first run", dir.display()))
    }
}

fn check_settings_file(path: &Path, settings: &Result<Settings, String>) -> CheckResult {
    match settings {
        Ok(_) if path.exists() => CheckResult::Pass(format!("{}", path.display())),
        Ok(_) => CheckResult::Skip(format!(
            "{} not found, using defaults (run `safelink config init`)",
            path.display()
        )),
        Err(e) => CheckResult::Fail(format!("{}: {e}", path.display())),
    }
}

fn check_link_config(link: &Result<LinkConfig, String>) -> CheckResult {
    match link {
        Ok(link) => {
            let connectors: Vec<&str> = link.connectors.iter().map(|c| c.as_str()).collect();
            CheckResult::Pass(format!(
                "target {}, connectors [{}]",
                link.target_chain,
                connectors.join(", ")
            ))
        }
        Err(e) => CheckResult::Fail(e.clone()),
    }
}

/// Connect, switch, link, and disconnect against sandbox wallets.
async fn check_flow_self_test(link: LinkConfig) -> CheckResult {
    let target = link.target_chain;
    let Some(personal) = link
        .connectors
        .iter()
        .copied()
        .find(|c| *c != ConnectorId::GnosisSafe)
    else {
        return CheckResult::Fail("no personal connector configured".to_string());
    };
    let start = if target == ChainId::MAINNET {
        ChainId::GOERLI
    } else {
        ChainId::MAINNET
    };

    let session = SandboxSession::new(link, start);
    let orchestrator = &session.orchestrator;
    let steps = async {
        let mut trail = vec![orchestrator.phase()];
        trail.push(orchestrator.connect_personal(personal).await?);
        trail.push(orchestrator.switch_network().await?);
        trail.push(
            orchestrator
                .submit_safe_link(SafeLinkRequest::new(SELF_TEST_SAFE, target))
                .await?,
        );
        trail.push(orchestrator.disconnect(None).await);
        Ok::<_, crate::error::LinkError>(trail)
    };

    let expected = [
        Phase::Unauthenticated,
        Phase::NetworkMismatch,
        Phase::AwaitingSafeLink,
        Phase::Linked,
        Phase::Unauthenticated,
    ];
    match steps.await {
        Ok(trail) if trail == expected => CheckResult::Pass(
            trail
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" -> "),
        ),
        Ok(trail) => CheckResult::Fail(format!("unexpected phases {trail:?}")),
        Err(e) => CheckResult::Fail(e.to_string()),
    }
}
