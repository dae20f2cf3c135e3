use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use clap::Args;
use serde_json::json;

use crate::backend::{BackendConfig, DEFAULT_ENDPOINT, OllamaBackend};
use crate::dataset::load_dataset;
use crate::error::{BenchError, Result};
use crate::tools::{DEFAULT_ANALYZER, DEFAULT_COMPILER, DEFAULT_TEST_RUNNER, ToolCommand};
use crate::util::{
    CliOutput, OutputIntegration, command_exists, ensure_exists, output_for, require_command,
};
use crate::workspace::DEFAULT_TEST_WORKSPACE;

#[derive(Debug, Clone, Args)]
pub struct DoctorArgs {
    #[arg(long, default_value = "simple_dataset.csv")]
    pub dataset: PathBuf,

    #[arg(long = "test-workspace", default_value = DEFAULT_TEST_WORKSPACE)]
    pub test_workspace: PathBuf,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    #[arg(long, default_value = DEFAULT_COMPILER)]
    pub compiler: String,

    #[arg(long, default_value = DEFAULT_ANALYZER)]
    pub analyzer: String,

    #[arg(long = "test-runner", default_value = DEFAULT_TEST_RUNNER)]
    pub test_runner: String,

    /// Skip the backend reachability check.
    #[arg(long)]
    pub offline: bool,
}

fn check_command(name: &str, ui: &CliOutput) -> Result<()> {
    match require_command(name) {
        Ok(()) => {
            ui.success(&format!("command available: {name}"));
            Ok(())
        }
        Err(error) => {
            ui.error(&format!("command missing: {name}"));
            Err(error)
        }
    }
}

fn run_help_check(exe: &Path, command: &str) -> Result<()> {
    let status = Command::new(exe)
        .arg(command)
        .arg("--help")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(BenchError::exit(
            status.code().unwrap_or(1),
            format!("help check failed for command: {command}"),
        ))
    }
}

/// Hardhat projects are recognized by their config file.
fn has_hardhat_config(workspace: &Path) -> bool {
    ["hardhat.config.js", "hardhat.config.ts", "hardhat.config.cjs"]
        .iter()
        .any(|name| workspace.join(name).exists())
}

pub fn run_doctor(args: DoctorArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    run_doctor_with_integration(args, &integration)
}

pub(crate) fn run_doctor_with_integration(
    args: DoctorArgs,
    integration: &OutputIntegration,
) -> Result<()> {
    let ui = output_for(integration);

    ui.rule(Some("solbench doctor"));
    ui.info(&format!("dataset={}", args.dataset.display()));
    ui.info(&format!("test_workspace={}", args.test_workspace.display()));
    ui.info(&format!("endpoint={}", args.endpoint));

    ui.rule(Some("environment detection"));
    ui.info(&format!(
        "fastapi_output mode={} agent={} ci={} tty={}",
        integration.fastapi_mode,
        integration.fastapi_agent,
        integration.fastapi_ci,
        integration.fastapi_tty
    ));
    ui.info(&format!(
        "sqlmodel_console mode={} agent={}",
        integration.sqlmodel_mode, integration.sqlmodel_agent
    ));

    ui.rule(Some("tool checks"));
    for raw in [&args.compiler, &args.analyzer, &args.test_runner] {
        let command = ToolCommand::parse(raw)?;
        check_command(&command.program, &ui)?;
    }
    if command_exists("solc-select") {
        ui.success("command available: solc-select");
    } else {
        ui.warning("command missing: solc-select (compiler version will not be pinned)");
    }

    ui.rule(Some("workspace checks"));
    ensure_exists(&args.test_workspace)?;
    ui.success("test workspace exists");
    if has_hardhat_config(&args.test_workspace) {
        ui.success("hardhat config found");
    } else {
        ui.warning("no hardhat.config.* in test workspace");
    }

    let prompts = load_dataset(&args.dataset)?;
    let without_tests = prompts
        .iter()
        .filter(|prompt| prompt.test_source.is_none())
        .count();
    ui.success(&format!("dataset loaded: {} prompts", prompts.len()));
    if without_tests > 0 {
        ui.warning(&format!("{without_tests} prompts have no ```js test block"));
    }

    ui.rule(Some("script help checks"));
    let current_exe = std::env::current_exe()?;
    for command in ["run", "analyze", "report"] {
        run_help_check(&current_exe, command)?;
    }
    ui.success("help checks passed");

    let backend_status = if args.offline {
        ui.warning("backend check skipped (--offline)");
        "skipped"
    } else {
        ui.rule(Some("backend check"));
        let backend = OllamaBackend::new(&BackendConfig {
            endpoint: args.endpoint.clone(),
            timeout_seconds: 10,
        })?;
        backend.ping()?;
        ui.success(&format!("backend reachable: {}", backend.endpoint()));
        "ok"
    };

    ui.success("doctor completed successfully");

    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "doctor",
                "status": "ok",
                "dataset": args.dataset.display().to_string(),
                "prompts": prompts.len(),
                "prompts_without_tests": without_tests,
                "test_workspace": args.test_workspace.display().to_string(),
                "backend": backend_status,
                "integration": integration,
            })
        );
    }
    Ok(())
}
