use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use crate::aggregate::run_analyze;
use crate::config::RunArgs;
use crate::doctor::{DoctorArgs, run_doctor};
use crate::error::Result;
use crate::pipeline::run_pipeline;
use crate::report::{ReportArgs, run_report};
use crate::severity::CATALOG;
use crate::util::{OutputIntegration, output_for};

#[derive(Debug, Parser)]
#[command(
    name = "solbench",
    about = "Benchmark LLM-generated Solidity contracts: compile, analyze, test, score",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Pipeline flags, used when no subcommand is given.
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = "output/data.json")]
    pub data: PathBuf,

    #[arg(long, default_value = "output/stats.json")]
    pub output: PathBuf,
}

#[derive(Debug, Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Generate, verify, aggregate, report and archive.
    Run(RunArgs),

    /// Recompute stats.json from an existing data.json.
    Analyze(AnalyzeArgs),

    /// Render the HTML summary from stats.json.
    Report(ReportArgs),

    /// Validate environment and wiring.
    Doctor(DoctorArgs),

    /// Print the tracked analyzer checks and their severities.
    #[command(name = "list-checks")]
    ListChecks,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None => run_pipeline(cli.run),
        Some(Commands::Run(args)) => run_pipeline(args),
        Some(Commands::Analyze(args)) => run_analyze_command(&args, &OutputIntegration::detect()),
        Some(Commands::Report(args)) => run_report(args),
        Some(Commands::Doctor(args)) => run_doctor(args),
        Some(Commands::ListChecks) => {
            print_checks();
            Ok(())
        }
    }
}

fn run_analyze_command(args: &AnalyzeArgs, integration: &OutputIntegration) -> Result<()> {
    let ui = output_for(integration);
    let statistics = run_analyze(&args.data, &args.output)?;
    ui.success(&format!(
        "statistics for {} models: {}",
        statistics.models.len(),
        args.output.display()
    ));

    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "analyze",
                "status": "ok",
                "data": args.data.display().to_string(),
                "stats": args.output.display().to_string(),
                "models": statistics.models.len(),
                "integration": integration,
            })
        );
    }
    Ok(())
}

pub fn print_checks() {
    for (check_id, severity) in CATALOG {
        println!("{check_id}\t{severity}");
    }
}
