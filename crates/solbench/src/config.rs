use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

use crate::backend::{BackendConfig, DEFAULT_ENDPOINT};
use crate::error::{BenchError, Result};
use crate::tools::{
    DEFAULT_ANALYZER, DEFAULT_COMPILER, DEFAULT_SOLC_VERSION, DEFAULT_TEST_RUNNER, StageRunner,
    ToolCommand,
};
use crate::util::{check_path_component, env_flag_enabled};
use crate::workspace::DEFAULT_TEST_WORKSPACE;

pub const DEFAULT_MODELS: &str = "llama3,gemma,mistral,codegemma,codellama";
pub const ALLOW_MISSING_TESTS_ENV: &str = "SOLBENCH_ALLOW_MISSING_TESTS";
pub const SKIP_ARCHIVE_ENV: &str = "SOLBENCH_SKIP_ARCHIVE";

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Comma-separated model names.
    #[arg(long, default_value = DEFAULT_MODELS)]
    pub models: String,

    #[arg(long, default_value_t = 1)]
    pub iterations: u32,

    #[arg(long, default_value_t = 0.2)]
    pub temperature: f64,

    #[arg(long, default_value = "simple_dataset.csv")]
    pub dataset: PathBuf,

    #[arg(long, default_value = "output")]
    pub output: PathBuf,

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

    #[arg(long = "solc-version", default_value = DEFAULT_SOLC_VERSION)]
    pub solc_version: String,

    /// Do not call `solc-select` before the run.
    #[arg(long = "skip-solc-select")]
    pub skip_solc_select: bool,

    #[arg(long = "generation-timeout-seconds", default_value_t = 600)]
    pub generation_timeout_seconds: u64,

    #[arg(long = "tool-timeout-seconds", default_value_t = 600)]
    pub tool_timeout_seconds: u64,

    /// Run prompts that carry no ```js test block instead of refusing.
    #[arg(long = "allow-missing-tests")]
    pub allow_missing_tests: bool,

    #[arg(long = "skip-archive")]
    pub skip_archive: bool,

    #[arg(long = "skip-report")]
    pub skip_report: bool,
}

/// Flags that may also be switched on from the environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides {
    pub allow_missing_tests: bool,
    pub skip_archive: bool,
}

impl EnvOverrides {
    #[must_use]
    pub fn detect() -> Self {
        Self {
            allow_missing_tests: env_flag_enabled(ALLOW_MISSING_TESTS_ENV),
            skip_archive: env_flag_enabled(SKIP_ARCHIVE_ENV),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub models: Vec<String>,
    pub iterations: u32,
    pub temperature: f64,
    pub dataset: PathBuf,
    pub output_dir: PathBuf,
    pub test_workspace: PathBuf,
    pub endpoint: String,
    pub compiler: ToolCommand,
    pub analyzer: ToolCommand,
    pub test_runner: ToolCommand,
    pub solc_version: Option<String>,
    pub generation_timeout_seconds: u64,
    pub tool_timeout_seconds: u64,
    pub allow_missing_tests: bool,
    pub skip_archive: bool,
    pub skip_report: bool,
}

fn parse_models(raw: &str) -> Vec<String> {
    let mut models = Vec::new();
    for model in raw.split(',').map(str::trim).filter(|model| !model.is_empty()) {
        if !models.iter().any(|seen: &String| seen == model) {
            models.push(model.to_string());
        }
    }
    models
}

impl PipelineConfig {
    pub fn from_args(args: RunArgs, overrides: EnvOverrides) -> Result<Self> {
        let models = parse_models(&args.models);
        if models.is_empty() {
            return Err(BenchError::invalid("--models must name at least one model"));
        }
        for model in &models {
            check_path_component("model name", model)?;
        }
        if args.iterations == 0 {
            return Err(BenchError::invalid("--iterations must be at least 1"));
        }
        if !args.temperature.is_finite() || args.temperature < 0.0 {
            return Err(BenchError::invalid(
                "--temperature must be a non-negative number",
            ));
        }
        if args.generation_timeout_seconds == 0 || args.tool_timeout_seconds == 0 {
            return Err(BenchError::invalid("timeouts must be at least one second"));
        }

        let solc_version = if args.skip_solc_select || args.solc_version.trim().is_empty() {
            None
        } else {
            Some(args.solc_version.trim().to_string())
        };

        Ok(Self {
            models,
            iterations: args.iterations,
            temperature: args.temperature,
            dataset: args.dataset,
            output_dir: args.output,
            test_workspace: args.test_workspace,
            endpoint: args.endpoint,
            compiler: ToolCommand::parse(&args.compiler)?,
            analyzer: ToolCommand::parse(&args.analyzer)?,
            test_runner: ToolCommand::parse(&args.test_runner)?,
            solc_version,
            generation_timeout_seconds: args.generation_timeout_seconds,
            tool_timeout_seconds: args.tool_timeout_seconds,
            allow_missing_tests: args.allow_missing_tests || overrides.allow_missing_tests,
            skip_archive: args.skip_archive || overrides.skip_archive,
            skip_report: args.skip_report,
        })
    }

    #[must_use]
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            endpoint: self.endpoint.clone(),
            timeout_seconds: self.generation_timeout_seconds,
        }
    }

    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }

    #[must_use]
    pub fn stage_runner(&self) -> StageRunner {
        StageRunner {
            compiler: self.compiler.clone(),
            analyzer: self.analyzer.clone(),
            test_runner: self.test_runner.clone(),
            timeout: self.tool_timeout(),
        }
    }

    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.output_dir.join("data.json")
    }

    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.output_dir.join("stats.json")
    }

    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.output_dir.join("events.jsonl")
    }

    #[must_use]
    pub fn run_meta_path(&self) -> PathBuf {
        self.output_dir.join("run_meta.json")
    }

    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("index.html")
    }

    #[must_use]
    pub fn extracted_tests_dir(&self) -> PathBuf {
        self.output_dir.join("extracted_tests")
    }
}
