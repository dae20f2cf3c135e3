//! Sequential benchmark driver: generate, verify, persist, aggregate, report,
//! archive.

use std::path::PathBuf;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use serde_json::json;

use crate::aggregate::{Statistics, aggregate};
use crate::archive::{archive_output, default_archive_path};
use crate::artifact::generate;
use crate::backend::{GenerationBackend, OllamaBackend};
use crate::config::{EnvOverrides, PipelineConfig, RunArgs};
use crate::dataset::{Prompt, check_test_sources, load_dataset, write_extracted_tests};
use crate::error::{BenchError, Result};
use crate::report::{DEFAULT_TITLE, write_report};
use crate::runmeta::{IterationEvent, RunMeta};
use crate::store::{ResultStore, RunRecord};
use crate::tools::{StageRunner, ToolOutcome, prepare_solc};
use crate::util::{
    CliOutput, OutputIntegration, ensure_dir, format_utc_iso, now_utc_iso, output_for, reset_dir,
};
use crate::workspace::TestWorkspace;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub models: Vec<String>,
    pub prompts: Vec<String>,
    pub iterations_ok: u64,
    pub iterations_failed: u64,
    pub data_path: PathBuf,
    pub stats_path: PathBuf,
    pub report_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    #[serde(skip)]
    pub statistics: Statistics,
}

fn model_spinner(model: &str, enabled: bool) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    if !enabled {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .map_err(|error| BenchError::invalid(format!("spinner template: {error}")))?,
    );
    bar.set_message(format!("{model}: processing..."));
    Ok(bar)
}

fn stage_event(
    model: &str,
    prompt: &str,
    iteration: u32,
    stage: &str,
    outcome: &ToolOutcome,
) -> IterationEvent {
    IterationEvent {
        timestamp: now_utc_iso(),
        model: model.to_string(),
        prompt: prompt.to_string(),
        iteration,
        stage: stage.to_string(),
        status: if outcome.succeeded() { "ok" } else { "failed" }.to_string(),
        return_code: Some(outcome.return_code),
        detail: None,
    }
}

struct Pipeline<'a> {
    config: &'a PipelineConfig,
    backend: &'a dyn GenerationBackend,
    runner: StageRunner,
    workspace: TestWorkspace,
    ui: CliOutput,
}

impl Pipeline<'_> {
    /// The ledger is diagnostic; losing a line must not lose the run.
    fn log_event(&self, event: &IterationEvent) {
        if let Err(error) = event.append_jsonl(&self.config.events_path()) {
            self.ui
                .warning(&format!("events ledger not updated ({}): {error}", event.stage));
        }
    }

    /// One (model, prompt, iteration). Any failure becomes an error record.
    fn run_iteration(&mut self, model: &str, prompt: &Prompt, iteration: u32) -> RunRecord {
        let artifact = match generate(
            self.backend,
            model,
            prompt,
            iteration,
            self.config.temperature,
            &self.config.output_dir,
        ) {
            Ok(artifact) => artifact,
            Err(error) => {
                self.record_failure(model, &prompt.id, iteration, "generation", &error);
                return RunRecord::generation_error();
            }
        };

        self.log_event(&IterationEvent {
            timestamp: now_utc_iso(),
            model: model.to_string(),
            prompt: prompt.id.clone(),
            iteration,
            stage: "generation".to_string(),
            status: "ok".to_string(),
            return_code: None,
            detail: Some(format!("sha256={}", artifact.sha256)),
        });

        let verification = match self.runner.verify(
            &artifact.source_path,
            prompt.test_source.as_deref(),
            &mut self.workspace,
        ) {
            Ok(verification) => verification,
            Err(error) => {
                self.record_failure(model, &prompt.id, iteration, "iteration", &error);
                return RunRecord::generation_error();
            }
        };

        for (stage, outcome) in [
            ("compilation", &verification.compilation),
            ("slither", &verification.slither),
            ("testing", &verification.testing),
        ] {
            self.log_event(&stage_event(model, &prompt.id, iteration, stage, outcome));
        }

        RunRecord::completed(
            artifact.raw_response,
            artifact.prompt_infos,
            artifact.sha256,
            verification,
        )
    }

    fn record_failure(
        &self,
        model: &str,
        prompt: &str,
        iteration: u32,
        stage: &str,
        error: &BenchError,
    ) {
        self.log_event(&IterationEvent {
            timestamp: now_utc_iso(),
            model: model.to_string(),
            prompt: prompt.to_string(),
            iteration,
            stage: stage.to_string(),
            status: "error".to_string(),
            return_code: None,
            detail: Some(error.to_string()),
        });
    }

    fn run_model(
        &mut self,
        model: &str,
        prompts: &[Prompt],
        store: &mut ResultStore,
    ) -> Result<(u64, u64)> {
        let spinner = model_spinner(model, self.ui.enabled())?;
        let prompt_total = prompts.len();
        let iterations = self.config.iterations;
        let mut ok = 0_u64;
        let mut failed = 0_u64;
        let mut total_duration_ns = 0_u64;

        store.ensure_model(model);
        ensure_dir(&self.config.output_dir.join(model))?;

        for (position, prompt) in prompts.iter().enumerate() {
            let position = position + 1;
            for iteration in 0..iterations {
                spinner.set_message(format!(
                    "{model}: {} [{position}/{prompt_total}] iteration [{}/{iterations}]",
                    prompt.id,
                    iteration + 1
                ));
                spinner.tick();

                let record = self.run_iteration(model, prompt, iteration);
                let line = if record.is_error() {
                    failed += 1;
                    format!(
                        "Error! contract: [{position}/{prompt_total}], iteration: [{}/{iterations}]",
                        iteration + 1
                    )
                } else {
                    ok += 1;
                    total_duration_ns += record.total_duration_ns();
                    format!(
                        "Process finished! contract: [{position}/{prompt_total}], iteration: [{}/{iterations}]",
                        iteration + 1
                    )
                };
                spinner.println(line);
                store.insert(model, &prompt.id, iteration, record);
            }
            store.save(&self.config.data_path())?;
        }

        spinner.finish_with_message(format!("{model}: done! {} outputs", ok + failed));
        self.ui.info(&format!(
            "{model}: total generation time {:.2}s",
            total_duration_ns as f64 / 1e9
        ));
        Ok((ok, failed))
    }
}

fn print_prompt_table(prompts: &[Prompt], ui: &CliOutput) {
    ui.rule(Some("dataset"));
    for prompt in prompts {
        let tests = if prompt.test_source.is_some() {
            "tests"
        } else {
            "no tests"
        };
        ui.info(&format!(
            "- {}: {} chars [{tests}]",
            prompt.id,
            prompt.spec_text.chars().count()
        ));
    }
}

fn prepare_toolchain(config: &PipelineConfig, ui: &CliOutput) {
    let Some(version) = config.solc_version.as_deref() else {
        return;
    };
    match prepare_solc(version, config.tool_timeout()) {
        None => ui.warning("solc-select not found; using the solc already on PATH"),
        Some(preparation) => {
            for (step, outcome) in preparation.failures() {
                ui.warning(&format!(
                    "{step} exited with {}: {}",
                    outcome.return_code,
                    outcome.stderr.trim()
                ));
            }
            if preparation.failures().is_empty() {
                ui.success(&format!("solc {version} selected"));
            }
        }
    }
}

fn base_run_meta(
    config: &PipelineConfig,
    integration: &OutputIntegration,
    started_at: &str,
) -> RunMeta {
    RunMeta {
        status: "running".to_string(),
        started_at: started_at.to_string(),
        models: config.models.clone(),
        iterations: config.iterations,
        temperature: config.temperature,
        dataset: config.dataset.display().to_string(),
        output_dir: config.output_dir.display().to_string(),
        test_workspace: config.test_workspace.display().to_string(),
        endpoint: config.endpoint.clone(),
        compiler: config.compiler.display(),
        analyzer: config.analyzer.display(),
        test_runner: config.test_runner.display(),
        solc_version: config.solc_version.clone().unwrap_or_default(),
        generation_timeout_seconds: config.generation_timeout_seconds,
        tool_timeout_seconds: config.tool_timeout_seconds,
        fastapi_output_mode: Some(integration.fastapi_mode.clone()),
        fastapi_agent_mode: Some(integration.fastapi_agent),
        sqlmodel_output_mode: Some(integration.sqlmodel_mode.clone()),
        sqlmodel_agent_mode: Some(integration.sqlmodel_agent),
        ..RunMeta::default()
    }
}

/// Runs the whole benchmark against `backend`.
pub fn run_pipeline_with_backend(
    config: &PipelineConfig,
    backend: &dyn GenerationBackend,
    integration: &OutputIntegration,
) -> Result<PipelineSummary> {
    let ui = output_for(integration);
    let started = Utc::now();
    let started_at = format_utc_iso(started);

    ui.rule(Some("solbench pipeline"));
    ui.info(&format!(
        "models={} iterations={} temperature={}",
        config.models.join(","),
        config.iterations,
        config.temperature
    ));

    let prompts = load_dataset(&config.dataset)?;
    check_test_sources(&prompts, config.allow_missing_tests)?;
    print_prompt_table(&prompts, &ui);

    let workspace = TestWorkspace::open(&config.test_workspace)?;
    reset_dir(&config.output_dir)?;
    write_extracted_tests(&prompts, &config.extracted_tests_dir())?;
    prepare_toolchain(config, &ui);

    let mut meta = base_run_meta(config, integration, &started_at);
    meta.prompts = prompts.iter().map(|prompt| prompt.id.clone()).collect();
    meta.write_to_path(&config.run_meta_path())?;

    let mut pipeline = Pipeline {
        config,
        backend,
        runner: config.stage_runner(),
        workspace,
        ui: ui.clone(),
    };

    let mut store = ResultStore::new();
    let mut iterations_ok = 0_u64;
    let mut iterations_failed = 0_u64;
    for model in &config.models {
        ui.rule(Some(model));
        match pipeline.run_model(model, &prompts, &mut store) {
            Ok((ok, failed)) => {
                iterations_ok += ok;
                iterations_failed += failed;
            }
            Err(error) => {
                meta.status = "failed".to_string();
                meta.finished_at = Some(now_utc_iso());
                let _ = meta.write_to_path(&config.run_meta_path());
                return Err(error);
            }
        }
    }

    let data_path = config.data_path();
    store.save(&data_path)?;

    ui.rule(Some("analysis"));
    let statistics = aggregate(&store);
    let stats_path = config.stats_path();
    statistics.save(&stats_path)?;
    ui.success(&format!("statistics: {}", stats_path.display()));

    let report_path = if config.skip_report {
        None
    } else {
        let path = config.report_path();
        write_report(&statistics, &stats_path, &path, DEFAULT_TITLE)?;
        ui.success(&format!("report HTML: {}", path.display()));
        Some(path)
    };

    let archive_path = if config.skip_archive {
        None
    } else {
        Some(default_archive_path(&config.output_dir)?)
    };

    let finished = Utc::now();
    meta.status = "ok".to_string();
    meta.finished_at = Some(format_utc_iso(finished));
    meta.duration_seconds = Some((finished - started).num_seconds());
    meta.iterations_ok = Some(iterations_ok);
    meta.iterations_failed = Some(iterations_failed);
    meta.report = report_path.as_ref().map(|path| path.display().to_string());
    meta.archive = archive_path.as_ref().map(|path| path.display().to_string());
    meta.write_to_path(&config.run_meta_path())?;

    if let Some(archive) = &archive_path {
        archive_output(&config.output_dir, archive)?;
        ui.success(&format!("archive: {}", archive.display()));
    }

    Ok(PipelineSummary {
        models: config.models.clone(),
        prompts: meta.prompts,
        iterations_ok,
        iterations_failed,
        data_path,
        stats_path,
        report_path,
        archive_path,
        statistics,
    })
}

pub fn run_pipeline(args: RunArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    let config = PipelineConfig::from_args(args, EnvOverrides::detect())?;
    let backend = OllamaBackend::new(&config.backend_config())?;
    let summary = run_pipeline_with_backend(&config, &backend, &integration)?;

    output_for(&integration).success(&format!(
        "pipeline finished: {} ok, {} failed iterations",
        summary.iterations_ok, summary.iterations_failed
    ));

    if integration.should_emit_json() {
        println!(
            "{}",
            json!({
                "command": "run",
                "status": "ok",
                "summary": summary,
                "integration": integration,
            })
        );
    }
    Ok(())
}
