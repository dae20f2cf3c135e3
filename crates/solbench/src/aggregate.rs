//! Reduces a [`ResultStore`] into per-model and per-prompt statistics.
//!
//! Ratios are taken over compiled records only. Records without all three
//! stage outcomes (failed generations) are left out of every counter and
//! only show up in [`GenerationStats::errors`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::severity::{CATALOG, Severity, count_marker};
use crate::store::{Outcomes, ResultStore, RunRecord};
use crate::util::write_string;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(rename = "Low")]
    pub low: u64,
    #[serde(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "High")]
    pub high: u64,
    #[serde(rename = "Informational")]
    pub informational: u64,
    #[serde(rename = "Optimization")]
    pub optimization: u64,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity, count: u64) {
        let slot = match severity {
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Informational => &mut self.informational,
            Severity::Optimization => &mut self.optimization,
        };
        *slot += count;
    }

    #[must_use]
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Informational => self.informational,
            Severity::Optimization => self.optimization,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        Severity::ALL.iter().map(|severity| self.get(*severity)).sum()
    }

    fn merged(mut self, other: &Self) -> Self {
        for severity in Severity::ALL {
            self.add(severity, other.get(severity));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationStats {
    pub ok: u64,
    pub ko: u64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStats {
    pub compilation: CompilationStats,
    pub zero_vulnerability: u64,
    pub vulnerability: SeverityCounts,
    pub perfect_tests: u64,
    /// Average pass ratio over compiled records, in percent.
    pub total_ratio: f64,
    #[serde(rename = "PerfectContract")]
    pub perfect_contract: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub errors: u64,
    pub total_duration_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub compilation: CompilationStats,
    pub zero_vulnerability: u64,
    pub vulnerability: SeverityCounts,
    pub perfect_tests: u64,
    pub total_ratio: f64,
    #[serde(rename = "PerfectContract")]
    pub perfect_contract: u64,
    pub generation: GenerationStats,
    pub details: BTreeMap<String, PromptStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statistics {
    pub models: BTreeMap<String, ModelStats>,
}

impl Statistics {
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_string(path, &content)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            BenchError::invalid(format!("cannot read {}: {error}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub passing: u64,
    pub failing: u64,
}

impl TestCounts {
    /// `passing / (passing + failing)`, or 0 when no test ran.
    #[must_use]
    pub fn pass_ratio(self) -> f64 {
        let total = self.passing + self.failing;
        if total == 0 {
            0.0
        } else {
            self.passing as f64 / total as f64
        }
    }

    #[must_use]
    pub fn all_passed(self) -> bool {
        self.passing > 0 && self.failing == 0
    }
}

fn passing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+) passing").expect("passing regex"))
}

fn failing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+) failing").expect("failing regex"))
}

fn first_count(pattern: &Regex, text: &str) -> u64 {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
        .unwrap_or(0)
}

/// Reads the first `N passing` / `N failing` summary of a test-runner
/// report; a missing summary counts as 0.
#[must_use]
pub fn parse_test_counts(stdout: &str) -> TestCounts {
    TestCounts {
        passing: first_count(passing_pattern(), stdout),
        failing: first_count(failing_pattern(), stdout),
    }
}

/// What one complete record contributes to the counters.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    FailedCompile,
    Compiled {
        findings: SeverityCounts,
        detected: Vec<&'static str>,
        /// Every detected check is informational or optimization.
        benign_only: bool,
        tests_ok: bool,
        tests: TestCounts,
    },
}

impl Evaluation {
    #[must_use]
    pub fn is_perfect_contract(&self) -> bool {
        match self {
            Self::FailedCompile => false,
            Self::Compiled {
                benign_only,
                tests_ok,
                tests,
                ..
            } => *benign_only && *tests_ok && tests.all_passed(),
        }
    }
}

#[must_use]
pub fn evaluate(outcomes: Outcomes<'_>) -> Evaluation {
    if !outcomes.compilation.succeeded() {
        return Evaluation::FailedCompile;
    }

    let lowered = outcomes.slither.stderr.to_lowercase();
    let mut findings = SeverityCounts::default();
    let mut detected = Vec::new();
    let mut benign_only = true;
    for (check_id, severity) in CATALOG {
        let count = count_marker(&lowered, check_id);
        if count == 0 {
            continue;
        }
        findings.add(*severity, count as u64);
        detected.push(*check_id);
        benign_only &= severity.is_benign();
    }

    Evaluation::Compiled {
        findings,
        detected,
        benign_only,
        tests_ok: outcomes.testing.succeeded(),
        tests: parse_test_counts(&outcomes.testing.stdout),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub compiled: u64,
    pub failed: u64,
    pub zero_vulnerability: u64,
    pub vulnerability: SeverityCounts,
    pub perfect_tests: u64,
    /// Sum of `pass_ratio * 100` over compiled records.
    pub ratio_total: f64,
    pub perfect_contract: u64,
}

impl Tally {
    #[must_use]
    pub fn absorb(mut self, evaluation: &Evaluation) -> Self {
        let Evaluation::Compiled {
            findings,
            benign_only,
            tests_ok,
            tests,
            ..
        } = evaluation
        else {
            self.failed += 1;
            return self;
        };

        self.compiled += 1;
        self.vulnerability = self.vulnerability.merged(findings);
        if *benign_only {
            self.zero_vulnerability += 1;
        }
        if *tests_ok {
            self.perfect_tests += 1;
        }
        self.ratio_total += tests.pass_ratio() * 100.0;
        if evaluation.is_perfect_contract() {
            self.perfect_contract += 1;
        }
        self
    }

    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        self.compiled += other.compiled;
        self.failed += other.failed;
        self.zero_vulnerability += other.zero_vulnerability;
        self.vulnerability = self.vulnerability.merged(&other.vulnerability);
        self.perfect_tests += other.perfect_tests;
        self.ratio_total += other.ratio_total;
        self.perfect_contract += other.perfect_contract;
        self
    }

    #[must_use]
    pub fn compile_ratio(&self) -> f64 {
        let attempted = self.compiled + self.failed;
        if attempted == 0 {
            0.0
        } else {
            self.compiled as f64 / attempted as f64 * 100.0
        }
    }

    #[must_use]
    pub fn average_pass_ratio(&self) -> f64 {
        if self.compiled == 0 {
            0.0
        } else {
            self.ratio_total / self.compiled as f64
        }
    }

    fn compilation(&self) -> CompilationStats {
        CompilationStats {
            ok: self.compiled,
            ko: self.failed,
            ratio: self.compile_ratio(),
        }
    }

    #[must_use]
    pub fn into_prompt_stats(self) -> PromptStats {
        PromptStats {
            compilation: self.compilation(),
            zero_vulnerability: self.zero_vulnerability,
            vulnerability: self.vulnerability,
            perfect_tests: self.perfect_tests,
            total_ratio: self.average_pass_ratio(),
            perfect_contract: self.perfect_contract,
        }
    }

    #[must_use]
    pub fn into_model_stats(
        self,
        generation: GenerationStats,
        details: BTreeMap<String, PromptStats>,
    ) -> ModelStats {
        ModelStats {
            compilation: self.compilation(),
            zero_vulnerability: self.zero_vulnerability,
            vulnerability: self.vulnerability,
            perfect_tests: self.perfect_tests,
            total_ratio: self.average_pass_ratio(),
            perfect_contract: self.perfect_contract,
            generation,
            details,
        }
    }
}

fn tally_record(tally: Tally, generation: &mut GenerationStats, record: &RunRecord) -> Tally {
    match record.outcomes() {
        Some(outcomes) => {
            generation.total_duration_seconds += record.total_duration_ns() as f64 / 1e9;
            tally.absorb(&evaluate(outcomes))
        }
        None => {
            generation.errors += 1;
            tally
        }
    }
}

/// Single read-only pass over the store.
#[must_use]
pub fn aggregate(store: &ResultStore) -> Statistics {
    let mut models = BTreeMap::new();
    for (model, prompts) in store.models() {
        let mut model_tally = Tally::default();
        let mut generation = GenerationStats::default();
        let mut details = BTreeMap::new();

        for (prompt, iterations) in prompts {
            let prompt_tally = iterations.values().fold(Tally::default(), |tally, record| {
                tally_record(tally, &mut generation, record)
            });
            model_tally = model_tally.merge(&prompt_tally);
            details.insert(prompt.clone(), prompt_tally.into_prompt_stats());
        }

        models.insert(
            model.clone(),
            model_tally.into_model_stats(generation, details),
        );
    }
    Statistics { models }
}

/// Loads `data_path`, aggregates it, and writes `stats_path`.
pub fn run_analyze(data_path: &Path, stats_path: &Path) -> Result<Statistics> {
    let store = ResultStore::load(data_path)?;
    let statistics = aggregate(&store);
    statistics.save(stats_path)?;
    Ok(statistics)
}
