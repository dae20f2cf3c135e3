use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::{append_line, write_string};

/// `run_meta.json`: what a pipeline run was asked to do and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunMeta {
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<i64>,
    pub models: Vec<String>,
    pub prompts: Vec<String>,
    pub iterations: u32,
    pub temperature: f64,
    pub dataset: String,
    pub output_dir: String,
    pub test_workspace: String,
    pub endpoint: String,
    pub compiler: String,
    pub analyzer: String,
    pub test_runner: String,
    pub solc_version: String,
    pub generation_timeout_seconds: u64,
    pub tool_timeout_seconds: u64,
    pub iterations_ok: Option<u64>,
    pub iterations_failed: Option<u64>,
    pub archive: Option<String>,
    pub report: Option<String>,
    pub fastapi_output_mode: Option<String>,
    pub fastapi_agent_mode: Option<bool>,
    pub sqlmodel_output_mode: Option<String>,
    pub sqlmodel_agent_mode: Option<bool>,
}

impl RunMeta {
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_string(path, &content)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str::<Self>(&content)?)
    }
}

/// One line of `events.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationEvent {
    pub timestamp: String,
    pub model: String,
    pub prompt: String,
    pub iteration: u32,
    /// `generation`, `compilation`, `slither`, `testing`, or `iteration`.
    pub stage: String,
    pub status: String,
    pub return_code: Option<i32>,
    pub detail: Option<String>,
}

impl IterationEvent {
    pub fn append_jsonl(&self, path: &Path) -> Result<()> {
        let line = serde_json::to_string(self)?;
        append_line(path, &line)
    }
}
