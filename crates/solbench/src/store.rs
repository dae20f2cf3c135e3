//! Result store: model → prompt → iteration → run record, persisted as
//! `data.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{BenchError, Result};
use crate::tools::{ToolOutcome, Verification};
use crate::util::write_string;

/// `response` value of an iteration whose generation failed.
pub const ERROR_RESPONSE: &str = "error";

/// Accepts a tool block, `null`, or the empty object older stores wrote for
/// stages that never ran.
fn lenient_outcome<'de, D>(deserializer: D) -> std::result::Result<Option<ToolOutcome>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(fields)) if fields.is_empty() => Ok(None),
        Some(other) => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_infos: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_sha256: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_outcome",
        skip_serializing_if = "Option::is_none"
    )]
    pub compilation: Option<ToolOutcome>,
    #[serde(
        default,
        deserialize_with = "lenient_outcome",
        skip_serializing_if = "Option::is_none"
    )]
    pub slither: Option<ToolOutcome>,
    #[serde(
        default,
        deserialize_with = "lenient_outcome",
        skip_serializing_if = "Option::is_none"
    )]
    pub testing: Option<ToolOutcome>,
}

/// Borrowed view of the three stage outcomes of a complete record.
#[derive(Debug, Clone, Copy)]
pub struct Outcomes<'a> {
    pub compilation: &'a ToolOutcome,
    pub slither: &'a ToolOutcome,
    pub testing: &'a ToolOutcome,
}

impl RunRecord {
    #[must_use]
    pub fn generation_error() -> Self {
        Self {
            response: ERROR_RESPONSE.to_string(),
            prompt_infos: None,
            artifact_sha256: None,
            compilation: None,
            slither: None,
            testing: None,
        }
    }

    #[must_use]
    pub fn completed(
        response: String,
        prompt_infos: Map<String, Value>,
        artifact_sha256: String,
        verification: Verification,
    ) -> Self {
        Self {
            response,
            prompt_infos: Some(prompt_infos),
            artifact_sha256: Some(artifact_sha256),
            compilation: Some(verification.compilation),
            slither: Some(verification.slither),
            testing: Some(verification.testing),
        }
    }

    #[must_use]
    pub fn outcomes(&self) -> Option<Outcomes<'_>> {
        match (&self.compilation, &self.slither, &self.testing) {
            (Some(compilation), Some(slither), Some(testing)) => Some(Outcomes {
                compilation,
                slither,
                testing,
            }),
            _ => None,
        }
    }

    /// Records without all three stage outcomes never reach the counters.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.outcomes().is_none()
    }

    #[must_use]
    pub fn total_duration_ns(&self) -> u64 {
        self.prompt_infos
            .as_ref()
            .and_then(|infos| infos.get("total_duration"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

pub type PromptRecords = BTreeMap<u32, RunRecord>;
pub type ModelRecords = BTreeMap<String, PromptRecords>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    models: BTreeMap<String, ModelRecords>,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model so it appears in the output even before its first
    /// record lands.
    pub fn ensure_model(&mut self, model: &str) {
        self.models.entry(model.to_string()).or_default();
    }

    pub fn insert(&mut self, model: &str, prompt: &str, iteration: u32, record: RunRecord) {
        self.models
            .entry(model.to_string())
            .or_default()
            .entry(prompt.to_string())
            .or_default()
            .insert(iteration, record);
    }

    #[must_use]
    pub fn get(&self, model: &str, prompt: &str, iteration: u32) -> Option<&RunRecord> {
        self.models.get(model)?.get(prompt)?.get(&iteration)
    }

    pub fn models(&self) -> impl Iterator<Item = (&String, &ModelRecords)> {
        self.models.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.models
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(BTreeMap::values)
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.records().filter(|record| record.is_error()).count()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_string(path, &content)
    }

    /// Loads and validates a persisted store. Every failure is reported as
    /// [`BenchError::MalformedStore`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|error| BenchError::malformed_store(path, error.to_string()))?;
        let store = serde_json::from_str::<Self>(&content)
            .map_err(|error| BenchError::malformed_store(path, error.to_string()))?;
        store.validate(path)?;
        Ok(store)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for (model, prompts) in &self.models {
            for (prompt, iterations) in prompts {
                for (iteration, record) in iterations {
                    if record.is_error() && record.response != ERROR_RESPONSE {
                        return Err(BenchError::malformed_store(
                            path,
                            format!(
                                "{model}/{prompt}/{iteration}: record has a response but is missing a tool block"
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};
    use tempfile::tempdir;

    use crate::error::BenchError;
    use crate::tools::{ToolOutcome, Verification};

    use super::{ResultStore, RunRecord};

    fn outcome(code: i32, stdout: &str, stderr: &str) -> ToolOutcome {
        ToolOutcome {
            return_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn completed_record() -> RunRecord {
        let mut infos = Map::new();
        infos.insert("total_duration".to_string(), json!(3_000_000_000_u64));
        RunRecord::completed(
            "```solidity\ncontract A {}\n```".to_string(),
            infos,
            "ab".repeat(32),
            Verification {
                compilation: outcome(0, "Binary:", ""),
                slither: outcome(0, "", "no findings"),
                testing: outcome(0, "1 passing", ""),
            },
        )
    }

    #[test]
    fn error_record_serializes_to_response_only() {
        let value = serde_json::to_value(RunRecord::generation_error()).expect("serialize");
        assert_eq!(value, json!({ "response": "error" }));
    }

    #[test]
    fn completed_record_uses_persisted_key_names() {
        let value = serde_json::to_value(completed_record()).expect("serialize");
        assert_eq!(value["compilation"]["returnCode"], 0);
        assert_eq!(value["testing"]["stdout"], "1 passing");
        assert_eq!(value["promptInfos"]["total_duration"], 3_000_000_000_u64);
        assert_eq!(value["artifactSha256"], "ab".repeat(32));
        assert_eq!(completed_record().total_duration_ns(), 3_000_000_000);
    }

    #[test]
    fn empty_tool_blocks_from_older_stores_read_as_error_records() {
        let record: RunRecord = serde_json::from_value(json!({
            "compilation": {},
            "slither": {},
            "testing": {},
            "response": "error"
        }))
        .expect("deserialize");
        assert!(record.is_error());
        assert!(record.compilation.is_none());
    }

    #[test]
    fn save_then_load_keeps_iteration_keys_numeric() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.json");
        let mut store = ResultStore::new();
        store.insert("llama3", "erc20", 0, completed_record());
        store.insert("llama3", "erc20", 1, RunRecord::generation_error());
        store.save(&path).expect("save");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["llama3"]["erc20"]["1"]["response"], "error");

        let loaded = ResultStore::load(&path).expect("load");
        assert_eq!(loaded, store);
        assert_eq!(loaded.records().count(), 2);
        assert_eq!(loaded.error_count(), 1);
        assert!(loaded.get("llama3", "erc20", 0).is_some_and(|r| !r.is_error()));
    }

    #[test]
    fn load_reports_missing_and_malformed_stores() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("missing.json");
        let error = ResultStore::load(&missing).expect_err("missing store must fail");
        assert!(matches!(error, BenchError::MalformedStore { path, .. } if path == missing));

        let not_object = temp.path().join("array.json");
        std::fs::write(&not_object, "[1, 2, 3]").expect("write");
        let error = ResultStore::load(&not_object).expect_err("array store must fail");
        assert_eq!(error.exit_code(), 3);

        let truncated = temp.path().join("truncated.json");
        std::fs::write(
            &truncated,
            r#"{"llama3":{"erc20":{"0":{"response":"ok","compilation":{"returnCode":0,"stdout":"","stderr":""}}}}}"#,
        )
        .expect("write");
        let error = ResultStore::load(&truncated).expect_err("missing tool blocks must fail");
        assert!(error.to_string().contains("llama3/erc20/0"));
    }
}
