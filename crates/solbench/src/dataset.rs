//! Prompt dataset: a `;`-separated table of `name;prompt` rows.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Serialize;

use crate::error::{BenchError, Result};
use crate::util::{check_path_component, ensure_dir, write_string};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub id: String,
    pub spec_text: String,
    /// Body of the first ```` ```js ```` block of `spec_text`, verbatim.
    pub test_source: Option<String>,
}

impl Prompt {
    #[must_use]
    pub fn new(id: impl Into<String>, spec_text: impl Into<String>) -> Self {
        let spec_text = spec_text.into();
        let test_source = extract_test_source(&spec_text);
        Self {
            id: id.into(),
            spec_text,
            test_source,
        }
    }
}

fn js_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```js(.*?)```").expect("js block regex"))
}

#[must_use]
pub fn extract_test_source(spec_text: &str) -> Option<String> {
    js_block_pattern()
        .captures(spec_text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().to_string())
}

/// Dataset files are exported from spreadsheets, often as Latin-1.
fn decode_field(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&byte| char::from(byte)).collect(),
    }
}

pub fn load_dataset(path: &Path) -> Result<Vec<Prompt>> {
    if !path.exists() {
        return Err(BenchError::MissingPath {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut prompts = Vec::new();
    let mut seen = BTreeSet::new();

    for (index, record) in reader.byte_records().enumerate() {
        let record = record?;
        let row = index + 2;
        let (Some(raw_id), Some(raw_text)) = (record.get(0), record.get(1)) else {
            return Err(BenchError::invalid(format!(
                "{} row {row}: expected at least two columns (name;prompt)",
                path.display()
            )));
        };

        let id = decode_field(raw_id).trim().to_string();
        if id.is_empty() {
            return Err(BenchError::invalid(format!(
                "{} row {row}: prompt name is empty",
                path.display()
            )));
        }
        if check_path_component("prompt id", &id).is_err() {
            return Err(BenchError::invalid(format!(
                "{} row {row}: prompt name {id} cannot be used as a file name",
                path.display()
            )));
        }
        if !seen.insert(id.clone()) {
            return Err(BenchError::invalid(format!(
                "{} row {row}: duplicate prompt name {id}",
                path.display()
            )));
        }

        prompts.push(Prompt::new(id, decode_field(raw_text)));
    }

    if prompts.is_empty() {
        return Err(BenchError::invalid(format!(
            "{} contains no prompts",
            path.display()
        )));
    }

    Ok(prompts)
}

/// Fails on the first prompt without a test block unless `allow_missing`.
pub fn check_test_sources(prompts: &[Prompt], allow_missing: bool) -> Result<()> {
    if allow_missing {
        return Ok(());
    }
    match prompts.iter().find(|prompt| prompt.test_source.is_none()) {
        Some(prompt) => Err(BenchError::MissingTestSource {
            prompt: prompt.id.clone(),
        }),
        None => Ok(()),
    }
}

#[must_use]
pub fn extracted_test_path(dir: &Path, prompt_id: &str) -> PathBuf {
    dir.join(format!("{prompt_id}.js"))
}

/// Writes each prompt's test block to `<dir>/<id>.js`.
pub fn write_extracted_tests(prompts: &[Prompt], dir: &Path) -> Result<()> {
    ensure_dir(dir)?;
    for prompt in prompts {
        check_path_component("prompt id", &prompt.id)?;
        if let Some(source) = &prompt.test_source {
            write_string(&extracted_test_path(dir, &prompt.id), source)?;
        }
    }
    Ok(())
}
