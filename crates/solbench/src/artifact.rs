//! Turns a backend completion into a compilable source artifact on disk.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::backend::GenerationBackend;
use crate::dataset::Prompt;
use crate::error::Result;
use crate::util::{check_path_component, write_string};

pub const SPDX_PREFIX: &str = "// SPDX-License-Identifier:";
pub const DEFAULT_SPDX_LINE: &str = "// SPDX-License-Identifier: UNLICENSED";

#[derive(Debug, Clone)]
pub struct Artifact {
    pub model: String,
    pub prompt_id: String,
    pub iteration: u32,
    pub raw_response: String,
    pub prompt_infos: Map<String, Value>,
    pub source: String,
    pub raw_path: PathBuf,
    pub source_path: PathBuf,
    pub sha256: String,
}

fn fenced_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(.*?)```").expect("fenced block regex"))
}

/// Extracts the first fenced block of `raw`, drops a leading `solidity`
/// language tag, and makes sure the result opens with an SPDX line.
///
/// A response with no fence at all is used whole.
#[must_use]
pub fn normalize_response(raw: &str) -> String {
    let body = fenced_block_pattern()
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map_or(raw, |block| block.as_str());

    let mut body = body.trim();
    if let Some((first, rest)) = body.split_once('\n')
        && first.trim().eq_ignore_ascii_case("solidity")
    {
        body = rest.trim_start();
    } else if body.eq_ignore_ascii_case("solidity") {
        body = "";
    }

    let mut source = String::with_capacity(body.len() + DEFAULT_SPDX_LINE.len() + 2);
    if !body.starts_with(SPDX_PREFIX) {
        source.push_str(DEFAULT_SPDX_LINE);
        source.push('\n');
    }
    source.push_str(body);
    if !source.ends_with('\n') {
        source.push('\n');
    }
    source
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[must_use]
pub fn sha256_hex(content: &str) -> String {
    hex_encode(&Sha256::digest(content.as_bytes()))
}

#[must_use]
pub fn iteration_dir(output_dir: &Path, model: &str, prompt_id: &str) -> PathBuf {
    output_dir.join(model).join(prompt_id)
}

/// Requests one completion and writes `<k>.txt` (raw) and `<k>.sol`
/// (normalized) under `output/<model>/<prompt>/`.
pub fn generate(
    backend: &dyn GenerationBackend,
    model: &str,
    prompt: &Prompt,
    iteration: u32,
    temperature: f64,
    output_dir: &Path,
) -> Result<Artifact> {
    check_path_component("model name", model)?;
    check_path_component("prompt id", &prompt.id)?;
    let generated = backend.generate(model, &prompt.spec_text, temperature)?;

    let dir = iteration_dir(output_dir, model, &prompt.id);
    let raw_path = dir.join(format!("{iteration}.txt"));
    let source_path = dir.join(format!("{iteration}.sol"));

    write_string(&raw_path, &generated.response)?;
    let source = normalize_response(&generated.response);
    write_string(&source_path, &source)?;

    Ok(Artifact {
        model: model.to_string(),
        prompt_id: prompt.id.clone(),
        iteration,
        sha256: sha256_hex(&source),
        raw_response: generated.response,
        prompt_infos: generated.prompt_infos,
        source,
        raw_path,
        source_path,
    })
}
