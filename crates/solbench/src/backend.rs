//! Generation backend: an Ollama-compatible `/api/generate` endpoint.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Map, Value, json};

use crate::error::{BenchError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Generated text plus the timing metadata the backend reported with it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub response: String,
    /// Everything the backend returned except `response`, `context` and `model`.
    pub prompt_infos: Map<String, Value>,
}

impl GenerationResponse {
    /// Backend-reported wall time in nanoseconds, 0 when absent.
    #[must_use]
    pub fn total_duration_ns(&self) -> u64 {
        self.prompt_infos
            .get("total_duration")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

pub trait GenerationBackend {
    fn generate(&self, model: &str, prompt: &str, temperature: f64) -> Result<GenerationResponse>;
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

#[derive(Debug)]
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(BenchError::invalid("backend endpoint cannot be empty"));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, endpoint })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.endpoint)
    }

    /// Checks that the backend answers its model listing.
    pub fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BenchError::invalid(format!(
                "backend at {} answered HTTP {status}",
                self.endpoint
            )))
        }
    }
}

impl GenerationBackend for OllamaBackend {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        temperature: f64,
    ) -> Result<GenerationResponse> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
            }
        });

        let response = self
            .client
            .post(self.generate_url())
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .map_err(|error| BenchError::generation(model, error.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|error| BenchError::generation(model, error.to_string()))?;
        if !status.is_success() {
            return Err(BenchError::generation(
                model,
                format!("HTTP {status}: {}", text.trim()),
            ));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|error| BenchError::generation(model, format!("non-JSON body: {error}")))?;
        parse_generation_body(model, body)
    }
}

pub fn parse_generation_body(model: &str, body: Value) -> Result<GenerationResponse> {
    let Value::Object(mut fields) = body else {
        return Err(BenchError::generation(model, "response body is not an object"));
    };

    let response = match fields.remove("response") {
        Some(Value::String(text)) => text,
        Some(_) => {
            return Err(BenchError::generation(model, "`response` is not a string"));
        }
        None => return Err(BenchError::generation(model, "missing `response` field")),
    };
    fields.remove("context");
    fields.remove("model");

    Ok(GenerationResponse {
        response,
        prompt_infos: fields,
    })
}
