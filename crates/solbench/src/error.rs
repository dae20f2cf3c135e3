use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dataset error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing dependency command: {command}")]
    MissingCommand { command: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    /// Backend unreachable, non-2xx, or a body without the generated text.
    #[error("generation failed for model {model}: {message}")]
    Generation { model: String, message: String },

    #[error("prompt {prompt} has no embedded ```js test block (pass --allow-missing-tests to run it anyway)")]
    MissingTestSource { prompt: String },

    /// The persisted result store cannot be aggregated.
    #[error("malformed result store {path}: {message}")]
    MalformedStore { path: PathBuf, message: String },

    #[error("{message}")]
    Exit { code: i32, message: String },
}

impl BenchError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code, .. } => *code,
            Self::MalformedStore { .. } => 3,
            Self::MissingTestSource { .. } | Self::InvalidArgument { .. } => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self::Exit {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn generation(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            model: model.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed_store(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedStore {
            path: path.into(),
            message: message.into(),
        }
    }
}
