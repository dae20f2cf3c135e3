#![forbid(unsafe_code)]

pub mod aggregate;
pub mod archive;
pub mod artifact;
pub mod backend;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod doctor;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod runmeta;
pub mod severity;
pub mod store;
pub mod tools;
pub mod util;
pub mod workspace;

pub use cli::run_from_env;
pub use error::{BenchError, Result};
