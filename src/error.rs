//! Fatal configuration errors
//!
//! Everything else in the pipeline is contained per item; only a broken
//! configuration aborts a run, and it does so before any work begins.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set in the environment")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
