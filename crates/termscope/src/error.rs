//! Error types for session operations

use std::time::Duration;

use terminal::PtyError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    /// A blocking match or idle wait ran past its deadline
    #[error("timed out after {waited:?} waiting for {criteria}")]
    Timeout { waited: Duration, criteria: String },

    /// The stream ended before any matcher hit
    #[error("end of stream while waiting for {criteria}")]
    EndOfStream { criteria: String },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    #[error("terminal error: {0}")]
    Terminal(#[from] PtyError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("session is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream { .. })
    }
}

/// One or more view checks failed
///
/// Lists every failing input in the order it was supplied, along with the
/// rendered contents the inputs were checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchError {
    pub contents: String,
    pub failed: Vec<String>,
}

impl std::fmt::Display for MismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.failed.len();
        let suffix = if count == 1 { "" } else { "s" };
        write!(
            f,
            "contents failed to match {count} pattern{suffix}: {}",
            self.failed.join(", ")
        )
    }
}

impl std::error::Error for MismatchError {}
