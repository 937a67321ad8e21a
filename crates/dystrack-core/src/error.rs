//! Error types shared across the manager crates.

use thiserror::Error;

/// Invalid manager configuration. Always fatal, raised before the first poll.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no ending condition for the event loop set; configure max_checks, max_triggers or end_on_cancel"
    )]
    NoEndingCondition,

    #[error("invalid file_regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("retry policy must allow at least one send attempt")]
    ZeroAttempts,

    #[error("invalid transmission channel {0:?} (expected one of: txt, kv, command, callback)")]
    UnknownChannel(String),

    #[error("coordinate precision {0} out of range (0..=12)")]
    InvalidPrecision(usize),
}

/// Failure of a single pipeline invocation. Never fatal to the event loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("got an unexpected keyword argument {0:?}")]
    UnexpectedKwarg(String),

    #[error("malformed pipeline output: {0}")]
    MalformedOutput(String),

    #[error("pipeline failed: {0}")]
    Failed(String),

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}
