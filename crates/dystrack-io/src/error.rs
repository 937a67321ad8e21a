//! Error types for the IO boundary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("{0} is not a valid directory")]
    NotADirectory(PathBuf),

    #[error("failed to list {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("io error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("coordinate file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {name} to {namespace}: {detail}")]
    Store {
        namespace: String,
        name: String,
        detail: String,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("transmission callback failed: {0}")]
    Callback(String),
}
