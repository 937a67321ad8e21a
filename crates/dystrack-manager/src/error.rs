use dystrack_core::ConfigError;
use dystrack_io::ListingError;
use thiserror::Error;

/// Fatal errors of a monitoring session. Analysis and transmission failures
/// are recovered inside the loop and never show up here.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
