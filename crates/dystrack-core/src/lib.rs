//! dystrack-core: pure types and state machines for the DySTrack manager.
//! Snapshot diffing, target-file matching, the analysis pipeline contract,
//! retry/stability policies and manager configuration. No IO, no async.

pub mod analysis;
pub mod config;
pub mod error;
pub mod matcher;
pub mod policy;
pub mod snapshot;
pub mod types;

pub use analysis::{AnalysisOutcome, AnalysisPipeline, invoke_pipeline, merge_cache};
pub use config::{ChannelKind, ManagerConfig};
pub use error::{AnalysisError, ConfigError};
pub use matcher::FileMatcher;
pub use policy::{RetryPolicy, StabilityPolicy, StabilityStep, StabilityTracker};
pub use snapshot::{DirectorySnapshot, SnapshotTracker};
pub use types::{
    ANALYSIS_FAILED_MSG, ActionToken, Axis, DeliveryStatus, ImgCache, ImgKwargs, PipelineOutput,
    RunStats, StagePosition, TRANSMISSION_FAILED_MSG, TransmissionAttempt,
};
