//! dystrack-manager: the monitoring event loop.
//!
//! Polls the target directory, hands every new target file to the analysis
//! pipeline and pushes the resulting coordinates through the configured
//! transmission channel.

pub mod error;
pub mod event_loop;
pub mod progress;
pub mod report;

pub use error::ManagerError;
pub use event_loop::EventLoop;
pub use progress::{Progress, ProgressLog};
pub use report::{RunReport, StopReason, TriggerRecord};
pub use tokio_util::sync::CancellationToken;
