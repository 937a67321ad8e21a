//! User-facing progress lines. Each line is also emitted as a tracing event.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use dystrack_core::{ChannelKind, DeliveryStatus, RunStats};

pub const READY_LINE: &str = "Press Ctrl-C to terminate.";

pub struct Progress {
    out: Box<dyn Write + Send + Sync>,
}

impl Progress {
    pub fn new(out: Box<dyn Write + Send + Sync>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn silent() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Reporter writing into memory, plus a handle to read the lines back.
    pub fn buffered() -> (Self, ProgressLog) {
        let log = ProgressLog::default();
        (Self::new(Box::new(log.clone())), log)
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            tracing::debug!(error = %e, "progress output failed");
        }
    }

    pub fn started(&mut self, target_dir: &Path, channel: ChannelKind) {
        tracing::info!(target_dir = %target_dir.display(), %channel, "monitoring session started");
        self.line("");
        self.line("  DYSTRACK MONITORING SESSION IN PROGRESS...");
        self.line(&format!("  Watching: {}", target_dir.display()));
        self.line(&format!("  Channel:  {channel}"));
        self.line(&format!("  {READY_LINE}"));
        self.line("");
    }

    pub fn detected(&mut self, path: &Path) {
        tracing::info!(path = %path.display(), "target file detected");
        self.line(&format!("    Target file detected: {}", path.display()));
        self.line("    Running image analysis...");
    }

    pub fn analysis_complete(&mut self) {
        tracing::info!("image analysis complete");
        self.line("    Image analysis complete.");
    }

    pub fn analysis_failed(&mut self, error: &dyn std::fmt::Display) {
        tracing::warn!(error = %error, "image analysis failed");
        self.line(&format!("    WARNING: Image analysis failed: {error}"));
    }

    pub fn pushing(&mut self) {
        self.line("    Pushing coords to scope...");
    }

    pub fn pushed(&mut self, status: DeliveryStatus) {
        match status {
            DeliveryStatus::Delivered { attempts } => {
                tracing::info!(attempts, "coordinates delivered");
                self.line("    Coords pushed.");
            }
            DeliveryStatus::FallbackDelivered { attempts } => {
                tracing::warn!(attempts, "coordinate delivery failed; fallback command sent");
                self.line("    WARNING: Coords could not be pushed; sent fallback command.");
            }
            DeliveryStatus::Failed { attempts } => {
                tracing::error!(attempts, "coordinate delivery and fallback both failed");
                self.line("    WARNING: Coords could not be pushed; fallback failed too.");
            }
        }
        self.line("    Resuming monitoring...");
    }

    pub fn summary(&mut self, stats: &RunStats) {
        tracing::info!(
            checks = stats.checks,
            new_files = stats.new_files,
            target_files = stats.target_files,
            img_success = stats.img_success,
            coords_sent = stats.coords_sent,
            "monitoring session terminated"
        );
        self.line("");
        self.line("  DYSTRACK MONITORING SESSION TERMINATED!");
        self.line("");
        self.line("    Stats:");
        self.line(&format!("      Total checks made: {}", stats.checks));
        self.line(&format!("      Total new files found: {}", stats.new_files));
        self.line(&format!("      Total target files found: {}", stats.target_files));
        self.line(&format!("        Successfully analyzed: {}", stats.img_success));
        self.line(&format!("        No. coords sent to scope: {}", stats.coords_sent));
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// Shared in-memory sink behind [`Progress::buffered`].
#[derive(Debug, Clone, Default)]
pub struct ProgressLog(Arc<Mutex<Vec<u8>>>);

impl ProgressLog {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl Write for ProgressLog {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("progress log poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
