//! Event loop: poll the target tree, dispatch new target files.
//!
//! One logical thread of control. Listing, analysis and transmission run on
//! the blocking pool one at a time; the loop awaits each before moving on, so
//! no two triggers ever overlap. Cancellation is only observed at the top of
//! a poll iteration (and wakes an idle sleep early).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dystrack_core::analysis::panic_message;
use dystrack_core::{
    AnalysisError, AnalysisOutcome, AnalysisPipeline, DeliveryStatus, DirectorySnapshot,
    FileMatcher, ImgCache, ManagerConfig, PipelineOutput, RunStats, SnapshotTracker,
    TransmissionAttempt, invoke_pipeline, merge_cache,
};
use dystrack_io::{Transmitter, snapshot_dir};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::ManagerError;
use crate::progress::Progress;
use crate::report::{RunReport, StopReason, TriggerRecord};

type SharedTransmitter = Arc<Mutex<Box<dyn Transmitter>>>;

pub struct EventLoop {
    target_dir: PathBuf,
    config: ManagerConfig,
    pipeline: Arc<dyn AnalysisPipeline>,
    transmitter: SharedTransmitter,
    cancel: CancellationToken,
    progress: Progress,
    ready: Option<oneshot::Sender<()>>,
}

impl EventLoop {
    pub fn new(
        target_dir: impl Into<PathBuf>,
        config: ManagerConfig,
        pipeline: Arc<dyn AnalysisPipeline>,
        transmitter: Box<dyn Transmitter>,
    ) -> Self {
        Self {
            target_dir: target_dir.into(),
            config,
            pipeline,
            transmitter: Arc::new(Mutex::new(transmitter)),
            cancel: CancellationToken::new(),
            progress: Progress::stdout(),
            ready: None,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Fires once the initial snapshot is taken. Files created after this
    /// point are guaranteed to be seen as new.
    #[must_use]
    pub fn on_ready(mut self, ready: oneshot::Sender<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(mut self) -> Result<RunReport, ManagerError> {
        // STARTING
        self.config.validate()?;
        let (matcher, channel) = {
            let tx = self.transmitter.lock().unwrap_or_else(PoisonError::into_inner);
            (target_matcher(&self.config, &**tx)?, tx.kind())
        };

        let started_at = Utc::now();
        let mut tracker = SnapshotTracker::new(list_files(&self.target_dir).await?);
        let mut stats = RunStats::default();
        let mut cache = self.config.img_cache.clone();
        let mut triggers = Vec::new();

        tracing::debug!(
            target_dir = %self.target_dir.display(),
            initial_files = tracker.current().len(),
            "initial snapshot taken"
        );
        self.progress.started(&self.target_dir, channel);
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }

        // POLLING / DISPATCHING
        let stop_reason = loop {
            if let Some(reason) = self.stop_reason(&stats) {
                break reason;
            }

            let fresh = tracker.advance(list_files(&self.target_dir).await?);
            stats.checks += 1;

            if fresh.is_empty() {
                self.idle().await;
                continue;
            }

            tracing::debug!(count = fresh.len(), check = stats.checks, "new files found");
            stats.new_files += fresh.len() as u64;
            for path in fresh {
                if self.config.triggers_exhausted(stats.target_files) {
                    break;
                }
                if !matcher.is_target(&path) {
                    continue;
                }
                stats.target_files += 1;
                let record = self.dispatch(path, &mut cache, &mut stats).await;
                triggers.push(record);
            }
        };

        // TERMINATING / STOPPED
        tracing::info!(reason = ?stop_reason, "stopping event loop");
        self.progress.summary(&stats);
        Ok(RunReport {
            target_dir: self.target_dir,
            channel,
            stats,
            stop_reason,
            started_at,
            ended_at: Utc::now(),
            triggers,
        })
    }

    fn stop_reason(&self, stats: &RunStats) -> Option<StopReason> {
        if self.config.end_on_cancel && self.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.config.checks_exhausted(stats.checks) {
            Some(StopReason::MaxChecks)
        } else if self.config.triggers_exhausted(stats.target_files) {
            Some(StopReason::MaxTriggers)
        } else {
            None
        }
    }

    async fn idle(&self) {
        let sleep = tokio::time::sleep(self.config.interval());
        if self.config.end_on_cancel {
            tokio::select! {
                () = sleep => {}
                () = self.cancel.cancelled() => {}
            }
        } else {
            sleep.await;
        }
    }

    async fn dispatch(
        &mut self,
        path: PathBuf,
        cache: &mut ImgCache,
        stats: &mut RunStats,
    ) -> TriggerRecord {
        let detected_at = Utc::now();
        self.progress.detected(&path);

        let outcome = self.analyze(&path, cache).await;
        match &outcome.error {
            None => {
                stats.img_success += 1;
                self.progress.analysis_complete();
            }
            Some(e) => self.progress.analysis_failed(e),
        }
        let AnalysisOutcome { output, error } = outcome;
        merge_cache(cache, output.cache);

        let attempt = TransmissionAttempt::focus(output.position, output.message.clone());
        self.progress.pushing();
        let delivery = self.deliver(&attempt).await;
        if delivery.is_delivered() {
            stats.coords_sent += 1;
        }
        self.progress.pushed(delivery);

        TriggerRecord {
            path,
            detected_at,
            position: output.position,
            message: output.message,
            analysis_error: error.map(|e| e.to_string()),
            delivery,
        }
    }

    async fn analyze(&self, path: &Path, cache: &ImgCache) -> AnalysisOutcome {
        let pipeline = Arc::clone(&self.pipeline);
        let kwargs = self.config.img_kwargs.clone();
        let input = cache.clone();
        let target = path.to_path_buf();

        let handle = tokio::task::spawn_blocking(move || {
            invoke_pipeline(pipeline.as_ref(), &target, &kwargs, &input)
        });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = if e.is_panic() {
                    AnalysisError::Panicked(panic_message(&*e.into_panic()))
                } else {
                    AnalysisError::Failed("analysis task was cancelled".to_string())
                };
                AnalysisOutcome {
                    output: PipelineOutput::failed(cache.clone()),
                    error: Some(error),
                }
            }
        }
    }

    /// Bounded retries of the regular payload, then one fallback command.
    async fn deliver(&self, attempt: &TransmissionAttempt) -> DeliveryStatus {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts;
        for n in 1..=max_attempts {
            let delay = retry.delay_before(n);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.send(Some(attempt.clone())).await {
                Ok(()) => return DeliveryStatus::Delivered { attempts: n },
                Err(e) => tracing::warn!(attempt = n, max_attempts, error = %e, "send failed"),
            }
        }

        match self.send(None).await {
            Ok(()) => {
                tracing::warn!(attempts = max_attempts, "retries exhausted; fallback command sent");
                DeliveryStatus::FallbackDelivered {
                    attempts: max_attempts,
                }
            }
            Err(e) => {
                tracing::error!(attempts = max_attempts, error = %e, "fallback command failed");
                DeliveryStatus::Failed {
                    attempts: max_attempts,
                }
            }
        }
    }

    /// One send on the blocking pool. `None` sends the fallback command.
    /// A panicking transmitter counts as a failed send.
    async fn send(&self, attempt: Option<TransmissionAttempt>) -> Result<(), String> {
        let tx = Arc::clone(&self.transmitter);
        let handle = tokio::task::spawn_blocking(move || {
            let mut tx = tx.lock().unwrap_or_else(PoisonError::into_inner);
            let result = catch_unwind(AssertUnwindSafe(|| match &attempt {
                Some(attempt) => tx.send(attempt),
                None => tx.send_fallback(),
            }));
            match result {
                Ok(sent) => sent.map_err(|e| e.to_string()),
                Err(payload) => Err(format!("transmitter panicked: {}", panic_message(&*payload))),
            }
        });
        handle.await.map_err(|e| e.to_string())?
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("target_dir", &self.target_dir)
            .field("config", &self.config)
            .field("pipeline", &self.pipeline.name())
            .finish_non_exhaustive()
    }
}

async fn list_files(root: &Path) -> Result<DirectorySnapshot, ManagerError> {
    let root = root.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || snapshot_dir(&root)).await??)
}

/// Matcher used by [`EventLoop::run`]; exposed for hosts that pre-filter.
pub fn target_matcher(
    config: &ManagerConfig,
    transmitter: &dyn Transmitter,
) -> Result<FileMatcher, ManagerError> {
    let mut matcher = config.matcher()?;
    if let Some(name) = transmitter.output_file_name() {
        matcher = matcher.exclude_name(name);
    }
    Ok(matcher)
}
