//! External programs as analysis pipelines and transmission channels.
//!
//! `ProcessRunner` is the mock-injectable seam; `SystemRunner` spawns real
//! subprocesses.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use dystrack_core::{
    AnalysisError, AnalysisPipeline, ChannelKind, ImgCache, ImgKwargs, PipelineOutput,
    StabilityPolicy, StagePosition, TransmissionAttempt,
};
use serde::Serialize;

use crate::error::{CommandError, TransmitError};
use crate::stability::{FileStability, wait_for_stable_file};
use crate::transmit::Transmitter;

/// Runs a program to completion and returns its stdout.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<String, CommandError>;
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<String, CommandError> {
        (**self).run(program, args, stdin)
    }
}

/// Real subprocess runner using `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<String, CommandError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let io_err = |source| CommandError::Io {
            program: program.to_string(),
            source,
        };

        // Feed stdin from a helper thread so a chatty child cannot block on a
        // full stdout pipe while we are still writing.
        let output = std::thread::scope(|scope| {
            let writer = match (stdin, child.stdin.take()) {
                (Some(input), Some(mut pipe)) => {
                    Some(scope.spawn(move || pipe.write_all(input.as_bytes())))
                }
                _ => None,
            };
            let output = child.wait_with_output();
            if let Some(handle) = writer
                && let Ok(Err(e)) = handle.join()
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e);
            }
            output
        })
        .map_err(io_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CommandError::Failed {
                program: program.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ─── Pipeline ────────────────────────────────────────────────────

#[derive(Serialize)]
struct PipelineRequest<'a> {
    path: &'a Path,
    kwargs: &'a ImgKwargs,
    cache: &'a ImgCache,
}

type RawOutput = (Option<f64>, Option<f64>, Option<f64>, String, Option<ImgCache>);

/// Runs `<program> [args..] <path>` with a JSON request on stdin and reads
/// `[z, y, x, message, cache]` from the last non-empty stdout line. `null`
/// coordinates mean "keep previous value".
#[derive(Debug, Clone)]
pub struct CommandPipeline<R = SystemRunner> {
    program: String,
    args: Vec<String>,
    runner: R,
    stability: Option<StabilityPolicy>,
}

impl CommandPipeline<SystemRunner> {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, SystemRunner)
    }
}

impl<R: ProcessRunner> CommandPipeline<R> {
    pub fn with_runner(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            runner,
            stability: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Wait for the image file to stop growing before launching the program.
    #[must_use]
    pub fn with_stability(mut self, policy: StabilityPolicy) -> Self {
        self.stability = Some(policy);
        self
    }

    fn wait_until_written(&self, path: &Path) -> Result<(), AnalysisError> {
        let Some(policy) = &self.stability else {
            return Ok(());
        };
        match wait_for_stable_file(path, policy) {
            Ok(FileStability::Stable { size, checks }) => {
                tracing::debug!(path = %path.display(), size, checks, "image file stable");
                Ok(())
            }
            // Analyze anyway; the pipeline decides whether the data is usable.
            Ok(FileStability::TimedOut { .. }) => Ok(()),
            Err(e) => Err(AnalysisError::Failed(format!(
                "cannot stat {}: {e}",
                path.display()
            ))),
        }
    }
}

impl<R: ProcessRunner> AnalysisPipeline for CommandPipeline<R> {
    fn analyze(
        &self,
        path: &Path,
        kwargs: &ImgKwargs,
        cache: &ImgCache,
    ) -> Result<PipelineOutput, AnalysisError> {
        self.wait_until_written(path)?;

        let request = serde_json::to_string(&PipelineRequest {
            path,
            kwargs,
            cache,
        })
        .map_err(|e| AnalysisError::Failed(format!("cannot encode request: {e}")))?;

        let mut args = self.args.clone();
        args.push(path.display().to_string());

        let stdout = self
            .runner
            .run(&self.program, &args, Some(&request))
            .map_err(|e| AnalysisError::Failed(e.to_string()))?;
        parse_pipeline_output(&stdout)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Parse the last non-empty line of a pipeline's stdout.
pub fn parse_pipeline_output(stdout: &str) -> Result<PipelineOutput, AnalysisError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| AnalysisError::MalformedOutput("no output".to_string()))?;
    let (z, y, x, message, cache): RawOutput = serde_json::from_str(line)
        .map_err(|e| AnalysisError::MalformedOutput(format!("{e}: {line}")))?;
    Ok(PipelineOutput::new(
        StagePosition::new(z, y, x),
        message,
        cache.unwrap_or_default(),
    ))
}

// ─── Transmitter ─────────────────────────────────────────────────

/// Runs `<program> [args..] <z> <y> <x> <action> <message>` per send.
/// Sentinel axes are passed as `nan`.
#[derive(Debug, Clone)]
pub struct CommandTransmitter<R = SystemRunner> {
    program: String,
    args: Vec<String>,
    runner: R,
}

impl CommandTransmitter<SystemRunner> {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, SystemRunner)
    }
}

impl<R: ProcessRunner> CommandTransmitter<R> {
    pub fn with_runner(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            runner,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn command_args(&self, attempt: &TransmissionAttempt) -> Vec<String> {
        let mut args = self.args.clone();
        for (_, value) in attempt.position.axes() {
            args.push(value.map_or_else(|| "nan".to_string(), |v| v.to_string()));
        }
        args.push(attempt.action.as_str().to_string());
        args.push(attempt.message_or_empty().to_string());
        args
    }
}

impl<R: ProcessRunner> Transmitter for CommandTransmitter<R> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Command
    }

    fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError> {
        let args = self.command_args(attempt);
        self.runner.run(&self.program, &args, None)?;
        Ok(())
    }
}
