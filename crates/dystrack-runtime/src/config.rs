//! TOML config file and its merge with command-line flags.
//!
//! File values are the base; every flag given on the command line overrides
//! the matching file value, and `--kwarg` entries are added on top of the
//! `[analysis]` table.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use dystrack_core::{ChannelKind, ImgKwargs, ManagerConfig, StabilityPolicy};
use serde::Deserialize;

use crate::cli::RunOpts;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub manager: ManagerConfig,
    /// Keyword arguments for the analysis pipeline.
    pub analysis: ImgKwargs,
    pub pipeline: PipelineSection,
    pub channel: ChannelSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub settle: Option<StabilityPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub kind: Option<ChannelKind>,
    pub precision: Option<usize>,
    pub kv_dir: Option<PathBuf>,
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }
}

/// Everything `dystrack run` needs after merging file and flags.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub manager: ManagerConfig,
    pub channel: ChannelKind,
    pub precision: Option<usize>,
    pub kv_dir: Option<PathBuf>,
    pub transmit_cmd: Option<String>,
    pub transmit_args: Vec<String>,
    pub pipeline_cmd: Option<String>,
    pub pipeline_args: Vec<String>,
    pub settle: Option<StabilityPolicy>,
}

pub fn resolve(opts: &RunOpts, file: FileConfig) -> anyhow::Result<RunSettings> {
    let FileConfig {
        mut manager,
        analysis,
        pipeline,
        channel,
    } = file;

    if let Some(v) = &opts.file_start {
        manager.file_start.clone_from(v);
    }
    if let Some(v) = &opts.file_end {
        manager.file_end.clone_from(v);
    }
    if let Some(v) = &opts.file_regex {
        manager.file_regex.clone_from(v);
    }
    if let Some(secs) = opts.interval {
        if !secs.is_finite() || secs < 0.0 {
            bail!("--interval must be a non-negative number of seconds, got {secs}");
        }
        manager.interval_ms = (secs * 1000.0).round() as u64;
    }
    if opts.max_checks.is_some() {
        manager.max_checks = opts.max_checks;
    }
    if opts.max_triggers.is_some() {
        manager.max_triggers = opts.max_triggers;
    }
    if opts.no_end_on_cancel {
        manager.end_on_cancel = false;
    }
    manager.img_kwargs.extend(analysis);
    manager.img_kwargs.extend(opts.kwargs.iter().cloned());

    let kind = match &opts.channel {
        Some(raw) => raw.parse()?,
        None => channel.kind.unwrap_or_default(),
    };

    let settle = match (opts.settle_interval_ms, opts.settle_max_checks, pipeline.settle) {
        (None, None, file) => file,
        (interval, max_checks, file) => {
            let base = file.unwrap_or_default();
            Some(StabilityPolicy {
                check_interval_ms: interval.unwrap_or(base.check_interval_ms),
                max_checks: max_checks.unwrap_or(base.max_checks),
                ..base
            })
        }
    };

    Ok(RunSettings {
        manager,
        channel: kind,
        precision: opts.precision.or(channel.precision),
        kv_dir: opts.kv_dir.clone().or(channel.kv_dir),
        transmit_cmd: opts.transmit_cmd.clone().or(channel.command),
        transmit_args: pick_args(&opts.transmit_args, channel.args),
        pipeline_cmd: opts.pipeline_cmd.clone().or(pipeline.command),
        pipeline_args: pick_args(&opts.pipeline_args, pipeline.args),
        settle,
    })
}

fn pick_args(flags: &[String], file: Vec<String>) -> Vec<String> {
    if flags.is_empty() { file } else { flags.to_vec() }
}
