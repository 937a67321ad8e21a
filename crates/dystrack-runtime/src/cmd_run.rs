//! `dystrack run`: one monitoring session.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use dystrack_core::{AnalysisPipeline, ChannelKind};
use dystrack_io::{
    CommandPipeline, CommandTransmitter, DirectoryStore, KeyValueTransmitter, TextFileTransmitter,
    Transmitter, ensure_target_dir,
};
use dystrack_manager::{CancellationToken, EventLoop};

use crate::cli::RunOpts;
use crate::config::{FileConfig, RunSettings, resolve};

pub async fn cmd_run(opts: RunOpts) -> anyhow::Result<()> {
    let file = match &opts.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = resolve(&opts, file)?;
    settings.manager.validate()?;

    let target_dir = ensure_target_dir(&opts.target_dir)?;
    let pipeline = build_pipeline(&settings)?;
    let transmitter = build_transmitter(&settings, &target_dir)?;

    tracing::info!(
        target_dir = %target_dir.display(),
        channel = %settings.channel,
        pipeline = pipeline.name(),
        "starting dystrack"
    );

    let token = CancellationToken::new();
    // Without end_on_cancel the default signal disposition (terminate) stays.
    let signals = settings
        .manager
        .end_on_cancel
        .then(|| tokio::spawn(cancel_on_signal(token.clone())));

    let report = EventLoop::new(target_dir, settings.manager, pipeline, transmitter)
        .with_cancellation(token)
        .run()
        .await;
    if let Some(handle) = signals {
        handle.abort();
    }
    let report = report?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

pub fn build_pipeline(settings: &RunSettings) -> anyhow::Result<Arc<dyn AnalysisPipeline>> {
    let program = settings
        .pipeline_cmd
        .clone()
        .context("no analysis pipeline configured; pass --pipeline-cmd or set [pipeline] command")?;
    let mut pipeline = CommandPipeline::new(program).with_args(settings.pipeline_args.clone());
    if let Some(policy) = &settings.settle {
        pipeline = pipeline.with_stability(policy.clone());
    }
    Ok(Arc::new(pipeline))
}

pub fn build_transmitter(
    settings: &RunSettings,
    target_dir: &Path,
) -> anyhow::Result<Box<dyn Transmitter>> {
    match settings.channel {
        ChannelKind::Txt => {
            let mut tx = TextFileTransmitter::new(target_dir);
            if let Some(precision) = settings.precision {
                tx = tx.with_precision(precision)?;
            }
            Ok(Box::new(tx))
        }
        ChannelKind::KeyValue => {
            let dir = settings
                .kv_dir
                .as_deref()
                .context("the kv channel needs --kv-dir or [channel] kv_dir")?;
            let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
            if dir.starts_with(target_dir) {
                bail!(
                    "kv directory {} must be outside the watched directory {}",
                    dir.display(),
                    target_dir.display()
                );
            }
            let store = DirectoryStore::new(&dir)
                .with_context(|| format!("failed to prepare kv directory {}", dir.display()))?;
            Ok(Box::new(KeyValueTransmitter::new(store)))
        }
        ChannelKind::Command => {
            let program = settings
                .transmit_cmd
                .clone()
                .context("the command channel needs --transmit-cmd or [channel] command")?;
            Ok(Box::new(
                CommandTransmitter::new(program).with_args(settings.transmit_args.clone()),
            ))
        }
        ChannelKind::Callback => {
            bail!("the callback channel is only available when embedding dystrack-manager")
        }
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, finishing current poll"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, finishing current poll"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                if ctrl_c.await.is_ok() {
                    tracing::info!("received ctrl-c, finishing current poll");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if ctrl_c.await.is_ok() {
            tracing::info!("received ctrl-c, finishing current poll");
        }
    }

    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use dystrack_io::COORDS_FILE_NAME;
    use std::path::PathBuf;

    fn settings(channel: ChannelKind) -> RunSettings {
        let opts = RunOpts {
            target_dir: PathBuf::from("."),
            ..Default::default()
        };
        let mut settings = resolve(&opts, FileConfig::default()).expect("resolve");
        settings.channel = channel;
        settings
    }

    #[test]
    fn txt_channel_writes_into_target_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tx = build_transmitter(&settings(ChannelKind::Txt), dir.path()).expect("txt");
        assert_eq!(tx.kind(), ChannelKind::Txt);
        assert_eq!(tx.output_file_name(), Some(COORDS_FILE_NAME));
    }

    #[test]
    fn bad_precision_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut s = settings(ChannelKind::Txt);
        s.precision = Some(40);
        assert!(build_transmitter(&s, dir.path()).is_err());
    }

    #[test]
    fn kv_channel_needs_dir_outside_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("images");
        std::fs::create_dir(&target).expect("mkdir");

        let mut s = settings(ChannelKind::KeyValue);
        assert!(build_transmitter(&s, &target).is_err());

        s.kv_dir = Some(target.join("macro"));
        let err = build_transmitter(&s, &target).err().expect("inside target");
        assert!(err.to_string().contains("outside the watched directory"));

        s.kv_dir = Some(dir.path().join("macro"));
        let tx = build_transmitter(&s, &target).expect("kv");
        assert_eq!(tx.kind(), ChannelKind::KeyValue);
    }

    #[test]
    fn command_channel_needs_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut s = settings(ChannelKind::Command);
        assert!(build_transmitter(&s, dir.path()).is_err());
        s.transmit_cmd = Some("push-coords".into());
        assert!(build_transmitter(&s, dir.path()).is_ok());
    }

    #[test]
    fn callback_channel_is_library_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(build_transmitter(&settings(ChannelKind::Callback), dir.path()).is_err());
    }

    #[test]
    fn pipeline_command_is_required() {
        let mut s = settings(ChannelKind::Txt);
        let err = build_pipeline(&s).err().expect("missing");
        assert!(err.to_string().contains("--pipeline-cmd"));
        s.pipeline_cmd = Some("segment".into());
        assert_eq!(build_pipeline(&s).expect("pipeline").name(), "segment");
    }
}
