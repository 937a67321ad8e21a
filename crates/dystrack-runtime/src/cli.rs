//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(
    name = "dystrack",
    version,
    about = "Adaptive-feedback microscopy manager",
    long_about = "Watches a microscope's output directory, analyzes each new target image \
                  and sends the next stage position back to the acquisition macro."
)]
pub struct Cli {
    /// Verbose diagnostics on stderr (debug level)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a monitoring session on a target directory
    Run(RunOpts),
    /// Follow the coordinate file of a running session
    Tail(TailOpts),
}

#[derive(Debug, Default, Args)]
pub struct RunOpts {
    /// Directory the microscope writes images into
    pub target_dir: PathBuf,

    /// Only files whose name starts with this are targets
    #[arg(long, short = 's')]
    pub file_start: Option<String>,

    /// Only files whose name ends with this are targets
    #[arg(long, short = 'e')]
    pub file_end: Option<String>,

    /// Regex matched from the start of the file name
    #[arg(long, short = 'r')]
    pub file_regex: Option<String>,

    /// Transmission channel: txt, kv (alias mypic) or command
    #[arg(long)]
    pub channel: Option<String>,

    /// Seconds between polls of the target directory
    #[arg(long)]
    pub interval: Option<f64>,

    /// Stop after this many polls
    #[arg(long)]
    pub max_checks: Option<u64>,

    /// Stop after this many target files
    #[arg(long)]
    pub max_triggers: Option<u64>,

    /// Ignore Ctrl-C / SIGTERM as an ending condition
    #[arg(long)]
    pub no_end_on_cancel: bool,

    /// Analysis program, run as `<prog> [args..] <image path>`
    #[arg(long, env = "DYSTRACK_PIPELINE_CMD")]
    pub pipeline_cmd: Option<String>,

    /// Extra argument for the analysis program (repeatable)
    #[arg(long = "pipeline-arg", allow_hyphen_values = true)]
    pub pipeline_args: Vec<String>,

    /// Analysis keyword argument as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "kwarg", value_parser = parse_kwarg)]
    pub kwargs: Vec<(String, Value)>,

    /// Program receiving coordinates on the command channel
    #[arg(long)]
    pub transmit_cmd: Option<String>,

    /// Extra argument for the transmit program (repeatable)
    #[arg(long = "transmit-arg", allow_hyphen_values = true)]
    pub transmit_args: Vec<String>,

    /// Directory backing the key-value channel (outside the target directory)
    #[arg(long)]
    pub kv_dir: Option<PathBuf>,

    /// Decimal places in the coordinate file
    #[arg(long)]
    pub precision: Option<usize>,

    /// Wait for image files to stop growing, checking every MS milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_interval_ms: Option<u64>,

    /// Give up waiting for a file to settle after N checks
    #[arg(long, value_name = "N")]
    pub settle_max_checks: Option<u32>,

    /// TOML file with [manager], [analysis], [pipeline] and [channel] tables
    #[arg(long, short = 'c', env = "DYSTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the session report as JSON on exit
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TailOpts {
    /// Coordinate file to follow
    pub coords_file: PathBuf,

    /// Exit after this many seconds without a new row
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print rows already in the file first
    #[arg(long)]
    pub from_start: bool,

    /// Base poll interval in milliseconds
    #[arg(long, default_value = "250")]
    pub poll_ms: u64,
}

/// Parse `KEY=VALUE`. Values that are valid JSON keep their type; anything
/// else is taken as a string.
pub fn parse_kwarg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kwarg_values_keep_json_types() {
        assert_eq!(parse_kwarg("sigma=2.5").expect("ok"), ("sigma".into(), json!(2.5)));
        assert_eq!(parse_kwarg("verbose=true").expect("ok"), ("verbose".into(), json!(true)));
        assert_eq!(parse_kwarg("channel=dapi").expect("ok"), ("channel".into(), json!("dapi")));
        assert_eq!(parse_kwarg("expr=a=b").expect("ok"), ("expr".into(), json!("a=b")));
        assert!(parse_kwarg("novalue").is_err());
        assert!(parse_kwarg("=1").is_err());
    }

    #[test]
    fn run_parses_filters_and_bounds() {
        let cli = Cli::try_parse_from([
            "dystrack",
            "run",
            "/data/session",
            "-s",
            "prescan_",
            "-e",
            ".czi",
            "--max-triggers",
            "1",
            "--pipeline-cmd",
            "segment",
            "--pipeline-arg",
            "--model=lateral_line",
            "--kwarg",
            "sigma=3",
            "--json",
        ])
        .expect("parse");
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(opts.target_dir, PathBuf::from("/data/session"));
        assert_eq!(opts.file_start.as_deref(), Some("prescan_"));
        assert_eq!(opts.file_end.as_deref(), Some(".czi"));
        assert_eq!(opts.max_triggers, Some(1));
        assert_eq!(opts.pipeline_args, vec!["--model=lateral_line"]);
        assert_eq!(opts.kwargs, vec![("sigma".to_string(), json!(3))]);
        assert!(opts.json);
    }

    #[test]
    fn run_requires_target_dir() {
        assert!(Cli::try_parse_from(["dystrack", "run"]).is_err());
    }

    #[test]
    fn tail_defaults() {
        let cli = Cli::try_parse_from(["dystrack", "-v", "tail", "coords.txt"]).expect("parse");
        assert!(cli.verbose);
        let Command::Tail(opts) = cli.command else {
            panic!("expected tail");
        };
        assert_eq!(opts.poll_ms, 250);
        assert!(opts.timeout.is_none());
        assert!(!opts.from_start);
    }

    #[test]
    fn help_is_not_an_error_exit() {
        let err = Cli::try_parse_from(["dystrack", "--help"]).expect_err("help");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }
}
