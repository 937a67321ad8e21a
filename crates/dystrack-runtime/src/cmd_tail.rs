//! `dystrack tail`: print coordinate rows as a running session appends them.

use std::io::Write;
use std::time::Duration;

use dystrack_io::{CoordinateRow, CoordsTail, TailOutcome};

use crate::cli::TailOpts;

/// Wait used between rows when no `--timeout` is given.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

pub async fn cmd_tail(opts: TailOpts) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || tail_blocking(&opts, &mut std::io::stdout())).await?
}

fn tail_blocking(opts: &TailOpts, out: &mut dyn Write) -> anyhow::Result<()> {
    let mut tail = if opts.from_start {
        CoordsTail::from_start(opts.coords_file.clone())
    } else {
        CoordsTail::new(opts.coords_file.clone())
    };
    let poll = Duration::from_millis(opts.poll_ms.max(1));
    let timeout = opts.timeout.map_or(IDLE_WAIT, Duration::from_secs);

    loop {
        match tail.wait_for_row(poll, timeout) {
            TailOutcome::Row(row) => {
                writeln!(out, "{}", format_row(&row))?;
                out.flush()?;
            }
            TailOutcome::TimedOut { polls } if opts.timeout.is_some() => {
                tracing::info!(
                    path = %tail.path().display(),
                    polls,
                    "no new coordinates before timeout"
                );
                return Ok(());
            }
            TailOutcome::TimedOut { .. } => {}
        }
    }
}

fn format_row(row: &CoordinateRow) -> String {
    if row.message.is_empty() {
        row.position.to_string()
    } else {
        format!("{}  {}", row.position, row.message)
    }
}
