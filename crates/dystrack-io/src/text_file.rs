//! Tab-separated coordinate file, appended one row per trigger.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use dystrack_core::{ChannelKind, ConfigError, TransmissionAttempt};

use crate::error::TransmitError;
use crate::transmit::Transmitter;

pub const COORDS_FILE_NAME: &str = "dystrack_coords.txt";
pub(crate) const HEADER: &str = "Z\tY\tX\tMESSAGE\n";

const DEFAULT_PRECISION: usize = 4;
const MAX_PRECISION: usize = 12;

/// Appends `Z\tY\tX\tMESSAGE` rows to [`COORDS_FILE_NAME`] in the target
/// directory. The header is written once, when the file is created.
#[derive(Debug, Clone)]
pub struct TextFileTransmitter {
    path: PathBuf,
    precision: usize,
}

impl TextFileTransmitter {
    pub fn new(target_dir: &Path) -> Self {
        Self {
            path: target_dir.join(COORDS_FILE_NAME),
            precision: DEFAULT_PRECISION,
        }
    }

    pub fn with_precision(mut self, precision: usize) -> Result<Self, ConfigError> {
        if precision > MAX_PRECISION {
            return Err(ConfigError::InvalidPrecision(precision));
        }
        self.precision = precision;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header and row go out in one write, so the file never holds a
    /// header-less first row. An empty file gets the header too.
    fn append(&self, row: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut chunk = String::with_capacity(HEADER.len() + row.len());
        if file.metadata()?.len() == 0 {
            chunk.push_str(HEADER);
        }
        chunk.push_str(row);
        file.write_all(chunk.as_bytes())?;
        file.flush()
    }
}

impl Transmitter for TextFileTransmitter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Txt
    }

    fn send(&mut self, attempt: &TransmissionAttempt) -> Result<(), TransmitError> {
        let row = format_row(attempt, self.precision);
        self.append(&row).map_err(|source| TransmitError::File {
            path: self.path.clone(),
            source,
        })
    }

    fn output_file_name(&self) -> Option<&str> {
        Some(COORDS_FILE_NAME)
    }
}

/// One newline-terminated row. Sentinel axes are written as `nan`.
pub fn format_row(attempt: &TransmissionAttempt, precision: usize) -> String {
    let mut row = String::new();
    for (_, value) in attempt.position.axes() {
        match value {
            Some(v) => row.push_str(&format!("{v:.precision$}")),
            None => row.push_str("nan"),
        }
        row.push('\t');
    }
    row.push_str(&sanitize(attempt.message_or_empty()));
    row.push('\n');
    row
}

fn sanitize(message: &str) -> String {
    message
        .chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c })
        .collect()
}
