//! Follow the coordinate file of a running session.
//!
//! Tracks the read offset, buffers partial lines, and starts over from the
//! beginning when the file is replaced (inode change) or truncated.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dystrack_core::StagePosition;
use tracing::warn;

use crate::text_file::HEADER;

/// One parsed row of the coordinate file.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateRow {
    pub position: StagePosition,
    pub message: String,
}

impl CoordinateRow {
    /// Parse `Z\tY\tX\tMESSAGE`. `nan` is the keep-previous sentinel.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '\t');
        let mut axis = || -> Option<Option<f64>> {
            let raw = fields.next()?.trim();
            if raw.eq_ignore_ascii_case("nan") {
                return Some(None);
            }
            raw.parse::<f64>().ok().map(Some)
        };
        let (z, y, x) = (axis()?, axis()?, axis()?);
        let message = fields.next().unwrap_or("").to_string();
        Some(Self {
            position: StagePosition::new(z, y, x),
            message,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TailOutcome {
    Row(CoordinateRow),
    TimedOut { polls: u32 },
}

#[derive(Debug)]
pub struct CoordsTail {
    path: PathBuf,
    seek_pos: u64,
    inode: u64,
    incomplete: String,
    pending: VecDeque<CoordinateRow>,
}

impl CoordsTail {
    /// Start at the current end of the file; only rows appended later are seen.
    pub fn new(path: PathBuf) -> Self {
        let (seek_pos, inode) = file_metadata(&path).unwrap_or((0, 0));
        Self::at(path, seek_pos, inode)
    }

    /// Start at the beginning, replaying every row already in the file.
    pub fn from_start(path: PathBuf) -> Self {
        let inode = file_metadata(&path).map_or(0, |(_, ino)| ino);
        Self::at(path, 0, inode)
    }

    fn at(path: PathBuf, seek_pos: u64, inode: u64) -> Self {
        Self {
            path,
            seek_pos,
            inode,
            incomplete: String::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows completed since the last poll. A missing file yields nothing.
    pub fn poll_rows(&mut self) -> Vec<CoordinateRow> {
        let mut rows: Vec<CoordinateRow> = self.pending.drain(..).collect();
        rows.extend(
            self.poll_lines()
                .iter()
                .filter(|line| line.as_str() != HEADER.trim_end())
                .filter_map(|line| {
                    let row = CoordinateRow::parse(line);
                    if row.is_none() {
                        warn!(path = %self.path.display(), line = %line, "skipping unparsable row");
                    }
                    row
                }),
        );
        rows
    }

    /// Block until the next row arrives or `timeout` elapses, polling at
    /// `poll_interval` and doubling the delay (up to 8x) while the file
    /// stays quiet. A timeout too large to represent waits forever.
    pub fn wait_for_row(&mut self, poll_interval: Duration, timeout: Duration) -> TailOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let max_delay = poll_interval.saturating_mul(8);
        let mut delay = poll_interval;
        let mut polls = 0;
        loop {
            if let Some(row) = self.pending.pop_front() {
                return TailOutcome::Row(row);
            }
            polls += 1;
            let mut rows = self.poll_rows().into_iter();
            if let Some(row) = rows.next() {
                self.pending.extend(rows);
                return TailOutcome::Row(row);
            }
            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return TailOutcome::TimedOut { polls };
                    }
                    delay.min(deadline - now)
                }
                None => delay,
            };
            std::thread::sleep(nap);
            delay = delay.saturating_mul(2).min(max_delay);
        }
    }

    fn poll_lines(&mut self) -> Vec<String> {
        let Some((size, inode)) = file_metadata(&self.path) else {
            return Vec::new();
        };
        let replaced = self.inode != 0 && inode != self.inode;
        if replaced || size < self.seek_pos {
            self.seek_pos = 0;
            self.incomplete.clear();
        }
        self.inode = inode;

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to open coordinate file");
                return Vec::new();
            }
        };
        let mut reader = BufReader::new(file);
        if let Err(e) = reader.seek(SeekFrom::Start(self.seek_pos)) {
            warn!(path = %self.path.display(), offset = self.seek_pos, error = %e, "seek failed");
            return Vec::new();
        }

        let mut lines = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            match reader.read_line(&mut buf) {
                Ok(0) => break,
                Ok(_) if buf.ends_with('\n') => {
                    let mut line = std::mem::take(&mut self.incomplete);
                    line.push_str(buf.trim_end_matches(['\n', '\r']));
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                Ok(_) => self.incomplete.push_str(&buf),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "error reading coordinate file");
                    break;
                }
            }
        }
        if let Ok(pos) = reader.stream_position() {
            self.seek_pos = pos;
        }
        lines
    }
}

fn file_metadata(path: &Path) -> Option<(u64, u64)> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(path).ok().map(|m| (m.len(), m.ino()))
    }
    #[cfg(not(unix))]
    {
        fs::metadata(path).ok().map(|m| (m.len(), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open");
        f.write_all(text.as_bytes()).expect("write");
    }

    #[test]
    fn parse_row_with_sentinels() {
        let row = CoordinateRow::parse("nan\t50.000\t42.420\ttest_msg").expect("row");
        assert_eq!(row.position, StagePosition::new(None, Some(50.0), Some(42.42)));
        assert_eq!(row.message, "test_msg");
        assert!(CoordinateRow::parse("Z\tY\tX\tMESSAGE").is_none());
        assert!(CoordinateRow::parse("1\t2").is_none());
    }

    #[test]
    fn from_start_skips_header_and_reads_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dystrack_coords.txt");
        append(&path, "Z\tY\tX\tMESSAGE\n1.0\t2.0\t3.0\tOK\n");

        let mut tail = CoordsTail::from_start(path.clone());
        let rows = tail.poll_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "OK");
        assert!(tail.poll_rows().is_empty());
    }

    #[test]
    fn new_tail_ignores_history_and_buffers_partial_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dystrack_coords.txt");
        append(&path, "Z\tY\tX\tMESSAGE\n1\t1\t1\told\n");

        let mut tail = CoordsTail::new(path.clone());
        assert!(tail.poll_rows().is_empty());

        append(&path, "nan\tnan\t");
        assert!(tail.poll_rows().is_empty());
        append(&path, "nan\tImage analysis failed!\n");
        let rows = tail.poll_rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].position.is_unchanged());
        assert_eq!(rows[0].message, "Image analysis failed!");
    }

    #[test]
    fn truncation_restarts_from_beginning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c.txt");
        append(&path, "Z\tY\tX\tMESSAGE\n1\t2\t3\tfirst session row\n");
        let mut tail = CoordsTail::new(path.clone());

        fs::write(&path, "Z\tY\tX\tMESSAGE\n4\t5\t6\tB\n").expect("rewrite");
        let rows = tail.poll_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "B");
    }

    #[test]
    fn missing_file_yields_nothing_then_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tail = CoordsTail::new(dir.path().join("absent.txt"));
        assert!(tail.poll_rows().is_empty());
        assert!(matches!(
            tail.wait_for_row(Duration::from_millis(1), Duration::from_millis(20)),
            TailOutcome::TimedOut { polls } if polls >= 2
        ));
    }

    #[test]
    fn wait_for_row_returns_rows_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c.txt");
        append(&path, "Z\tY\tX\tMESSAGE\n1\t1\t1\ta\n2\t2\t2\tb\n");
        let mut tail = CoordsTail::from_start(path);

        let first = tail.wait_for_row(Duration::from_millis(1), Duration::ZERO);
        let second = tail.wait_for_row(Duration::from_millis(1), Duration::ZERO);
        assert!(matches!(first, TailOutcome::Row(ref r) if r.message == "a"));
        assert!(matches!(second, TailOutcome::Row(ref r) if r.message == "b"));
    }

    #[test]
    fn huge_timeout_waits_for_next_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c.txt");
        let mut tail = CoordsTail::new(path.clone());

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            append(&path, "Z\tY\tX\tMESSAGE\n7\t8\t9\tlate\n");
        });
        let outcome = tail.wait_for_row(Duration::from_millis(1), Duration::from_secs(u64::MAX));
        writer.join().expect("writer");
        assert!(matches!(outcome, TailOutcome::Row(ref r) if r.message == "late"));
    }
}
