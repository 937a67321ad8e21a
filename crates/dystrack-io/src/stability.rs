//! Blocking wait until the microscope has finished writing an image file.

use std::path::Path;

use dystrack_core::{StabilityPolicy, StabilityStep, StabilityTracker};

/// Outcome of [`wait_for_stable_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStability {
    Stable { size: u64, checks: u32 },
    TimedOut { last_size: u64, checks: u32 },
}

impl FileStability {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable { .. })
    }
}

/// Poll the file size until it stops changing or the check budget runs out.
///
/// Runs on the calling thread; the scheduler calls it from the blocking pool.
pub fn wait_for_stable_file(path: &Path, policy: &StabilityPolicy) -> std::io::Result<FileStability> {
    let mut tracker = StabilityTracker::new(policy.clone());
    loop {
        let size = std::fs::metadata(path)?.len();
        match tracker.observe(size) {
            StabilityStep::Stable { size } => {
                return Ok(FileStability::Stable {
                    size,
                    checks: tracker.checks(),
                });
            }
            StabilityStep::Exhausted { last_size } => {
                tracing::warn!(
                    path = %path.display(),
                    last_size,
                    checks = tracker.checks(),
                    "file still changing after stability budget"
                );
                return Ok(FileStability::TimedOut {
                    last_size,
                    checks: tracker.checks(),
                });
            }
            StabilityStep::Wait => std::thread::sleep(policy.check_interval()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fast(max_checks: u32) -> StabilityPolicy {
        StabilityPolicy {
            check_interval_ms: 5,
            stable_checks: 1,
            max_checks,
        }
    }

    #[test]
    fn finished_file_is_stable_after_two_checks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("img.czi");
        fs::write(&path, vec![0u8; 64]).expect("write");
        let outcome = wait_for_stable_file(&path, &fast(10)).expect("wait");
        assert_eq!(outcome, FileStability::Stable { size: 64, checks: 2 });
        assert!(outcome.is_stable());
    }

    #[test]
    fn single_check_budget_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("img.czi");
        fs::write(&path, b"abc").expect("write");
        let outcome = wait_for_stable_file(&path, &fast(1)).expect("wait");
        assert_eq!(
            outcome,
            FileStability::TimedOut {
                last_size: 3,
                checks: 1
            }
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(wait_for_stable_file(&dir.path().join("nope"), &fast(3)).is_err());
    }
}
