//! Session report returned once the event loop has stopped.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dystrack_core::{ChannelKind, DeliveryStatus, RunStats, StagePosition};
use serde::Serialize;

/// Why the loop left the polling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxChecks,
    MaxTriggers,
    Cancelled,
}

/// One dispatched target file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRecord {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub position: StagePosition,
    pub message: String,
    /// Set when the pipeline failed and the failure result was sent instead.
    pub analysis_error: Option<String>,
    pub delivery: DeliveryStatus,
}

impl TriggerRecord {
    pub fn analysis_ok(&self) -> bool {
        self.analysis_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub target_dir: PathBuf,
    pub channel: ChannelKind,
    pub stats: RunStats,
    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub triggers: Vec<TriggerRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_with_snake_case_fields() {
        let now = Utc::now();
        let report = RunReport {
            target_dir: PathBuf::from("/data/run1"),
            channel: ChannelKind::Txt,
            stats: RunStats {
                checks: 3,
                target_files: 1,
                ..Default::default()
            },
            stop_reason: StopReason::MaxTriggers,
            started_at: now,
            ended_at: now,
            triggers: vec![TriggerRecord {
                path: PathBuf::from("/data/run1/prescan_0001.czi"),
                detected_at: now,
                position: StagePosition::new(None, Some(1.0), Some(2.0)),
                message: "OK".into(),
                analysis_error: None,
                delivery: DeliveryStatus::Delivered { attempts: 1 },
            }],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["channel"], "txt");
        assert_eq!(json["stop_reason"], "max_triggers");
        assert_eq!(json["stats"]["checks"], 3);
        assert_eq!(json["triggers"][0]["position"]["z"], serde_json::Value::Null);
        assert_eq!(json["triggers"][0]["delivery"]["delivered"]["attempts"], 1);
        assert!(report.triggers[0].analysis_ok());
    }
}
