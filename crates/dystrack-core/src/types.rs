use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword arguments forwarded to every pipeline call.
pub type ImgKwargs = serde_json::Map<String, serde_json::Value>;

/// Cache carried from one pipeline call to the next. Owned by the scheduler.
pub type ImgCache = serde_json::Map<String, serde_json::Value>;

/// Status message sent when the pipeline could not produce a position.
pub const ANALYSIS_FAILED_MSG: &str = "Image analysis failed!";

/// Diagnostic sent with the fallback command once all send attempts failed.
pub const TRANSMISSION_FAILED_MSG: &str = "Coordinate communication failed!";

// ─── Stage Position ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Z,
    Y,
    X,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Z => "Z",
            Self::Y => "Y",
            Self::X => "X",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New stage position. `None` on an axis means "no new value, keep the
/// previous one" and is never replaced by a number the pipeline did not
/// produce.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePosition {
    pub z: Option<f64>,
    pub y: Option<f64>,
    pub x: Option<f64>,
}

impl StagePosition {
    pub const UNCHANGED: Self = Self {
        z: None,
        y: None,
        x: None,
    };

    /// Build a position, mapping non-finite values to the keep-previous sentinel.
    pub fn new(z: Option<f64>, y: Option<f64>, x: Option<f64>) -> Self {
        Self {
            z: z.filter(|v| v.is_finite()),
            y: y.filter(|v| v.is_finite()),
            x: x.filter(|v| v.is_finite()),
        }
    }

    pub fn normalized(self) -> Self {
        Self::new(self.z, self.y, self.x)
    }

    pub fn is_unchanged(&self) -> bool {
        self.z.is_none() && self.y.is_none() && self.x.is_none()
    }

    /// Axes in the fixed Z, Y, X order used by every channel.
    pub fn axes(&self) -> [(Axis, Option<f64>); 3] {
        [(Axis::Z, self.z), (Axis::Y, self.y), (Axis::X, self.x)]
    }
}

impl fmt::Display for StagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_axis = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v}"));
        write!(
            f,
            "z={} y={} x={}",
            fmt_axis(self.z),
            fmt_axis(self.y),
            fmt_axis(self.x)
        )
    }
}

// ─── Action Token ─────────────────────────────────────────────────

/// Command for the microscope macro.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionToken {
    /// Acquire at the transmitted (or retained) position.
    #[default]
    Focus,
    /// Take no action and log the accompanying error message.
    Nothing,
}

impl ActionToken {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Nothing => "nothing",
        }
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Pipeline Output ──────────────────────────────────────────────

/// The 5-tuple returned by an analysis pipeline: position, message, cache.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineOutput {
    pub position: StagePosition,
    pub message: String,
    pub cache: ImgCache,
}

impl PipelineOutput {
    pub fn new(position: StagePosition, message: impl Into<String>, cache: ImgCache) -> Self {
        Self {
            position,
            message: message.into(),
            cache,
        }
    }

    /// All-sentinel failure result carrying the caller's cache unchanged.
    pub fn failed(cache: ImgCache) -> Self {
        Self {
            position: StagePosition::UNCHANGED,
            message: ANALYSIS_FAILED_MSG.to_string(),
            cache,
        }
    }
}

// ─── Transmission ─────────────────────────────────────────────────

/// One payload handed to a transmission channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionAttempt {
    pub position: StagePosition,
    pub action: ActionToken,
    pub message: Option<String>,
}

impl TransmissionAttempt {
    /// Regular send of a pipeline result (successful or failed analysis).
    pub fn focus(position: StagePosition, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            position,
            action: ActionToken::Focus,
            message: (!message.is_empty()).then_some(message),
        }
    }

    /// Degraded command sent once every regular attempt has failed.
    pub fn fallback() -> Self {
        Self {
            position: StagePosition::UNCHANGED,
            action: ActionToken::Nothing,
            message: Some(TRANSMISSION_FAILED_MSG.to_string()),
        }
    }

    pub fn message_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Final delivery state of one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// A regular attempt succeeded.
    Delivered { attempts: u32 },
    /// Every regular attempt failed; the fallback command went through.
    FallbackDelivered { attempts: u32 },
    /// Regular attempts and the fallback all failed.
    Failed { attempts: u32 },
}

impl DeliveryStatus {
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

// ─── Run Statistics ───────────────────────────────────────────────

/// Counters of one monitoring session. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Poll iterations performed.
    pub checks: u64,
    /// Paths newly observed in the watched tree.
    pub new_files: u64,
    /// New paths accepted by the file matcher.
    pub target_files: u64,
    /// Pipeline calls that returned a result.
    pub img_success: u64,
    /// Triggers whose coordinates were delivered by a regular attempt.
    pub coords_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_axes_become_sentinels() {
        let pos = StagePosition::new(Some(f64::NAN), Some(1.5), Some(f64::INFINITY));
        assert_eq!(pos, StagePosition::new(None, Some(1.5), None));
        assert!(!pos.is_unchanged());
        assert!(StagePosition::UNCHANGED.is_unchanged());
    }

    #[test]
    fn axes_are_ordered_zyx() {
        let pos = StagePosition::new(Some(1.0), Some(2.0), Some(3.0));
        let names: Vec<&str> = pos.axes().iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(names, vec!["Z", "Y", "X"]);
    }

    #[test]
    fn fallback_attempt_is_all_sentinel_nothing() {
        let attempt = TransmissionAttempt::fallback();
        assert!(attempt.position.is_unchanged());
        assert_eq!(attempt.action, ActionToken::Nothing);
        assert_eq!(attempt.message_or_empty(), TRANSMISSION_FAILED_MSG);
    }

    #[test]
    fn focus_attempt_drops_empty_message() {
        let attempt = TransmissionAttempt::focus(StagePosition::UNCHANGED, "");
        assert_eq!(attempt.message, None);
        let attempt = TransmissionAttempt::focus(StagePosition::UNCHANGED, "OK");
        assert_eq!(attempt.message.as_deref(), Some("OK"));
    }

    #[test]
    fn failed_output_keeps_cache() {
        let mut cache = ImgCache::new();
        cache.insert("prev_x".into(), serde_json::json!(12.0));
        let out = PipelineOutput::failed(cache.clone());
        assert!(out.position.is_unchanged());
        assert_eq!(out.message, ANALYSIS_FAILED_MSG);
        assert_eq!(out.cache, cache);
    }

    #[test]
    fn run_stats_serializes_flat() {
        let stats = RunStats {
            checks: 4,
            new_files: 2,
            target_files: 1,
            img_success: 1,
            coords_sent: 1,
        };
        let json = serde_json::to_value(stats).expect("serialize");
        assert_eq!(json["target_files"], 1);
        assert_eq!(json["checks"], 4);
    }
}
