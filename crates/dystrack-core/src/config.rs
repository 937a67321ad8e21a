//! Typed manager configuration and channel selection.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::matcher::FileMatcher;
use crate::policy::RetryPolicy;
use crate::types::{ImgCache, ImgKwargs};

/// Options recognized by the event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Sleep between polls that found nothing new, in milliseconds (default 1000).
    pub interval_ms: u64,
    pub file_start: String,
    pub file_end: String,
    /// Regex matched from the start of the base filename (default `.*`).
    pub file_regex: String,
    /// Stop after this many poll iterations.
    pub max_checks: Option<u64>,
    /// Stop after this many target files were dispatched.
    pub max_triggers: Option<u64>,
    /// Stop when the cancellation token fires (default true).
    pub end_on_cancel: bool,
    pub retry: RetryPolicy,
    /// Keyword arguments forwarded to every pipeline call.
    pub img_kwargs: ImgKwargs,
    /// Cache handed to the first pipeline call.
    pub img_cache: ImgCache,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            file_start: String::new(),
            file_end: String::new(),
            file_regex: ".*".to_string(),
            max_checks: None,
            max_triggers: None,
            end_on_cancel: true,
            retry: RetryPolicy::default(),
            img_kwargs: ImgKwargs::new(),
            img_cache: ImgCache::new(),
        }
    }
}

impl ManagerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Check everything that must hold before the first poll.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_checks.is_none() && self.max_triggers.is_none() && !self.end_on_cancel {
            return Err(ConfigError::NoEndingCondition);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        self.matcher().map(|_| ())
    }

    /// Build the target-file matcher from the configured filters.
    pub fn matcher(&self) -> Result<FileMatcher, ConfigError> {
        FileMatcher::new(&self.file_start, &self.file_end, &self.file_regex)
    }

    pub fn checks_exhausted(&self, checks: u64) -> bool {
        self.max_checks.is_some_and(|max| checks >= max)
    }

    pub fn triggers_exhausted(&self, triggers: u64) -> bool {
        self.max_triggers.is_some_and(|max| triggers >= max)
    }
}

// ─── Channel Kind ─────────────────────────────────────────────────

/// Transmission channel identifiers accepted on the command line and in config files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChannelKind {
    /// Append rows to the coordinate text file.
    #[default]
    Txt,
    /// Write fields to a key-value namespace polled by the macro.
    KeyValue,
    /// Hand coordinates to an external program.
    Command,
    /// Call a function supplied by the embedding host.
    Callback,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::KeyValue => "kv",
            Self::Command => "command",
            Self::Callback => "callback",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "kv" | "mypic" | "winreg" => Ok(Self::KeyValue),
            "command" | "cmd" => Ok(Self::Command),
            "callback" => Ok(Self::Callback),
            _ => Err(ConfigError::UnknownChannel(s.to_string())),
        }
    }
}

impl TryFrom<String> for ChannelKind {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ChannelKind> for String {
    fn from(kind: ChannelKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ending_condition_is_rejected() {
        let config = ManagerConfig {
            end_on_cancel: false,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::NoEndingCondition));
        assert!(err.to_string().contains("no ending condition"));
    }

    #[test]
    fn any_single_bound_is_enough() {
        for config in [
            ManagerConfig {
                end_on_cancel: false,
                max_checks: Some(10),
                ..Default::default()
            },
            ManagerConfig {
                end_on_cancel: false,
                max_triggers: Some(1),
                ..Default::default()
            },
            ManagerConfig::default(),
        ] {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = ManagerConfig {
            retry: RetryPolicy::immediate(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroAttempts)));
    }

    #[test]
    fn bad_regex_is_rejected_up_front() {
        let config = ManagerConfig {
            file_regex: "[".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn bounds() {
        let config = ManagerConfig {
            max_checks: Some(3),
            max_triggers: Some(1),
            ..Default::default()
        };
        assert!(!config.checks_exhausted(2));
        assert!(config.checks_exhausted(3));
        assert!(!config.triggers_exhausted(0));
        assert!(config.triggers_exhausted(1));
        assert!(!ManagerConfig::default().checks_exhausted(u64::MAX));
    }

    #[test]
    fn channel_kind_parsing() {
        assert_eq!("txt".parse::<ChannelKind>().expect("txt"), ChannelKind::Txt);
        assert_eq!("MyPiC".parse::<ChannelKind>().expect("kv"), ChannelKind::KeyValue);
        assert_eq!("command".parse::<ChannelKind>().expect("cmd"), ChannelKind::Command);
        let err = "unsupported_method".parse::<ChannelKind>().unwrap_err();
        assert!(err.to_string().contains("invalid transmission channel"));
    }

    #[test]
    fn channel_kind_serde() {
        let kind: ChannelKind = serde_json::from_str("\"kv\"").expect("parse");
        assert_eq!(kind, ChannelKind::KeyValue);
        assert!(serde_json::from_str::<ChannelKind>("\"pigeon\"").is_err());
        assert_eq!(serde_json::to_string(&ChannelKind::Txt).expect("ser"), "\"txt\"");
    }

    #[test]
    fn config_defaults_fill_partial_input() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"file_start": "prescan_", "max_triggers": 2}"#)
                .expect("parse");
        assert_eq!(config.file_start, "prescan_");
        assert_eq!(config.file_regex, ".*");
        assert_eq!(config.max_triggers, Some(2));
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
    }
}
