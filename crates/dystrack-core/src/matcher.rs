//! Target-file predicate applied to every newly observed path.

use std::path::Path;

use regex::Regex;

use crate::error::ConfigError;

/// Decides whether a new file is a scan that should trigger analysis.
///
/// A base filename matches when it starts with `file_start`, ends with
/// `file_end` and `file_regex` matches from its first character. Names
/// registered through [`FileMatcher::exclude_name`] never match; the
/// transmission channel uses this to keep its own output file from
/// re-triggering the loop.
#[derive(Debug, Clone)]
pub struct FileMatcher {
    file_start: String,
    file_end: String,
    file_regex: Regex,
    excluded_names: Vec<String>,
}

impl FileMatcher {
    pub fn new(file_start: &str, file_end: &str, file_regex: &str) -> Result<Self, ConfigError> {
        let anchored = format!("^(?:{file_regex})");
        let compiled = Regex::new(&anchored).map_err(|source| ConfigError::InvalidRegex {
            pattern: file_regex.to_string(),
            source,
        })?;
        Ok(Self {
            file_start: file_start.to_string(),
            file_end: file_end.to_string(),
            file_regex: compiled,
            excluded_names: Vec::new(),
        })
    }

    #[must_use]
    pub fn exclude_name(mut self, name: impl Into<String>) -> Self {
        self.excluded_names.push(name.into());
        self
    }

    /// Pure filename predicate, ignoring exclusions.
    pub fn matches_name(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.file_start)
            && file_name.ends_with(&self.file_end)
            && self.file_regex.is_match(file_name)
    }

    /// Whether `path` is a target file. Paths without a UTF-8 base name never are.
    pub fn is_target(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.excluded_names.iter().any(|ex| ex == name) {
            return false;
        }
        self.matches_name(name)
    }
}

/// One-shot form of [`FileMatcher::matches_name`].
pub fn matches(
    file_name: &str,
    file_start: &str,
    file_end: &str,
    file_regex: &str,
) -> Result<bool, ConfigError> {
    Ok(FileMatcher::new(file_start, file_end, file_regex)?.matches_name(file_name))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Same inputs, same answer.
        #[test]
        fn matching_is_idempotent(
            name in "[a-z_0-9.]{0,24}",
            start in "[a-z_]{0,4}",
            end in "[a-z.]{0,4}",
        ) {
            let m = FileMatcher::new(&start, &end, ".*").expect("valid");
            let first = m.matches_name(&name);
            for _ in 0..3 {
                prop_assert_eq!(m.matches_name(&name), first);
            }
        }

        /// Default filters accept any name.
        #[test]
        fn default_filters_accept_all(name in "\\PC{0,32}") {
            let m = FileMatcher::new("", "", ".*").expect("valid");
            prop_assert!(m.matches_name(&name));
        }
    }
}
