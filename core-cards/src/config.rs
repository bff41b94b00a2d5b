//! # Selection Configuration
//!
//! Engine tuning for the card set manager and its providers. Bridges live in
//! [`core_runtime::config::CoreConfig`]; this struct only holds behaviour.

use bridge_traits::FileRecord;
use serde::{Deserialize, Serialize};

use crate::error::{CardError, Result};
use crate::models::{CardSetMode, SelectionOptions};
use crate::paths::is_hidden;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Lowercase extensions rendered as cards
    pub eligible_extensions: Vec<String>,

    /// Modes the factory may construct
    pub enabled_modes: Vec<CardSetMode>,

    /// Attempts for a failing store read, first try included
    pub read_retry_attempts: u32,

    /// Backoff before the first retry; doubles after every attempt
    pub initial_backoff_ms: u64,

    /// Bodies kept by the query provider's content cache
    pub content_cache_capacity: usize,

    /// Concurrent store reads during a scan
    pub max_concurrent_reads: usize,

    /// Upper bound for one query scan
    pub query_scan_timeout_secs: u64,

    /// Options used when nothing was persisted
    pub default_options: SelectionOptions,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            eligible_extensions: vec!["md".to_string()],
            enabled_modes: CardSetMode::ALL.to_vec(),
            read_retry_attempts: 3,
            initial_backoff_ms: 100,
            content_cache_capacity: 512,
            max_concurrent_reads: 8,
            query_scan_timeout_secs: 30,
            default_options: SelectionOptions::default(),
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.eligible_extensions.is_empty() {
            return Err(CardError::InvalidConfig(
                "at least one eligible extension is required".to_string(),
            ));
        }
        if self.read_retry_attempts == 0 {
            return Err(CardError::InvalidConfig(
                "read_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.content_cache_capacity == 0 {
            return Err(CardError::InvalidConfig(
                "content_cache_capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_reads == 0 {
            return Err(CardError::InvalidConfig(
                "max_concurrent_reads must be greater than 0".to_string(),
            ));
        }
        if !self.enabled_modes.contains(&self.default_options.mode) {
            return Err(CardError::InvalidConfig(format!(
                "default mode {} is not enabled",
                self.default_options.mode
            )));
        }
        Ok(())
    }

    pub fn is_mode_enabled(&self, mode: CardSetMode) -> bool {
        self.enabled_modes.contains(&mode)
    }

    /// Whether the file type can be rendered as a card.
    pub fn is_eligible(&self, file: &FileRecord) -> bool {
        file.extension().map_or(false, |ext| {
            self.eligible_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        })
    }

    /// Eligible type and, unless hidden files are wanted, not hidden.
    pub fn passes_base_rules(&self, file: &FileRecord, include_hidden: bool) -> bool {
        self.is_eligible(file) && (include_hidden || !is_hidden(&file.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SelectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_modes.len(), 4);
    }

    #[test]
    fn test_validation_errors() {
        let config = SelectionConfig {
            read_retry_attempts: 0,
            ..SelectionConfig::default()
        };
        assert!(matches!(config.validate(), Err(CardError::InvalidConfig(_))));

        let config = SelectionConfig {
            enabled_modes: vec![CardSetMode::WholeStore],
            ..SelectionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_eligibility() {
        let config = SelectionConfig::default();
        assert!(config.is_eligible(&FileRecord::new("notes/a.MD", 0, 0, 0)));
        assert!(!config.is_eligible(&FileRecord::new("notes/a.png", 0, 0, 0)));
        assert!(!config.is_eligible(&FileRecord::new("notes/README", 0, 0, 0)));

        let hidden = FileRecord::new(".trash/a.md", 0, 0, 0);
        assert!(!config.passes_base_rules(&hidden, false));
        assert!(config.passes_base_rules(&hidden, true));
    }
}
