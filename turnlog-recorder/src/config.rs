use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// How long to wait for the sidebar before giving up on readiness (milliseconds)
    pub sidebar_timeout_ms: u64,

    /// How long a pending turn waits for its title before it is dropped (milliseconds)
    pub title_timeout_ms: u64,

    /// Length of the unmasked prompt kept for title comparison (characters)
    pub original_prompt_max_chars: usize,

    /// Number of leading characters compared between title and prompt
    pub title_match_prefix_chars: usize,

    /// Treat Enter (without Shift) in the prompt editor as a send
    pub capture_enter_key: bool,

    /// Record sends inside an existing conversation, confirmed by that
    /// conversation's own title. When off such sends are ignored
    pub record_existing_conversations: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sidebar_timeout_ms: 10_000,
            title_timeout_ms: 60_000,
            original_prompt_max_chars: 200,
            title_match_prefix_chars: 20,
            capture_enter_key: true,
            record_existing_conversations: true,
        }
    }
}

impl RecorderConfig {
    /// Load from a JSON file; keys not present keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::ConfigError(format!("Failed to read config {path:?}: {e}"))
        })?;
        let config: RecorderConfig = serde_json::from_str(&json).map_err(|e| {
            RecorderError::ConfigError(format!("Invalid config {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.title_match_prefix_chars == 0 {
            return Err(RecorderError::ConfigError(
                "title_match_prefix_chars must be greater than zero".to_string(),
            ));
        }
        if self.original_prompt_max_chars < self.title_match_prefix_chars {
            return Err(RecorderError::ConfigError(format!(
                "original_prompt_max_chars ({}) must be at least title_match_prefix_chars ({})",
                self.original_prompt_max_chars, self.title_match_prefix_chars
            )));
        }
        Ok(())
    }

    pub fn sidebar_timeout(&self) -> Duration {
        Duration::from_millis(self.sidebar_timeout_ms)
    }

    pub fn title_timeout(&self) -> Duration {
        Duration::from_millis(self.title_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"title_timeout_ms": 5000, "capture_enter_key": false}"#)
            .unwrap();

        let config = RecorderConfig::from_file(&path).unwrap();
        assert_eq!(config.title_timeout(), Duration::from_secs(5));
        assert!(!config.capture_enter_key);
        assert_eq!(config.sidebar_timeout_ms, 10_000);
        assert_eq!(config.original_prompt_max_chars, 200);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"title_match_prefix_chars": 0}"#).unwrap();
        assert!(matches!(
            RecorderConfig::from_file(&path),
            Err(RecorderError::ConfigError(_))
        ));

        assert!(matches!(
            RecorderConfig::from_file(dir.path().join("missing.json")),
            Err(RecorderError::ConfigError(_))
        ));
    }
}
