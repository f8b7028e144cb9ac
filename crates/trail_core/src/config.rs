//! Engine Configuration
//!
//! Configuration lives in `~/.config/trail/config.toml`. Every field has a
//! default, so a missing file or a partial file is fine.
//!
//! ```toml
//! [remote]
//! base_url = "https://api.traillix.com/api"
//! request_timeout_secs = 10
//!
//! [sync]
//! interval_ms = 2000
//! item_delay_ms = 100
//! auth_warning_threshold = 3
//!
//! [rewards]
//! stage_advance = 10
//! practice_submit = 20
//! practice_pass = 50
//! first_try_bonus = 25
//! lesson_complete = 100
//!
//! [practice]
//! pass_score = 80
//!
//! [log]
//! level = "info"
//! ```

use crate::practice::DEFAULT_PASS_SCORE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "trail";
const CONFIG_FILE: &str = "config.toml";

/// Remote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds, valid: 1-120)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl RemoteSettings {
    pub fn effective_request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(1, 120))
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Background sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Time between sync passes (ms, valid: 250-60000)
    #[serde(default = "default_sync_interval")]
    pub interval_ms: u64,

    /// Pause between submissions within a pass (ms, valid: 0-5000)
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,

    /// Consecutive auth-halted passes before the UI is asked to re-login
    #[serde(default = "default_auth_warning_threshold")]
    pub auth_warning_threshold: u32,
}

fn default_sync_interval() -> u64 {
    2000
}

fn default_item_delay() -> u64 {
    100
}

fn default_auth_warning_threshold() -> u32 {
    3
}

impl SyncSettings {
    pub fn effective_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.clamp(250, 60_000))
    }

    pub fn effective_item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms.min(5_000))
    }

    pub fn effective_auth_warning_threshold(&self) -> u32 {
        self.auth_warning_threshold.max(1)
    }

    pub fn interval_was_clamped(&self) -> bool {
        self.interval_ms != self.effective_interval().as_millis() as u64
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_sync_interval(),
            item_delay_ms: default_item_delay(),
            auth_warning_threshold: default_auth_warning_threshold(),
        }
    }
}

/// XP granted per achievement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSettings {
    #[serde(default = "default_stage_advance")]
    pub stage_advance: u32,
    #[serde(default = "default_practice_submit")]
    pub practice_submit: u32,
    #[serde(default = "default_practice_pass")]
    pub practice_pass: u32,
    #[serde(default = "default_first_try_bonus")]
    pub first_try_bonus: u32,
    #[serde(default = "default_lesson_complete")]
    pub lesson_complete: u32,
}

fn default_stage_advance() -> u32 {
    10
}

fn default_practice_submit() -> u32 {
    20
}

fn default_practice_pass() -> u32 {
    50
}

fn default_first_try_bonus() -> u32 {
    25
}

fn default_lesson_complete() -> u32 {
    100
}

impl RewardSettings {
    /// Most XP a single lesson can yield
    pub fn lesson_maximum(&self) -> u32 {
        // Five forward content moves plus two practices
        self.stage_advance * 5
            + 2 * (self.practice_submit + self.practice_pass + self.first_try_bonus)
            + self.lesson_complete
    }
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            stage_advance: default_stage_advance(),
            practice_submit: default_practice_submit(),
            practice_pass: default_practice_pass(),
            first_try_bonus: default_first_try_bonus(),
            lesson_complete: default_lesson_complete(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeSettings {
    #[serde(default = "default_pass_score")]
    pub pass_score: u8,
}

fn default_pass_score() -> u8 {
    DEFAULT_PASS_SCORE
}

impl PracticeSettings {
    pub fn effective_pass_score(&self) -> u8 {
        self.pass_score.clamp(1, 100)
    }
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            pass_score: default_pass_score(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub rewards: RewardSettings,
    #[serde(default)]
    pub practice: PracticeSettings,
    #[serde(default)]
    pub log: LogConfig,
}

impl EngineConfig {
    /// Default config path (`$XDG_CONFIG_HOME/trail/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from a file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from the default path, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sync.effective_interval(), Duration::from_secs(2));
        assert_eq!(config.sync.effective_item_delay(), Duration::from_millis(100));
        assert_eq!(config.remote.effective_request_timeout(), Duration::from_secs(10));
        assert_eq!(config.rewards.lesson_complete, 100);
        assert_eq!(config.practice.effective_pass_score(), 80);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_lesson_maximum_matches_trail_summary() {
        // 50 stage + 40 submissions + 100 passes + 50 first try + 100 completion
        assert_eq!(RewardSettings::default().lesson_maximum(), 340);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EngineConfig::parse(
            r#"
            [sync]
            interval_ms = 10

            [rewards]
            lesson_complete = 150
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.effective_interval(), Duration::from_millis(250));
        assert!(config.sync.interval_was_clamped());
        assert_eq!(config.sync.item_delay_ms, 100);
        assert_eq!(config.rewards.lesson_complete, 150);
        assert_eq!(config.rewards.stage_advance, 10);
        assert_eq!(config.remote.base_url, "http://localhost:3000/api");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sync.interval_ms, 2000);
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sync\ninterval_ms = ").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = EngineConfig::default();
        config.remote.base_url = "https://api.example.test/api".to_string();
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.remote.base_url, "https://api.example.test/api");
    }
}
