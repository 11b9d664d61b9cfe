use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub devto_api_key: Option<String>,

    /// Your own DEV.to username; your comments are excluded from sentiment analysis.
    pub author_username: Option<String>,

    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    #[serde(default = "default_attribution_window_hours")]
    pub attribution_window_hours: i64,

    /// How far from a window endpoint a snapshot may sit and still anchor
    /// attribution. Minutes, so a half-hour tolerance is expressible.
    #[serde(default = "default_proximity_tolerance_minutes")]
    pub proximity_tolerance_minutes: i64,

    #[serde(default = "default_insight_batch_size")]
    pub insight_batch_size: usize,

    #[serde(default = "default_lock_ttl_minutes")]
    pub lock_ttl_minutes: i64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devpulse");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("metrics.db").to_string_lossy().to_string()
}

fn default_rate_limit_ms() -> u64 {
    500
}

fn default_attribution_window_hours() -> i64 {
    168
}

fn default_proximity_tolerance_minutes() -> i64 {
    360
}

fn default_insight_batch_size() -> usize {
    50
}

fn default_lock_ttl_minutes() -> i64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            devto_api_key: None,
            author_username: None,
            rate_limit_ms: default_rate_limit_ms(),
            attribution_window_hours: default_attribution_window_hours(),
            proximity_tolerance_minutes: default_proximity_tolerance_minutes(),
            insight_batch_size: default_insight_batch_size(),
            lock_ttl_minutes: default_lock_ttl_minutes(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config =
                toml::from_str(&content).map_err(|e| AppError::Config(e.to_string()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devpulse")
            .join("config.toml")
    }

    /// The API key is required for sync only; read commands work without it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.devto_api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("devto_api_key is not set in config.toml".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_expressible_in_sub_hour_steps() {
        let config: Config = toml::from_str("proximity_tolerance_minutes = 30").unwrap();
        assert_eq!(config.proximity_tolerance_minutes, 30);
    }

    #[test]
    fn missing_knobs_fall_back_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.proximity_tolerance_minutes, 360);
        assert_eq!(config.attribution_window_hours, 168);
        assert_eq!(config.rate_limit_ms, 500);
        assert_eq!(config.insight_batch_size, 50);
        assert_eq!(config.lock_ttl_minutes, 30);
    }
}
