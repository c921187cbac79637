//! TOML-based service configuration.
//!
//! Read from the path in `COURSE_INSIGHT_CONFIG`, or `course_insight.toml`
//! in the working directory. A missing file means "all defaults".

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

pub const CONFIG_ENV: &str = "COURSE_INSIGHT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "course_insight.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// XP granted by the event hooks before the tier multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationConfig {
    #[serde(default = "default_login_xp")]
    pub login_xp: i64,
    #[serde(default = "default_review_xp")]
    pub review_xp: i64,
    #[serde(default = "default_upvote_xp")]
    pub upvote_xp: i64,
    /// A review counts as detailed once its comment reaches this many characters.
    #[serde(default = "default_detailed_review_min_chars")]
    pub detailed_review_min_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Upper bound on concurrent dropout scorings per course analysis.
    #[serde(default = "default_risk_fanout_limit")]
    pub risk_fanout_limit: usize,
    #[serde(default = "default_synthetic_min_hours")]
    pub synthetic_min_hours: u32,
    #[serde(default = "default_synthetic_max_hours")]
    pub synthetic_max_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gamification: GamificationConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub seed_demo_data: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite://course_insight.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_login_xp() -> i64 {
    10
}

fn default_review_xp() -> i64 {
    50
}

fn default_upvote_xp() -> i64 {
    5
}

fn default_detailed_review_min_chars() -> usize {
    100
}

fn default_risk_fanout_limit() -> usize {
    8
}

fn default_synthetic_min_hours() -> u32 {
    4
}

fn default_synthetic_max_hours() -> u32 {
    8
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            login_xp: default_login_xp(),
            review_xp: default_review_xp(),
            upvote_xp: default_upvote_xp(),
            detailed_review_min_chars: default_detailed_review_min_chars(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            risk_fanout_limit: default_risk_fanout_limit(),
            synthetic_min_hours: default_synthetic_min_hours(),
            synthetic_max_hours: default_synthetic_max_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    /// Load from `COURSE_INSIGHT_CONFIG` or the default path.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.analytics.risk_fanout_limit == 0 {
            return Err(CoreError::Config(
                "analytics.risk_fanout_limit must be at least 1".to_string(),
            ));
        }
        if self.analytics.synthetic_min_hours > self.analytics.synthetic_max_hours {
            return Err(CoreError::Config(
                "analytics.synthetic_min_hours exceeds synthetic_max_hours".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gamification.review_xp, 50);
        assert_eq!(config.analytics.risk_fanout_limit, 8);
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [gamification]
            login_xp = 25

            [analytics]
            risk_fanout_limit = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.gamification.login_xp, 25);
        assert_eq!(config.gamification.upvote_xp, 5);
        assert_eq!(config.analytics.risk_fanout_limit, 2);
        assert_eq!(config.analytics.synthetic_max_hours, 8);
    }

    #[test]
    fn test_zero_fanout_rejected() {
        let err = AppConfig::from_toml("[analytics]\nrisk_fanout_limit = 0\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_inverted_synthetic_range_rejected() {
        let err = AppConfig::from_toml(
            "[analytics]\nsynthetic_min_hours = 9\nsynthetic_max_hours = 3\n",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.database.url, "sqlite://course_insight.db");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("course_insight.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "seed_demo_data = true\n[server]\nport = 9090").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.seed_demo_data);
        assert_eq!(config.bind_address(), ("127.0.0.1".to_string(), 9090));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(CoreError::Config(_))));
    }
}
