//! Configuration loading and config file resolution
//!
//! Every recognized option is an explicit, typed field with a built-in default.
//! A missing config file is not fatal: the services start on defaults and log a
//! warning. Invalid values and missing worker credentials are fatal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FLAGBOT_CONFIG";

/// Root configuration for both services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagBotConfig {
    /// SQLite database shared by the review service and all workers
    pub database_path: PathBuf,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
    pub review: ReviewConfig,
    pub trusted_reviewer: TrustedReviewerConfig,
    pub worker: WorkerConfig,
    pub presentation: PresentationConfig,
    pub classifier: ClassifierConfig,
}

impl Default for FlagBotConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("flagbot.db"),
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
            review: ReviewConfig::default(),
            trusted_reviewer: TrustedReviewerConfig::default(),
            worker: WorkerConfig::default(),
            presentation: PresentationConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    pub level: String,

    /// Optional log file, written in addition to stdout
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// HTTP command surface of the review service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5730".to_string(),
        }
    }
}

/// Pop order of pending sanitize requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeOrder {
    /// Oldest request first
    #[default]
    Fifo,
    /// Newest request first
    Lifo,
}

/// Review queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Quorum size: cast votes needed to finalize an item
    pub min_votes: u32,

    /// Items with any category score above this are queued for review
    pub flag_threshold: f64,

    /// Fraction of unflagged items queued anyway, as a control sample
    pub sample_rate: f64,

    pub sanitize_order: SanitizeOrder,

    /// Channel ids (opaque to the core; passed to the presentation port)
    pub review_channel: Option<i64>,
    pub sanitize_channel: Option<i64>,
    pub stats_channel: Option<i64>,
    pub scan_channels: Vec<i64>,

    /// Phrases replaced by `__name__` before an item is shown to reviewers
    pub blacklist: Vec<String>,

    /// Reactions a review view carries; each is cleared after a vote
    pub review_emojis: Vec<String>,

    /// Every decision is appended here as a labeled CSV row when set
    pub training_export: Option<PathBuf>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            min_votes: 3,
            flag_threshold: 0.5,
            sample_rate: 0.01,
            sanitize_order: SanitizeOrder::Fifo,
            review_channel: None,
            sanitize_channel: None,
            stats_channel: None,
            scan_channels: Vec::new(),
            blacklist: Vec::new(),
            review_emojis: ["🤬", "☠️", "🚫", "🔪", "🔞", "✅", "🧼"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            training_export: None,
        }
    }
}

/// Thresholds for promotion to trusted reviewer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedReviewerConfig {
    /// Completed reviews must be strictly greater than this
    pub min_reviews: i64,

    /// Total deviance (x1000) must be strictly less than this
    pub max_deviance: i64,
}

impl Default for TrustedReviewerConfig {
    fn default() -> Self {
        Self {
            min_reviews: 50,
            max_deviance: 200,
        }
    }
}

/// Worker fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of identity slots (one credential per slot)
    pub worker_count: u32,

    /// API credential per slot, indexed by slot number
    pub credentials: Vec<String>,

    /// Credential of the review bot account; reactions it seeded on review
    /// views survive reaction cleanup
    pub review_bot_credential: Option<String>,

    /// Base URL of the external chat API used by jobs
    pub api_base_url: String,

    pub lease_ttl_secs: u64,
    pub renew_interval_secs: u64,
    pub claim_backoff_secs: u64,
    pub job_poll_interval_ms: u64,

    /// Minimum spacing between two stats recomputations in one worker
    pub stats_cooldown_secs: u64,

    /// Outbound request budget per claimed identity
    pub requests_per_second: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            credentials: Vec::new(),
            review_bot_credential: None,
            api_base_url: "https://discord.com/api/v10".to_string(),
            lease_ttl_secs: 30,
            renew_interval_secs: 10,
            claim_backoff_secs: 10,
            job_poll_interval_ms: 500,
            stats_cooldown_secs: 180,
            requests_per_second: 5,
        }
    }
}

impl WorkerConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }

    pub fn claim_backoff(&self) -> Duration {
        Duration::from_secs(self.claim_backoff_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn stats_cooldown(&self) -> Duration {
        Duration::from_secs(self.stats_cooldown_secs)
    }
}

/// Presentation (webhook) configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PresentationConfig {
    /// When absent, rendered content is only logged
    pub webhook_url: Option<String>,
}

/// Classifier endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    /// When absent, only pre-scored submissions are accepted
    pub url: Option<String>,
}

impl FlagBotConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration back as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Cannot serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate options shared by both services
    pub fn validate(&self) -> Result<()> {
        if self.review.min_votes == 0 {
            return Err(Error::Config("review.min_votes must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.review.flag_threshold) {
            return Err(Error::Config(format!(
                "review.flag_threshold must be within [0, 1], got {}",
                self.review.flag_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.review.sample_rate) {
            return Err(Error::Config(format!(
                "review.sample_rate must be within [0, 1], got {}",
                self.review.sample_rate
            )));
        }
        if self.trusted_reviewer.min_reviews < 0 || self.trusted_reviewer.max_deviance < 0 {
            return Err(Error::Config(
                "trusted_reviewer thresholds must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate options the worker needs; missing credentials are fatal
    pub fn validate_worker(&self) -> Result<()> {
        self.validate()?;
        let worker = &self.worker;
        if worker.worker_count == 0 {
            return Err(Error::Config("worker.worker_count must be at least 1".to_string()));
        }
        if worker.credentials.len() < worker.worker_count as usize {
            return Err(Error::Config(format!(
                "worker.credentials has {} entries but worker_count is {}",
                worker.credentials.len(),
                worker.worker_count
            )));
        }
        if worker.credentials.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::Config("worker.credentials contains an empty entry".to_string()));
        }
        if worker
            .review_bot_credential
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
        {
            return Err(Error::Config("worker.review_bot_credential is required".to_string()));
        }
        if worker.renew_interval_secs == 0 || worker.renew_interval_secs >= worker.lease_ttl_secs {
            return Err(Error::Config(
                "worker.renew_interval_secs must be positive and shorter than lease_ttl_secs"
                    .to_string(),
            ));
        }
        if worker.requests_per_second == 0 {
            return Err(Error::Config(
                "worker.requests_per_second must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user config directory
/// 4. System-wide config file (fallback)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: ~/.config/flagbot/config.toml
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("flagbot").join("config.toml")) {
        if user_config.exists() {
            return user_config;
        }
    }

    // Priority 4: /etc/flagbot/config.toml
    PathBuf::from("/etc/flagbot/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = FlagBotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.review.min_votes, 3);
        assert_eq!(config.worker.lease_ttl(), Duration::from_secs(30));
        assert_eq!(config.review.sanitize_order, SanitizeOrder::Fifo);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FlagBotConfig::from_toml_str(
            r#"
            database_path = "/tmp/flag.db"

            [review]
            min_votes = 5
            sanitize_order = "lifo"
            blacklist = ["alice"]

            [trusted_reviewer]
            max_deviance = 150
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/flag.db"));
        assert_eq!(config.review.min_votes, 5);
        assert_eq!(config.review.sanitize_order, SanitizeOrder::Lifo);
        assert_eq!(config.review.flag_threshold, 0.5);
        assert_eq!(config.trusted_reviewer.min_reviews, 50);
        assert_eq!(config.trusted_reviewer.max_deviance, 150);
        assert_eq!(config.worker.worker_count, 3);
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let mut config = FlagBotConfig::default();
        config.review.min_votes = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_sample_rate_out_of_range_rejected() {
        let mut config = FlagBotConfig::default();
        assert_eq!(config.review.sample_rate, 0.01);
        config.review.sample_rate = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.review.sample_rate = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_requires_credential_per_slot() {
        let mut config = FlagBotConfig::default();
        config.worker.worker_count = 2;
        config.worker.credentials = vec!["token-a".to_string()];
        config.worker.review_bot_credential = Some("token-bot".to_string());
        assert!(matches!(config.validate_worker(), Err(Error::Config(_))));

        config.worker.credentials.push("token-b".to_string());
        assert!(config.validate_worker().is_ok());
    }

    #[test]
    fn test_worker_requires_review_bot_credential() {
        let mut config = FlagBotConfig::default();
        config.worker.credentials = vec!["a".into(), "b".into(), "c".into()];
        assert!(matches!(config.validate_worker(), Err(Error::Config(_))));

        config.worker.review_bot_credential = Some("  ".to_string());
        assert!(matches!(config.validate_worker(), Err(Error::Config(_))));

        config.worker.review_bot_credential = Some("token-bot".to_string());
        assert!(config.validate_worker().is_ok());
    }

    #[test]
    fn test_renew_must_be_shorter_than_ttl() {
        let mut config = FlagBotConfig::default();
        config.worker.credentials = vec!["a".into(), "b".into(), "c".into()];
        config.worker.review_bot_credential = Some("token-bot".to_string());
        config.worker.renew_interval_secs = 30;
        assert!(config.validate_worker().is_err());
    }

    #[test]
    fn test_save_then_load_keeps_runtime_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("flagbot.toml");

        let mut config = FlagBotConfig::default();
        config.review.blacklist.push("jane doe".to_string());
        config.review.scan_channels.push(42);
        config.save(&path).unwrap();

        let loaded = FlagBotConfig::load(&path).unwrap();
        assert_eq!(loaded.review.blacklist, vec!["jane doe".to_string()]);
        assert_eq!(loaded.review.scan_channels, vec![42]);
        assert_eq!(loaded.review.review_emojis, config.review.review_emojis);
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(Some(Path::new("/opt/flagbot.toml")));
        assert_eq!(path, PathBuf::from("/opt/flagbot.toml"));
    }
}
