use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Sync engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pause between two missing dates.
    #[serde(default = "default_date_delay_ms")]
    pub date_delay_ms: u64,

    #[serde(default = "default_commodities_path")]
    pub commodities_path: PathBuf,

    /// Re-fetch commodities that failed on an otherwise populated date.
    #[serde(default)]
    pub retry_failed_commodities: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://agmarknet.gov.in/SearchCmmMkt.aspx".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/60.0.3112.50 Safari/537.36"
        .to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/agrimarket.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_window_days() -> u32 {
    45
}
fn default_max_concurrency() -> usize {
    8
}
fn default_date_delay_ms() -> u64 {
    1000
}
fn default_commodities_path() -> PathBuf {
    PathBuf::from("data/CommodityAndCommodityHeads.csv")
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            max_concurrency: default_max_concurrency(),
            date_delay_ms: default_date_delay_ms(),
            commodities_path: default_commodities_path(),
            retry_failed_commodities: false,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("AGRI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingDatabase);
        }
        if self.sync.window_days == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.window_days",
                reason: "must be at least 1".into(),
            });
        }
        if self.sync.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if url::Url::parse(&self.scraper.base_url).is_err() {
            return Err(ConfigError::Invalid {
                key: "scraper.base_url",
                reason: format!("{:?} is not a URL", self.scraper.base_url),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_source_behaviour() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.sync.window_days, 45);
        assert_eq!(cfg.sync.max_concurrency, 8);
        assert_eq!(cfg.scraper.timeout_secs, 15);
        assert!(!cfg.sync.retry_failed_commodities);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[sync]\nwindow_days = 7\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.sync.window_days, 7);
        assert_eq!(cfg.sync.max_concurrency, 8);
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/agrimarket.duckdb"));
    }

    #[test]
    fn rejects_empty_db_path() {
        let mut cfg = AppConfig::default();
        cfg.storage.db_path = PathBuf::new();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingDatabase)));
    }

    #[test]
    fn rejects_zero_window_and_zero_concurrency() {
        let mut cfg = AppConfig::default();
        cfg.sync.window_days = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "sync.window_days", .. })
        ));

        let mut cfg = AppConfig::default();
        cfg.sync.max_concurrency = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "sync.max_concurrency", .. })
        ));
    }
}
