use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::format::MoneyFormat;
use crate::freshness::{FreshnessPolicy, FUNDAMENTALS_TTL, FX_TTL, HISTORICAL_SERIES_TTL, QUOTE_TTL};
use crate::market_data::{FxPair, RetryPolicy, DEFAULT_FX_FALLBACK, DEFAULT_MAX_WORKERS};

const CONFIG_FILE_NAME: &str = "portfolio-sync.toml";

fn default_reporting_currency() -> String {
    "BRL".to_string()
}

fn default_foreign_currency() -> String {
    "USD".to_string()
}

fn default_local_market_suffix() -> String {
    ".SA".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("portfolio.db")
}

fn default_fx_fallback_rate() -> Decimal {
    DEFAULT_FX_FALLBACK
}

/// Time-to-live overrides per data class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub quote: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub fx: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub historical_series: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub fundamentals: Duration,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            quote: QUOTE_TTL,
            fx: FX_TTL,
            historical_series: HISTORICAL_SERIES_TTL,
            fundamentals: FUNDAMENTALS_TTL,
        }
    }
}

impl FreshnessConfig {
    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            quote: self.quote,
            fx: self.fx,
            historical_series: self.historical_series,
            fundamentals: self.fundamentals,
        }
    }
}

/// Worker pool and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_workers: usize,
    pub retry_attempts: u32,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub retry_initial_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            retry_attempts: retry.max_attempts,
            retry_initial_delay: retry.initial_delay,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_delay: self.retry_initial_delay,
        }
    }
}

/// Market-data provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Override the provider endpoint, e.g. for a local mirror.
    pub base_url: Option<String>,

    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Display/output formatting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Round reporting-currency amounts to this many decimal places.
    pub currency_decimals: Option<u32>,

    pub currency_grouping: bool,

    /// Optional prefix such as `"R$ "`.
    pub currency_symbol: Option<String>,

    /// Pad to exactly `currency_decimals` places.
    pub currency_fixed_decimals: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let money = MoneyFormat::default();
        Self {
            currency_decimals: money.decimals,
            currency_grouping: money.grouping,
            currency_symbol: money.symbol,
            currency_fixed_decimals: money.fixed_decimals,
        }
    }
}

impl DisplayConfig {
    pub fn money_format(&self) -> MoneyFormat {
        MoneyFormat {
            decimals: self.currency_decimals,
            grouping: self.currency_grouping,
            symbol: self.currency_symbol.clone(),
            fixed_decimals: self.currency_fixed_decimals,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// SQLite database file, relative to the data directory unless absolute.
    pub database: PathBuf,

    pub reporting_currency: String,

    /// Currency of foreign positions; converted into `reporting_currency`.
    pub foreign_currency: String,

    /// FX rate used when the provider cannot supply one.
    pub fx_fallback_rate: Decimal,

    /// Exchange suffix of local listings (`PETR4.SA`).
    pub local_market_suffix: String,

    pub freshness: FreshnessConfig,
    pub fetch: FetchConfig,
    pub provider: ProviderConfig,
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: default_database(),
            reporting_currency: default_reporting_currency(),
            foreign_currency: default_foreign_currency(),
            fx_fallback_rate: default_fx_fallback_rate(),
            local_market_suffix: default_local_market_suffix(),
            freshness: FreshnessConfig::default(),
            fetch: FetchConfig::default(),
            provider: ProviderConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_workers == 0 {
            anyhow::bail!("fetch.max_workers must be at least 1");
        }
        if self.fetch.retry_attempts == 0 {
            anyhow::bail!("fetch.retry_attempts must be at least 1");
        }
        if self.fx_fallback_rate <= Decimal::ZERO {
            anyhow::bail!("fx_fallback_rate must be positive");
        }
        if self.reporting_currency.trim().is_empty() || self.foreign_currency.trim().is_empty() {
            anyhow::bail!("currencies must not be empty");
        }
        Ok(())
    }

    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub reporting_currency: String,
    pub foreign_currency: String,
    pub fx_fallback_rate: Decimal,
    pub local_market_suffix: String,
    pub freshness: FreshnessConfig,
    pub fetch: FetchConfig,
    pub provider: ProviderConfig,
    pub display: DisplayConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./portfolio-sync.toml` if it exists in current directory
/// 2. `~/.local/share/portfolio-sync/portfolio-sync.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("portfolio-sync").join(CONFIG_FILE_NAME);
    }

    local_config
}

impl ResolvedConfig {
    fn resolve(config: Config, config_dir: &Path) -> Self {
        let data_dir = config.resolve_data_dir(config_dir);
        let database_path = if config.database.is_absolute() {
            config.database.clone()
        } else {
            data_dir.join(&config.database)
        };
        Self {
            data_dir,
            database_path,
            reporting_currency: config.reporting_currency.to_uppercase(),
            foreign_currency: config.foreign_currency.to_uppercase(),
            fx_fallback_rate: config.fx_fallback_rate,
            local_market_suffix: config.local_market_suffix,
            freshness: config.freshness,
            fetch: config.fetch,
            provider: config.provider,
            display: config.display,
        }
    }

    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::resolve(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a file, the config file's intended parent directory is the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::resolve(Config::default(), config_dir))
    }

    pub fn fx_pair(&self) -> FxPair {
        FxPair::new(&self.foreign_currency, &self.reporting_currency)
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        self.freshness.policy()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.fetch.retry_policy()
    }
}
