//! Pipeline parameters and TOML configuration.

use crate::cache::PipelineCache;
use chrono::NaiveDate;
use pipelab_core::data::{DataError, DataProvider, FixtureProvider, SyntheticProvider, YahooProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Tickers of the reference run.
pub const DEFAULT_TICKERS: [&str; 4] = ["AAPL", "MSFT", "AMZN", "GOOGL"];

/// Default maximum age of a cached pipeline.
pub const DEFAULT_MAX_AGE_HOURS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no tickers configured")]
    EmptyTickers,

    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("unknown provider '{0}' (expected yahoo, synthetic or fixture)")]
    UnknownProvider(String),

    #[error("failed to create provider: {0}")]
    Provider(#[from] DataError),
}

/// Parameters of a pipeline run: which tickers, over which dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl PipelineParams {
    pub fn new<S: Into<String>>(
        tickers: impl IntoIterator<Item = S>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            start_date,
            end_date,
        }
    }

    /// Parameters of the reference run: four tickers over January 2021.
    pub fn reference() -> Self {
        Self::new(
            DEFAULT_TICKERS,
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap_or_default(),
            NaiveDate::from_ymd_opt(2021, 1, 29).unwrap_or_default(),
        )
    }

    /// Tickers deduplicated and sorted.
    pub fn sorted_tickers(&self) -> Vec<String> {
        let mut tickers = self.tickers.clone();
        tickers.sort();
        tickers.dedup();
        tickers
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tickers.is_empty() {
            return Err(ConfigError::EmptyTickers);
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::InvalidRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }

    /// Deterministic hash of the parameters. Ticker order and duplicates
    /// do not matter.
    pub fn params_hash(&self) -> String {
        let canonical = format!(
            "{}|{}|{}",
            self.sorted_tickers().join(","),
            self.start_date,
            self.end_date
        );
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self::reference()
    }
}

/// Which data provider feeds `get_yahoo_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Synthetic,
    Fixture,
}

impl ProviderKind {
    pub fn build(self) -> Result<Arc<dyn DataProvider>, ConfigError> {
        Ok(match self {
            ProviderKind::Yahoo => Arc::new(YahooProvider::new()?),
            ProviderKind::Synthetic => Arc::new(SyntheticProvider),
            ProviderKind::Fixture => Arc::new(FixtureProvider),
        })
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yahoo" => Ok(ProviderKind::Yahoo),
            "synthetic" => Ok(ProviderKind::Synthetic),
            "fixture" => Ok(ProviderKind::Fixture),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Yahoo => "yahoo",
            ProviderKind::Synthetic => "synthetic",
            ProviderKind::Fixture => "fixture",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the cached pipelines. Defaults to `$TMPDIR/cached_pipeline`.
    pub dir: Option<PathBuf>,
    pub max_age_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }
}

impl CacheConfig {
    pub fn root(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(PipelineCache::default_root)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3600)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("non_regression.json"),
        }
    }
}

/// Top-level configuration file.
///
/// ```toml
/// tickers = ["AAPL", "MSFT"]
/// start_date = "2021-01-04"
/// end_date = "2021-01-29"
/// provider = "synthetic"
///
/// [cache]
/// max_age_hours = 10
///
/// [snapshot]
/// path = "non_regression.json"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub provider: ProviderKind,
    pub cache: CacheConfig,
    pub snapshot: SnapshotConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let params = PipelineParams::reference();
        Self {
            tickers: params.tickers,
            start_date: params.start_date,
            end_date: params.end_date,
            provider: ProviderKind::default(),
            cache: CacheConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.params().validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn params(&self) -> PipelineParams {
        PipelineParams::new(self.tickers.clone(), self.start_date, self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_reference_config() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.params(), PipelineParams::reference());
        assert_eq!(config.cache.max_age(), Duration::from_secs(36_000));
    }

    #[test]
    fn parses_all_sections() {
        let config = PipelineConfig::from_toml(
            r#"
            tickers = ["SPY"]
            start_date = "2022-03-01"
            end_date = "2022-03-31"
            provider = "fixture"

            [cache]
            dir = "/tmp/pipelab"
            max_age_hours = 1

            [snapshot]
            path = "snap.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.tickers, vec!["SPY"]);
        assert_eq!(config.provider, ProviderKind::Fixture);
        assert_eq!(config.cache.root(), PathBuf::from("/tmp/pipelab"));
        assert_eq!(config.snapshot.path, PathBuf::from("snap.json"));
    }

    #[test]
    fn toml_roundtrip() {
        let config = PipelineConfig {
            provider: ProviderKind::Synthetic,
            ..PipelineConfig::default()
        };
        let parsed = PipelineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(matches!(
            PipelineConfig::from_toml("tickers = []"),
            Err(ConfigError::EmptyTickers)
        ));
        assert!(matches!(
            PipelineConfig::from_toml("start_date = \"2022-01-02\"\nend_date = \"2022-01-01\""),
            Err(ConfigError::InvalidRange { .. })
        ));
        assert!(matches!(
            PipelineConfig::from_toml("provider = \"bloomberg\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn params_hash_ignores_ticker_order() {
        let a = PipelineParams::reference();
        let mut b = a.clone();
        b.tickers.reverse();
        assert_eq!(a.params_hash(), b.params_hash());

        b.end_date = NaiveDate::from_ymd_opt(2021, 1, 28).unwrap();
        assert_ne!(a.params_hash(), b.params_hash());
    }

    #[test]
    fn provider_from_str() {
        assert_eq!("Fixture".parse::<ProviderKind>().unwrap(), ProviderKind::Fixture);
        assert!("nope".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Synthetic.to_string(), "synthetic");
    }
}
