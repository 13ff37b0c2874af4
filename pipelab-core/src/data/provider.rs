//! The provider seam behind `get_yahoo_data`.
//!
//! A provider returns the daily bars of one ticker; [`super::fetch_market_data`]
//! turns them into frames. Tests swap in the offline providers so the
//! pipeline never needs the network.

use crate::frame::FrameError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One trading day as reported by a provider. Missing prices are NaN, a
/// missing volume is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: Option<u64>,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} fetching {symbol}")]
    Http { symbol: String, status: u16 },

    #[error("provider '{0}' refused further requests")]
    Blocked(String),

    #[error("provider requires authentication")]
    Unauthorized,

    #[error("no data for {0}")]
    NoData(String),

    #[error("unexpected response for {symbol}: {detail}")]
    Malformed { symbol: String, detail: String },

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("bars for {ticker} do not form a frame: {source}")]
    Frame {
        ticker: String,
        #[source]
        source: FrameError,
    },
}

impl DataError {
    /// Worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            DataError::Network(_) | DataError::RateLimited { .. } => true,
            DataError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn malformed(symbol: &str, detail: impl Into<String>) -> Self {
        DataError::Malformed {
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }
}

/// Where a price history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Yahoo,
    Synthetic,
    Fixture,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSource::Yahoo => "yahoo",
            DataSource::Synthetic => "synthetic",
            DataSource::Fixture => "fixture",
        })
    }
}

/// Bars of one ticker, oldest first.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub symbol: String,
    pub source: DataSource,
    pub bars: Vec<Bar>,
}

pub trait DataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Daily bars for `symbol` over the inclusive range `[start, end]`.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<PriceHistory, DataError>;

    /// False once the provider has stopped accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}
