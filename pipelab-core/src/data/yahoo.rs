//! Yahoo Finance chart API.
//!
//! One request per ticker against the v8 chart endpoint. Transient failures
//! are retried with exponential backoff; a 403 blocks the provider for the
//! rest of the process so a run does not keep hammering a refusing host.

use super::provider::{Bar, DataError, DataProvider, DataSource, PriceHistory};
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CHART_ENDPOINT: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) pipelab";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Envelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<Series>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct Series {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

/// Column-oriented prices; `None` where Yahoo has no value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}

fn at<T: Copy>(column: &[Option<T>], i: usize) -> Option<T> {
    column.get(i).copied().flatten()
}

impl Series {
    /// Rows with at least one value; all-empty rows are market holidays.
    fn into_bars(self, symbol: &str) -> Result<Vec<Bar>, DataError> {
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let adj = self.indicators.adjclose.into_iter().next().unwrap_or_default();

        let timestamps = self.timestamp.unwrap_or_default();
        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.into_iter().enumerate() {
            let (open, high, low, close) =
                (at(&quote.open, i), at(&quote.high, i), at(&quote.low, i), at(&quote.close, i));
            let volume = at(&quote.volume, i);
            if [open, high, low, close].iter().all(Option::is_none) && volume.is_none() {
                continue;
            }

            let date = DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| DataError::malformed(symbol, format!("timestamp {ts} out of range")))?;
            let close = close.unwrap_or(f64::NAN);
            bars.push(Bar {
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close,
                adj_close: at(&adj.adjclose, i).unwrap_or(close),
                volume,
            });
        }
        Ok(bars)
    }
}

fn parse_chart(symbol: &str, envelope: Envelope) -> Result<Vec<Bar>, DataError> {
    let Chart { result, error } = envelope.chart;
    let series = match (result.into_iter().flatten().next(), error) {
        (Some(series), _) => series,
        (None, Some(err)) if err.code == "Not Found" => return Err(DataError::NoData(symbol.into())),
        (None, Some(err)) => {
            return Err(DataError::malformed(symbol, format!("{}: {}", err.code, err.description)))
        }
        (None, None) => return Err(DataError::malformed(symbol, "chart has neither result nor error")),
    };

    let bars = series.into_bars(symbol)?;
    if bars.is_empty() {
        return Err(DataError::NoData(symbol.into()));
    }
    Ok(bars)
}

/// `period2` is the last second of `end`, so the end day is included.
fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
    let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc().timestamp();
    let period1 = midnight(start);
    let period2 = midnight(end) + 86_399;
    format!(
        "{CHART_ENDPOINT}/{symbol}?period1={period1}&period2={period2}\
         &interval=1d&includeAdjustedClose=true"
    )
}

/// Error for a non-success status, `None` on success.
fn status_error(symbol: &str, status: StatusCode, retry_after: Option<u64>) -> Option<DataError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(DataError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        })
    } else if status == StatusCode::UNAUTHORIZED {
        Some(DataError::Unauthorized)
    } else if status == StatusCode::FORBIDDEN {
        Some(DataError::Blocked("yahoo".into()))
    } else if status == StatusCode::NOT_FOUND {
        Some(DataError::NoData(symbol.into()))
    } else {
        Some(DataError::Http {
            symbol: symbol.into(),
            status: status.as_u16(),
        })
    }
}

/// Attempts after the first, and the backoff before attempt `n` (`base * 2^(n-1)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => self.base_delay.saturating_mul(1 << (n - 1).min(16)),
        }
    }

    /// Wait before attempt `attempt` after `err`. A rate limit waits at least
    /// as long as the server asked.
    pub fn backoff(&self, attempt: u32, err: &DataError) -> Duration {
        let delay = self.delay(attempt);
        match err {
            DataError::RateLimited { retry_after_secs } => {
                delay.max(Duration::from_secs(*retry_after_secs))
            }
            _ => delay,
        }
    }
}

pub struct YahooProvider {
    client: Client,
    blocked: AtomicBool,
    retry: RetryPolicy,
}

impl YahooProvider {
    pub fn new() -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DataError::Client(e.to_string()))?;
        Ok(Self {
            client,
            blocked: AtomicBool::new(false),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn attempt(&self, symbol: &str, url: &str) -> Result<Vec<Bar>, DataError> {
        let response: Response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::Network(e.to_string()))?;

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        if let Some(err) = status_error(symbol, response.status(), retry_after) {
            return Err(err);
        }

        let envelope: Envelope = response
            .json()
            .map_err(|e| DataError::malformed(symbol, e.to_string()))?;
        parse_chart(symbol, envelope)
    }

    fn fetch_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        if !self.is_available() {
            return Err(DataError::Blocked(self.name().to_string()));
        }

        let url = chart_url(symbol, start, end);
        let mut attempt = 0;
        loop {
            match self.attempt(symbol, &url) {
                Ok(bars) => return Ok(bars),
                Err(DataError::Blocked(provider)) => {
                    self.blocked.store(true, Ordering::Relaxed);
                    tracing::error!(symbol, "yahoo refused the request; provider blocked");
                    return Err(DataError::Blocked(provider));
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt, &err);
                    tracing::warn!(symbol, attempt, ?delay, error = %err, "retrying yahoo request");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceHistory, DataError> {
        if start > end {
            return Err(DataError::InvalidRange { start, end });
        }
        let bars = self.fetch_bars(symbol, start, end)?;
        tracing::debug!(symbol, bars = bars.len(), "fetched from yahoo");
        Ok(PriceHistory {
            symbol: symbol.to_string(),
            source: DataSource::Yahoo,
            bars,
        })
    }

    fn is_available(&self) -> bool {
        !self.blocked.load(Ordering::Relaxed)
    }
}
