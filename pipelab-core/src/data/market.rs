//! Multi-ticker market data: one OHLCV frame per ticker.

use super::provider::{Bar, DataError, DataProvider};
use crate::frame::{Frame, FrameError};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Ticker → OHLCV frame with columns [`FIELDS`].
pub type MarketData = BTreeMap<String, Frame>;

pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";
pub const ADJ_CLOSE: &str = "Adj Close";

/// Columns of every per-ticker frame.
pub const FIELDS: [&str; 6] = [OPEN, HIGH, LOW, CLOSE, VOLUME, ADJ_CLOSE];

/// Fetch every ticker (deduplicated, sorted) over `[start, end]`.
pub fn fetch_market_data<S: AsRef<str>>(
    provider: &dyn DataProvider,
    tickers: &[S],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<MarketData, DataError> {
    if start > end {
        return Err(DataError::InvalidRange { start, end });
    }
    if !provider.is_available() {
        return Err(DataError::Blocked(provider.name().to_string()));
    }

    let tickers: BTreeSet<&str> = tickers.iter().map(AsRef::as_ref).collect();
    tracing::info!(
        provider = provider.name(),
        tickers = tickers.len(),
        %start,
        %end,
        "loading price data"
    );

    let mut data = MarketData::new();
    for ticker in tickers {
        let fetched = provider.fetch(ticker, start, end)?;
        let frame = bars_to_frame(&fetched.bars).map_err(|source| DataError::Frame {
            ticker: ticker.to_string(),
            source,
        })?;
        data.insert(ticker.to_string(), frame);
    }
    Ok(data)
}

/// Convert provider bars to an OHLCV frame. NaN prices and absent volumes
/// become missing cells.
pub fn bars_to_frame(bars: &[Bar]) -> Result<Frame, FrameError> {
    let mut bars: Vec<&Bar> = bars.iter().collect();
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    let cell = |x: f64| if x.is_nan() { None } else { Some(x) };
    let column = |f: fn(&Bar) -> f64| bars.iter().map(|b| cell(f(b))).collect::<Vec<_>>();

    Frame::new(bars.iter().map(|b| b.date).collect())?
        .with_column(OPEN, column(|b| b.open))?
        .with_column(HIGH, column(|b| b.high))?
        .with_column(LOW, column(|b| b.low))?
        .with_column(CLOSE, column(|b| b.close))?
        .with_column(VOLUME, column(|b| b.volume.map_or(f64::NAN, |v| v as f64)))?
        .with_column(ADJ_CLOSE, column(|b| b.adj_close))
}
