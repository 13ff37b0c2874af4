//! Metric extraction: one field per ticker, tickers as columns.

use crate::data::market::{MarketData, CLOSE, VOLUME};
use crate::frame::{Frame, FrameError};

/// Project `field` out of every ticker frame. Columns are the sorted tickers,
/// rows the union of the tickers' dates.
pub fn extract_field(data: &MarketData, field: &str) -> Result<Frame, FrameError> {
    let mut series = Vec::with_capacity(data.len());
    for (ticker, frame) in data {
        let column = frame
            .column(field)
            .ok_or_else(|| FrameError::MissingColumn(format!("{ticker}.{field}")))?;
        let points = frame.index().iter().copied().zip(column.iter().copied()).collect();
        series.push((ticker.clone(), points));
    }
    Ok(Frame::concat_columns(series))
}

/// Close prices (columns = tickers, index = dates).
pub fn closes(data: &MarketData) -> Result<Frame, FrameError> {
    tracing::info!("loading close prices");
    extract_field(data, CLOSE)
}

/// Volumes (columns = tickers, index = dates).
pub fn volumes(data: &MarketData) -> Result<Frame, FrameError> {
    tracing::info!("loading volumes");
    extract_field(data, VOLUME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{fetch_market_data, FixtureProvider};
    use chrono::NaiveDate;

    fn data() -> MarketData {
        fetch_market_data(
            &FixtureProvider,
            &["MSFT", "AAPL"],
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 8).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn closes_have_one_column_per_ticker() {
        let closes = closes(&data()).unwrap();
        assert_eq!(closes.column_names(), vec!["AAPL", "MSFT"]);
        assert_eq!(closes.shape(), (5, 2));
        assert!(!closes.has_missing());
        assert!(closes.all_positive());
    }

    #[test]
    fn volumes_match_source_frames() {
        let data = data();
        let volumes = volumes(&data).unwrap();
        assert_eq!(volumes.column("AAPL"), data["AAPL"].column(VOLUME));
    }

    #[test]
    fn missing_field_is_reported() {
        let err = extract_field(&data(), "Dividends").unwrap_err();
        assert_eq!(err, FrameError::MissingColumn("AAPL.Dividends".into()));
    }
}
