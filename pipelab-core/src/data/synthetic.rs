//! Offline providers: a seeded random walk and a closed-form fixture.

use super::provider::{Bar, DataError, DataProvider, DataSource, PriceHistory};
use chrono::{Datelike, NaiveDate, Weekday};

/// Weekdays in `[start, end]`. No holiday calendar.
fn weekdays(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start
        .iter_days()
        .take_while(move |d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), DataError> {
    if start > end {
        return Err(DataError::InvalidRange { start, end });
    }
    Ok(())
}

/// Random-walk bars, deterministic per symbol.
///
/// Produces a simple random walk from a starting price of 100.0, seeded from
/// the symbol name. These are clearly fake and tagged as synthetic.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticProvider;

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, DataError> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        check_range(start, end)?;
        tracing::warn!(symbol, "generating synthetic data");

        let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);
        let mut price = 100.0_f64;

        let bars = weekdays(start, end)
            .map(|date| {
                let daily_return: f64 = rng.gen_range(-0.03..0.03);
                let open = price;
                let close = price * (1.0 + daily_return);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                let volume = rng.gen_range(500_000..5_000_000u64);
                price = close;
                Bar {
                    date,
                    open,
                    high,
                    low,
                    close,
                    volume: Some(volume),
                    adj_close: close,
                }
            })
            .collect();

        Ok(PriceHistory {
            symbol: symbol.to_string(),
            source: DataSource::Synthetic,
            bars,
        })
    }
}

/// Closed-form bars for tests and reference snapshots.
///
/// For the `k`-th weekday since `start` and a per-symbol offset `s` (sum of
/// the symbol's bytes modulo 50), close is `100 + s + k`, open is close - 1,
/// high is close + 2, low is close - 2 and volume is `1_000_000 + 1_000 * s + k`.
/// Every value is an exact integer, so results are stable across platforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureProvider;

impl FixtureProvider {
    pub fn symbol_offset(symbol: &str) -> u64 {
        symbol.bytes().map(u64::from).sum::<u64>() % 50
    }
}

impl DataProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, DataError> {
        check_range(start, end)?;
        let offset = Self::symbol_offset(symbol);

        let bars = weekdays(start, end)
            .enumerate()
            .map(|(k, date)| {
                let k = k as u64;
                let close = (100 + offset + k) as f64;
                Bar {
                    date,
                    open: close - 1.0,
                    high: close + 2.0,
                    low: close - 2.0,
                    close,
                    volume: Some(1_000_000 + 1_000 * offset + k),
                    adj_close: close,
                }
            })
            .collect();

        Ok(PriceHistory {
            symbol: symbol.to_string(),
            source: DataSource::Fixture,
            bars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
    }

    #[test]
    fn synthetic_is_deterministic_per_symbol() {
        let a = SyntheticProvider.fetch("SPY", jan(4), jan(29)).unwrap();
        let b = SyntheticProvider.fetch("SPY", jan(4), jan(29)).unwrap();
        let c = SyntheticProvider.fetch("QQQ", jan(4), jan(29)).unwrap();
        assert_eq!(a.bars, b.bars);
        assert_ne!(a.bars, c.bars);
        assert_eq!(a.source, DataSource::Synthetic);
    }

    #[test]
    fn synthetic_bars_are_sane() {
        let result = SyntheticProvider.fetch("SPY", jan(4), jan(29)).unwrap();
        for bar in &result.bars {
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.close > 0.0);
        }
    }

    #[test]
    fn fixture_skips_weekends() {
        let result = FixtureProvider.fetch("AAPL", jan(4), jan(29)).unwrap();
        assert_eq!(result.bars.len(), 20);
        assert_eq!(result.bars.first().unwrap().date, jan(4));
        assert_eq!(result.bars.last().unwrap().date, jan(29));
    }

    #[test]
    fn fixture_values_follow_formula() {
        // A=65 A=65 P=80 L=76 -> 286 % 50 = 36
        assert_eq!(FixtureProvider::symbol_offset("AAPL"), 36);
        let result = FixtureProvider.fetch("AAPL", jan(4), jan(5)).unwrap();
        assert_eq!(result.bars[1].close, 137.0);
        assert_eq!(result.bars[1].volume, Some(1_036_001));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(matches!(
            FixtureProvider.fetch("AAPL", jan(5), jan(4)),
            Err(DataError::InvalidRange { .. })
        ));
    }
}
