//! Signal generation.
//!
//! Signals share the resolution of past prices: same dates, same tickers.

use crate::frame::Frame;
use std::collections::BTreeMap;

pub const BUY_AAPL: &str = "BUY_AAPL";
pub const BUY_AMZN: &str = "BUY_AMZN";

/// Named target-weight frames computed from closes and volumes.
pub fn signals(closes: &Frame, volumes: &Frame) -> BTreeMap<String, Frame> {
    tracing::info!("computing signals");

    // Zero everywhere either input has a row or column.
    let zeros = closes.presence().add(&volumes.presence()).scale(0.0);

    let mut signals = BTreeMap::new();
    for (name, ticker) in [(BUY_AAPL, "AAPL"), (BUY_AMZN, "AMZN")] {
        let mut weights = zeros.clone();
        weights.set_constant_column(ticker, 1.0);
        signals.insert(name.to_string(), weights);
    }
    signals
}
