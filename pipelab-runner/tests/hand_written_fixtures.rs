//! Signals tested on fixtures built step by step from the data functions.
//!
//! Each fixture calls the registered function directly, the way a test
//! author would write them by hand.

use chrono::NaiveDate;
use pipelab_core::data::FixtureProvider;
use pipelab_core::library;
use pipelab_core::symbols::{CallArgs, Registry};
use pipelab_core::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

const TICKERS: [&str; 4] = ["AAPL", "MSFT", "AMZN", "GOOGL"];

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 4).unwrap()
}

fn end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 29).unwrap()
}

fn registry() -> Registry {
    let registry = Registry::new();
    library::install(&registry, Arc::new(FixtureProvider)).unwrap();
    registry
}

fn yahoo_data(registry: &Registry) -> Value {
    let tickers = Value::List(TICKERS.iter().map(|t| Value::from(*t)).collect());
    registry
        .call(
            "pipelab.data.get_yahoo_data",
            CallArgs::new().arg(tickers).arg(start_date()).arg(end_date()),
        )
        .unwrap()
}

fn closes(registry: &Registry, yahoo_data: &Value) -> Value {
    registry
        .call("pipelab.data.get_closes", CallArgs::new().arg(yahoo_data.clone()))
        .unwrap()
}

fn volumes(registry: &Registry, yahoo_data: &Value) -> Value {
    registry
        .call("pipelab.data.get_volumes", CallArgs::new().arg(yahoo_data.clone()))
        .unwrap()
}

#[test]
fn test_get_signals() {
    let registry = registry();
    let data = yahoo_data(&registry);
    let signals = registry
        .call(
            "pipelab.signals.get_signals",
            CallArgs::new()
                .arg(closes(&registry, &data))
                .arg(volumes(&registry, &data)),
        )
        .unwrap();

    let signals = signals.as_map().expect("signals should be a map");
    assert!(signals.len() >= 2);

    let tickers: BTreeSet<&str> = TICKERS.into_iter().collect();
    for (name, signal) in signals {
        let frame = signal.as_frame().unwrap_or_else(|| panic!("{name} is not a frame"));
        let columns: BTreeSet<&str> = frame.column_names().into_iter().collect();
        assert_eq!(columns, tickers, "{name}");
    }
}

#[test]
fn test_signals_target_one_ticker() {
    let registry = registry();
    let data = yahoo_data(&registry);
    let signals = registry
        .call(
            "pipelab.signals.get_signals",
            CallArgs::new()
                .kwarg("volumes", volumes(&registry, &data))
                .kwarg("closes", closes(&registry, &data)),
        )
        .unwrap()
        .as_frame_map()
        .unwrap();

    let buy_amzn = &signals["BUY_AMZN"];
    assert!(buy_amzn.column("AMZN").unwrap().iter().all(|c| *c == Some(1.0)));
    for other in ["AAPL", "MSFT", "GOOGL"] {
        assert!(buy_amzn.column(other).unwrap().iter().all(|c| *c == Some(0.0)));
    }
}
