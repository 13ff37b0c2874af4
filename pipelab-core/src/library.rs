//! Registration of the pipeline functions in a [`Registry`].
//!
//! Three scopes are defined:
//!
//! | scope              | symbols                                          |
//! |--------------------|--------------------------------------------------|
//! | `pipelab.data`     | `get_yahoo_data`, `get_closes`, `get_volumes`    |
//! | `pipelab.signals`  | `get_signals`                                    |
//! | `pipelab.pipeline` | all four, bound separately                       |
//!
//! `pipelab.pipeline` holds its own bindings of the same functions, so a
//! substitute installed in `pipelab.signals` is not seen through
//! `pipelab.pipeline` and vice versa.

use crate::data::{fetch_market_data, DataProvider, MarketData};
use crate::frame::Frame;
use crate::metrics;
use crate::signals;
use crate::symbols::{BoundArgs, CallError, Function, Registry, Signature, SignatureError};
use crate::value::Value;
use chrono::NaiveDate;
use std::sync::Arc;

pub const DATA_SCOPE: &str = "pipelab.data";
pub const SIGNALS_SCOPE: &str = "pipelab.signals";
pub const PIPELINE_SCOPE: &str = "pipelab.pipeline";

pub const GET_YAHOO_DATA: &str = "get_yahoo_data";
pub const GET_CLOSES: &str = "get_closes";
pub const GET_VOLUMES: &str = "get_volumes";
pub const GET_SIGNALS: &str = "get_signals";

/// Define the pipeline functions in `registry`, fetching through `provider`.
pub fn install(
    registry: &Registry,
    provider: Arc<dyn DataProvider>,
) -> Result<(), SignatureError> {
    let yahoo_data = Arc::new(get_yahoo_data(provider)?);
    let closes = Arc::new(get_closes()?);
    let volumes = Arc::new(get_volumes()?);
    let signals = Arc::new(get_signals()?);

    registry.define(DATA_SCOPE, GET_YAHOO_DATA, Arc::clone(&yahoo_data));
    registry.define(DATA_SCOPE, GET_CLOSES, Arc::clone(&closes));
    registry.define(DATA_SCOPE, GET_VOLUMES, Arc::clone(&volumes));
    registry.define(SIGNALS_SCOPE, GET_SIGNALS, Arc::clone(&signals));

    registry.define(PIPELINE_SCOPE, GET_YAHOO_DATA, yahoo_data);
    registry.define(PIPELINE_SCOPE, GET_CLOSES, closes);
    registry.define(PIPELINE_SCOPE, GET_VOLUMES, volumes);
    registry.define(PIPELINE_SCOPE, GET_SIGNALS, signals);

    tracing::debug!(
        scopes = ?[DATA_SCOPE, SIGNALS_SCOPE, PIPELINE_SCOPE],
        "installed pipeline functions"
    );
    Ok(())
}

/// Full reference `scope.symbol` for a symbol.
pub fn reference(scope: &str, symbol: &str) -> String {
    format!("{scope}.{symbol}")
}

// ── Argument conversion ─────────────────────────────────────────────

fn date_arg(function: &str, args: &BoundArgs, name: &str) -> Result<NaiveDate, CallError> {
    let value = bound(function, args, name)?;
    value
        .as_date()
        .ok_or_else(|| CallError::argument_type(function, name, "date", value))
}

fn frame_arg<'a>(
    function: &str,
    args: &'a BoundArgs,
    name: &str,
) -> Result<&'a Frame, CallError> {
    let value = bound(function, args, name)?;
    value
        .as_frame()
        .ok_or_else(|| CallError::argument_type(function, name, "frame", value))
}

fn bound<'a>(function: &str, args: &'a BoundArgs, name: &str) -> Result<&'a Value, CallError> {
    args.get(name)
        .ok_or_else(|| CallError::failed(function, format!("argument '{name}' is not bound")))
}

/// Tickers may be given as a list of strings or a single string.
fn tickers_arg(function: &str, args: &BoundArgs) -> Result<Vec<String>, CallError> {
    let value = bound(function, args, "tickers")?;
    if let Some(ticker) = value.as_str() {
        return Ok(vec![ticker.to_string()]);
    }
    value
        .as_str_list()
        .map(|list| list.into_iter().map(str::to_string).collect())
        .ok_or_else(|| CallError::argument_type(function, "tickers", "list of strings", value))
}

// ── Functions ───────────────────────────────────────────────────────

fn get_yahoo_data(provider: Arc<dyn DataProvider>) -> Result<Function, SignatureError> {
    let signature = Signature::positional(&["tickers", "start_date", "end_date"])?;
    Ok(Function::new(GET_YAHOO_DATA, signature, move |args| {
        let tickers = tickers_arg(GET_YAHOO_DATA, args)?;
        let start = date_arg(GET_YAHOO_DATA, args, "start_date")?;
        let end = date_arg(GET_YAHOO_DATA, args, "end_date")?;
        let data = fetch_market_data(provider.as_ref(), &tickers, start, end)
            .map_err(|e| CallError::failed(GET_YAHOO_DATA, e))?;
        Ok(Value::from_frame_map(data))
    }))
}

fn market_data_arg(function: &str, args: &BoundArgs) -> Result<MarketData, CallError> {
    let value = bound(function, args, "yahoo_data")?;
    value
        .as_frame_map()
        .ok_or_else(|| CallError::argument_type(function, "yahoo_data", "map of frames", value))
}

fn get_closes() -> Result<Function, SignatureError> {
    let signature = Signature::positional(&["yahoo_data"])?;
    Ok(Function::new(GET_CLOSES, signature, |args| {
        let data = market_data_arg(GET_CLOSES, args)?;
        let closes = metrics::closes(&data).map_err(|e| CallError::failed(GET_CLOSES, e))?;
        Ok(Value::Frame(closes))
    }))
}

fn get_volumes() -> Result<Function, SignatureError> {
    let signature = Signature::positional(&["yahoo_data"])?;
    Ok(Function::new(GET_VOLUMES, signature, |args| {
        let data = market_data_arg(GET_VOLUMES, args)?;
        let volumes = metrics::volumes(&data).map_err(|e| CallError::failed(GET_VOLUMES, e))?;
        Ok(Value::Frame(volumes))
    }))
}

fn get_signals() -> Result<Function, SignatureError> {
    let signature = Signature::positional(&["closes", "volumes"])?;
    Ok(Function::new(GET_SIGNALS, signature, |args| {
        let closes = frame_arg(GET_SIGNALS, args, "closes")?;
        let volumes = frame_arg(GET_SIGNALS, args, "volumes")?;
        Ok(Value::from_frame_map(signals::signals(closes, volumes)))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FixtureProvider;
    use crate::symbols::CallArgs;

    fn registry() -> Registry {
        let registry = Registry::new();
        install(&registry, Arc::new(FixtureProvider)).unwrap();
        registry
    }

    fn yahoo_data(registry: &Registry) -> Value {
        let tickers = Value::List(vec!["AAPL".into(), "AMZN".into()]);
        registry
            .call(
                "pipelab.data.get_yahoo_data",
                CallArgs::new().arg(tickers).arg("2021-01-04").arg("2021-01-08"),
            )
            .unwrap()
    }

    #[test]
    fn defines_three_scopes() {
        let registry = registry();
        assert_eq!(
            registry.scopes(),
            vec![DATA_SCOPE.to_string(), PIPELINE_SCOPE.into(), SIGNALS_SCOPE.into()]
        );
        assert_eq!(registry.symbols(PIPELINE_SCOPE).unwrap().len(), 4);
        assert_eq!(
            registry.symbols(SIGNALS_SCOPE).unwrap()[GET_SIGNALS],
            "get_signals(closes, volumes)"
        );
    }

    #[test]
    fn data_functions_chain() {
        let registry = registry();
        let data = yahoo_data(&registry);
        assert_eq!(data.as_frame_map().unwrap().len(), 2);

        let closes = registry
            .call("pipelab.data.get_closes", CallArgs::new().arg(data.clone()))
            .unwrap();
        let volumes = registry
            .call("pipelab.data.get_volumes", CallArgs::new().kwarg("yahoo_data", data))
            .unwrap();
        let signals = registry
            .call(
                "pipelab.signals.get_signals",
                CallArgs::new().arg(closes).arg(volumes),
            )
            .unwrap();

        let signals = signals.as_frame_map().unwrap();
        assert!(signals.contains_key(crate::signals::BUY_AAPL));
        assert!(signals.contains_key(crate::signals::BUY_AMZN));
    }

    #[test]
    fn wrong_argument_type_is_reported() {
        let registry = registry();
        let err = registry
            .call("pipelab.data.get_closes", CallArgs::new().arg(3))
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::ArgumentType { ref argument, actual: "int", .. } if argument == "yahoo_data"
        ));
    }

    #[test]
    fn unparseable_date_is_reported() {
        let registry = registry();
        let err = registry
            .call(
                "pipelab.data.get_yahoo_data",
                CallArgs::new().arg("AAPL").arg("yesterday").arg("2021-01-08"),
            )
            .unwrap_err();
        assert!(matches!(err, CallError::ArgumentType { expected: "date", .. }));
    }

    #[test]
    fn scopes_hold_separate_bindings() {
        let registry = registry();
        registry
            .replace(SIGNALS_SCOPE, GET_SIGNALS, Value::Null)
            .unwrap();
        assert!(registry.resolve("pipelab.pipeline.get_signals").is_ok());
    }
}
