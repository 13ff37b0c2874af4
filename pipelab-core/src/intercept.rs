//! Call interception: capture the arguments of the first call to a function.
//!
//! [`intercept`] swaps the function bound at `scope.symbol` in a registry for
//! a substitute with the same signature, runs the caller's block, and puts
//! the original back on every exit path. The substitute binds the arguments
//! it receives exactly as the real function would (so malformed calls fail
//! the same way), records the supplied arguments of the first successful
//! binding, and returns a
//! [`HaltSignal`] instead of running the real body. The block is expected to
//! let that signal propagate; the scope recognises its own signal and turns
//! it into success.
//!
//! Only calls resolved through the registry while the scope is active are
//! seen. A [`Function`] handle resolved before the scope started still calls
//! the real body, and the scope then reports [`InterceptError::NotInvoked`].
//!
//! ```no_run
//! # use pipelab_core::intercept::intercept;
//! # use pipelab_core::symbols::{BoundArgs, CallArgs, CallError, Registry};
//! # let registry = Registry::new();
//! let mut args = BoundArgs::new();
//! intercept(&registry, "pipelab.signals.get_signals", &mut args, || {
//!     registry.call("pipelab.signals.get_signals", CallArgs::new())
//! })?;
//! # Ok::<(), pipelab_core::intercept::InterceptError<CallError>>(())
//! ```

use crate::symbols::{
    parse_reference, BoundArgs, CallError, Function, HaltSignal, Interruptible, Registry,
    ResolveError, Symbol,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Why an interception scope failed. `E` is the block's own error type.
#[derive(Debug, Error)]
pub enum InterceptError<E> {
    #[error("captured-argument sink must be empty on entry")]
    SinkNotEmpty,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{target} was not called")]
    NotInvoked { target: String },

    /// An error raised by the block, returned as-is.
    #[error("{0}")]
    Body(E),
}

impl<E> InterceptError<E> {
    /// The block's own error, if that is what failed.
    pub fn into_body(self) -> Option<E> {
        match self {
            InterceptError::Body(e) => Some(e),
            _ => None,
        }
    }
}

/// Run `body` with the function at `target` intercepted.
///
/// On success `sink` holds the arguments the first call supplied, keyed by
/// parameter name in declaration order. Parameters left to their default are
/// not recorded, so `f(1)` and `f(1, 10)` capture differently. On failure
/// `sink` is left empty.
pub fn intercept<T, E, F>(
    registry: &Registry,
    target: &str,
    sink: &mut BoundArgs,
    body: F,
) -> Result<(), InterceptError<E>>
where
    F: FnOnce() -> Result<T, E>,
    E: Interruptible,
{
    if !sink.is_empty() {
        return Err(InterceptError::SinkNotEmpty);
    }

    let (scope, symbol) = parse_reference(target)?;
    let original = registry.lookup(scope, symbol)?;
    let function = original
        .as_function()
        .ok_or_else(|| ResolveError::NotCallable(target.to_string()))?
        .clone();

    let signal = HaltSignal::next();
    let captured: Arc<Mutex<Option<BoundArgs>>> = Arc::new(Mutex::new(None));
    let substitute = substitute_for(&function, signal, Arc::clone(&captured));

    let outcome = {
        let _guard = Substitution::install(registry, scope, symbol, original, substitute)?;
        body()
    };

    let captured = captured.lock().map(|mut slot| slot.take()).unwrap_or(None);

    match (outcome, captured) {
        (Err(e), Some(args)) if e.halt_signal() == Some(signal) => {
            *sink = args;
            Ok(())
        }
        (Err(e), _) => Err(InterceptError::Body(e)),
        // The block absorbed the halt itself; the call still happened.
        (Ok(_), Some(args)) => {
            *sink = args;
            Ok(())
        }
        (Ok(_), None) => Err(InterceptError::NotInvoked {
            target: target.to_string(),
        }),
    }
}

/// Same name and signature as `function`; records the first binding and halts.
fn substitute_for(
    function: &Function,
    signal: HaltSignal,
    captured: Arc<Mutex<Option<BoundArgs>>>,
) -> Function {
    Function::new(function.name(), function.signature().clone(), move |args| {
        if let Ok(mut slot) = captured.lock() {
            if slot.is_none() {
                *slot = Some(args.supplied());
            }
        }
        Err(CallError::Halted(signal))
    })
}

/// Keeps the substitute installed; restores the original binding on drop.
struct Substitution<'a> {
    registry: &'a Registry,
    scope: &'a str,
    symbol: &'a str,
    original: Option<Symbol>,
}

impl<'a> Substitution<'a> {
    fn install(
        registry: &'a Registry,
        scope: &'a str,
        symbol: &'a str,
        original: Symbol,
        substitute: Function,
    ) -> Result<Self, ResolveError> {
        registry.replace(scope, symbol, substitute)?;
        tracing::debug!(scope, symbol, "installed interception");
        Ok(Self {
            registry,
            scope,
            symbol,
            original: Some(original),
        })
    }
}

impl Drop for Substitution<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            match self.registry.replace(self.scope, self.symbol, original) {
                Ok(_) => tracing::debug!(scope = self.scope, symbol = self.symbol, "restored original"),
                Err(_) => tracing::warn!(
                    scope = self.scope,
                    symbol = self.symbol,
                    "interception target vanished before restore"
                ),
            }
        }
    }
}
