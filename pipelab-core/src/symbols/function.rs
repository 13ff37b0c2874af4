//! Callable functions with a declared signature.

use super::registry::ResolveError;
use super::signature::{BindingError, BoundArgs, CallArgs, Signature};
use crate::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

static NEXT_HALT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Control signal that stops a computation right after an intercepted call.
///
/// Each interception scope owns one token; the scope only swallows the
/// signal carrying its own token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HaltSignal(u64);

impl HaltSignal {
    /// A fresh, process-unique signal.
    pub fn next() -> Self {
        Self(NEXT_HALT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn token(&self) -> u64 {
        self.0
    }
}

/// Errors raised by calling a [`Function`].
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("{function}() {source}")]
    Binding {
        function: String,
        source: BindingError,
    },

    #[error("computation halted after intercepted call (token {})", .0.token())]
    Halted(HaltSignal),

    #[error("{function}(): argument '{argument}' expected {expected}, got {actual}")]
    ArgumentType {
        function: String,
        argument: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{function}() failed: {message}")]
    Failed { function: String, message: String },
}

/// Errors that may carry a halt signal through a computation.
pub trait Interruptible {
    /// The halt signal this error carries, if it is one.
    fn halt_signal(&self) -> Option<HaltSignal>;
}

impl Interruptible for CallError {
    fn halt_signal(&self) -> Option<HaltSignal> {
        match self {
            CallError::Halted(signal) => Some(*signal),
            _ => None,
        }
    }
}

type Body = dyn Fn(&BoundArgs) -> Result<Value, CallError> + Send + Sync;

/// A named body behind a declared [`Signature`].
///
/// [`Function::call`] binds the supplied arguments before running the body,
/// so malformed calls fail with a [`BindingError`] and the body never runs.
#[derive(Clone)]
pub struct Function {
    name: String,
    signature: Signature,
    body: Arc<Body>,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&BoundArgs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(&self, args: CallArgs) -> Result<Value, CallError> {
        let bound = self
            .signature
            .bind(args)
            .map_err(|source| CallError::Binding {
                function: self.name.clone(),
                source,
            })?;
        (self.body)(&bound)
    }

    /// Fetch a bound argument, failing if the signature does not declare it.
    pub fn arg<'a>(&self, args: &'a BoundArgs, name: &str) -> Result<&'a Value, CallError> {
        args.get(name).ok_or_else(|| CallError::Failed {
            function: self.name.clone(),
            message: format!("argument '{name}' is not bound"),
        })
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.signature.names().collect::<Vec<_>>())
            .finish()
    }
}

impl CallError {
    /// Type mismatch for a bound argument.
    pub fn argument_type(function: &str, argument: &str, expected: &'static str, actual: &Value) -> Self {
        CallError::ArgumentType {
            function: function.to_string(),
            argument: argument.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }

    pub fn failed(function: &str, err: impl fmt::Display) -> Self {
        CallError::Failed {
            function: function.to_string(),
            message: err.to_string(),
        }
    }
}
