//! Symbol registry: the indirection point every pipeline call goes through.
//!
//! Scopes are named with dotted paths (`pipelab.signals`) and map symbol
//! names to functions or constants. Code that resolves a symbol at call
//! time sees whatever is currently bound there, which is what lets an
//! interception swap a function for the duration of a scope. A handle
//! resolved earlier keeps pointing at the function it was resolved to.
//!
//! Cloning a [`Registry`] shares its scopes.

use super::function::{CallError, Function};
use super::signature::CallArgs;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Something bound to a name in a scope.
#[derive(Debug, Clone)]
pub enum Symbol {
    Function(Arc<Function>),
    Constant(Value),
}

impl Symbol {
    pub fn as_function(&self) -> Option<&Arc<Function>> {
        match self {
            Symbol::Function(f) => Some(f),
            Symbol::Constant(_) => None,
        }
    }
}

impl From<Function> for Symbol {
    fn from(f: Function) -> Self {
        Symbol::Function(Arc::new(f))
    }
}

impl From<Arc<Function>> for Symbol {
    fn from(f: Arc<Function>) -> Self {
        Symbol::Function(f)
    }
}

impl From<Value> for Symbol {
    fn from(v: Value) -> Self {
        Symbol::Constant(v)
    }
}

/// Failures resolving a `scope.symbol` reference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid target reference '{0}': expected 'scope.symbol'")]
    InvalidReference(String),

    #[error("no scope named '{0}'")]
    UnknownScope(String),

    #[error("scope '{scope}' has no attribute '{symbol}'")]
    UnknownSymbol { scope: String, symbol: String },

    #[error("'{0}' must be a reference to a callable")]
    NotCallable(String),
}

/// Split `scope.symbol` at the last separator.
pub fn parse_reference(reference: &str) -> Result<(&str, &str), ResolveError> {
    match reference.rsplit_once('.') {
        Some((scope, symbol)) if !scope.is_empty() && !symbol.is_empty() => Ok((scope, symbol)),
        _ => Err(ResolveError::InvalidReference(reference.to_string())),
    }
}

type Scopes = HashMap<String, HashMap<String, Symbol>>;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    scopes: Arc<RwLock<Scopes>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `symbol` under `scope.name`, creating the scope if needed.
    /// Returns the previous binding, if any.
    pub fn define(&self, scope: &str, name: &str, symbol: impl Into<Symbol>) -> Option<Symbol> {
        let mut scopes = self.scopes.write().unwrap();
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(name.to_string(), symbol.into())
    }

    /// Look up whatever is bound at `scope.name`.
    pub fn lookup(&self, scope: &str, name: &str) -> Result<Symbol, ResolveError> {
        let scopes = self.scopes.read().unwrap();
        let symbols = scopes
            .get(scope)
            .ok_or_else(|| ResolveError::UnknownScope(scope.to_string()))?;
        symbols
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownSymbol {
                scope: scope.to_string(),
                symbol: name.to_string(),
            })
    }

    /// Resolve a `scope.symbol` reference to the function currently bound there.
    pub fn resolve(&self, reference: &str) -> Result<Arc<Function>, ResolveError> {
        let (scope, name) = parse_reference(reference)?;
        match self.lookup(scope, name)? {
            Symbol::Function(f) => Ok(f),
            Symbol::Constant(_) => Err(ResolveError::NotCallable(reference.to_string())),
        }
    }

    /// Swap the binding at an existing `scope.name`, returning the old one.
    pub fn replace(
        &self,
        scope: &str,
        name: &str,
        symbol: impl Into<Symbol>,
    ) -> Result<Symbol, ResolveError> {
        let mut scopes = self.scopes.write().unwrap();
        let symbols = scopes
            .get_mut(scope)
            .ok_or_else(|| ResolveError::UnknownScope(scope.to_string()))?;
        let slot = symbols
            .get_mut(name)
            .ok_or_else(|| ResolveError::UnknownSymbol {
                scope: scope.to_string(),
                symbol: name.to_string(),
            })?;
        Ok(std::mem::replace(slot, symbol.into()))
    }

    /// Resolve at call time, then call. The lock is released before the body runs.
    pub fn call(&self, reference: &str, args: CallArgs) -> Result<Value, CallError> {
        let function = self.resolve(reference)?;
        function.call(args)
    }

    /// Scope names, sorted.
    pub fn scopes(&self) -> Vec<String> {
        let scopes = self.scopes.read().unwrap();
        let mut names: Vec<String> = scopes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Symbols of a scope with a short description of each, sorted by name.
    pub fn symbols(&self, scope: &str) -> Result<BTreeMap<String, String>, ResolveError> {
        let scopes = self.scopes.read().unwrap();
        let symbols = scopes
            .get(scope)
            .ok_or_else(|| ResolveError::UnknownScope(scope.to_string()))?;
        Ok(symbols
            .iter()
            .map(|(name, symbol)| {
                let description = match symbol {
                    Symbol::Function(f) => {
                        format!("{}({})", f.name(), f.signature().names().collect::<Vec<_>>().join(", "))
                    }
                    Symbol::Constant(v) => format!("constant {}", v.type_name()),
                };
                (name.clone(), description)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Signature;

    fn identity() -> Function {
        Function::new("identity", Signature::positional(&["x"]).unwrap(), |args| {
            Ok(args.get("x").cloned().unwrap_or(Value::Null))
        })
    }

    #[test]
    fn parse_reference_splits_at_last_dot() {
        assert_eq!(parse_reference("a.b.c"), Ok(("a.b", "c")));
        assert_eq!(
            parse_reference("nodot"),
            Err(ResolveError::InvalidReference("nodot".into()))
        );
        assert!(parse_reference("trailing.").is_err());
        assert!(parse_reference(".leading").is_err());
    }

    #[test]
    fn resolve_and_call() {
        let registry = Registry::new();
        registry.define("tools", "identity", identity());
        let out = registry
            .call("tools.identity", CallArgs::new().arg(7))
            .unwrap();
        assert_eq!(out, Value::Int(7));
    }

    #[test]
    fn resolution_errors() {
        let registry = Registry::new();
        registry.define("tools", "identity", identity());
        registry.define("tools", "ANSWER", Value::Int(42));

        assert_eq!(
            registry.resolve("missing.identity").unwrap_err(),
            ResolveError::UnknownScope("missing".into())
        );
        assert_eq!(
            registry.resolve("tools.nope").unwrap_err().to_string(),
            "scope 'tools' has no attribute 'nope'"
        );
        assert_eq!(
            registry.resolve("tools.ANSWER").unwrap_err(),
            ResolveError::NotCallable("tools.ANSWER".into())
        );
    }

    #[test]
    fn replace_is_visible_to_late_resolution_only() {
        let registry = Registry::new();
        registry.define("tools", "identity", identity());
        let early = registry.resolve("tools.identity").unwrap();

        let constant = Function::new("constant", Signature::positional(&["x"]).unwrap(), |_| {
            Ok(Value::Int(0))
        });
        let previous = registry.replace("tools", "identity", constant).unwrap();
        assert!(previous.as_function().is_some());

        let late = registry.call("tools.identity", CallArgs::new().arg(5)).unwrap();
        assert_eq!(late, Value::Int(0));
        assert_eq!(early.call(CallArgs::new().arg(5)).unwrap(), Value::Int(5));
    }

    #[test]
    fn clones_share_scopes() {
        let registry = Registry::new();
        let other = registry.clone();
        other.define("tools", "identity", identity());
        assert_eq!(registry.scopes(), vec!["tools".to_string()]);
        assert_eq!(
            registry.symbols("tools").unwrap()["identity"],
            "identity(x)"
        );
    }
}
