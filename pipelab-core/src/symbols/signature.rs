//! Parameter specifications and argument binding.
//!
//! A [`Signature`] is the declared parameter table of a function: ordered
//! names, each either positional-or-keyword or keyword-only, each with an
//! optional default. Binding validates a call's positional and keyword
//! arguments against that table and produces [`BoundArgs`] keyed by
//! parameter name in declaration order, regardless of how the caller
//! supplied each value.

use crate::value::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// How a parameter may be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOrKeyword,
    KeywordOnly,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl Param {
    /// A required positional-or-keyword parameter.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::PositionalOrKeyword,
            default: None,
        }
    }

    /// A positional-or-keyword parameter with a default.
    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::PositionalOrKeyword,
            default: Some(default.into()),
        }
    }

    /// Turn this parameter into a keyword-only one.
    pub fn keyword_only(mut self) -> Self {
        self.kind = ParamKind::KeywordOnly;
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Malformed parameter tables.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),

    #[error("keyword-only parameter '{keyword_only}' declared before positional parameter '{positional}'")]
    KeywordOnlyBeforePositional {
        keyword_only: String,
        positional: String,
    },

    #[error("required parameter '{0}' follows a parameter with a default")]
    RequiredAfterDefault(String),
}

/// Argument-binding failures. Messages follow the usual call diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("missing a required argument: '{0}'")]
    MissingArgument(String),

    #[error("too many positional arguments (takes {expected}, {given} given)")]
    TooManyPositional { expected: usize, given: usize },

    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),

    #[error("multiple values for argument '{0}'")]
    MultipleValues(String),
}

/// The declared parameter table of a function. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Result<Self, SignatureError> {
        let mut seen = HashSet::new();
        let mut first_keyword_only: Option<&str> = None;
        let mut seen_default = false;

        for param in &params {
            if !seen.insert(param.name.as_str()) {
                return Err(SignatureError::DuplicateParameter(param.name.clone()));
            }
            match param.kind {
                ParamKind::KeywordOnly => {
                    first_keyword_only.get_or_insert(param.name.as_str());
                }
                ParamKind::PositionalOrKeyword => {
                    if let Some(kw) = first_keyword_only {
                        return Err(SignatureError::KeywordOnlyBeforePositional {
                            keyword_only: kw.to_string(),
                            positional: param.name.clone(),
                        });
                    }
                    if param.is_required() && seen_default {
                        return Err(SignatureError::RequiredAfterDefault(param.name.clone()));
                    }
                    seen_default |= !param.is_required();
                }
            }
        }

        Ok(Self { params })
    }

    /// Shorthand for a signature of required positional-or-keyword parameters.
    pub fn positional(names: &[&str]) -> Result<Self, SignatureError> {
        Self::new(names.iter().map(|n| Param::required(*n)).collect())
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Number of parameters that can be supplied positionally.
    pub fn positional_capacity(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.kind == ParamKind::PositionalOrKeyword)
            .count()
    }

    /// Bind call arguments against this table.
    ///
    /// Positional values fill positional-or-keyword parameters in order; the
    /// rest come from keywords, then defaults. Defaults are applied, so the
    /// result always has one entry per parameter; [`BoundArgs::supplied`]
    /// drops the defaulted ones.
    pub fn bind(&self, args: CallArgs) -> Result<BoundArgs, BindingError> {
        let CallArgs {
            positional,
            keywords,
        } = args;

        let mut keyword_order = Vec::with_capacity(keywords.len());
        let mut by_name: HashMap<String, Value> = HashMap::with_capacity(keywords.len());
        for (name, value) in keywords {
            if by_name.contains_key(&name) {
                return Err(BindingError::MultipleValues(name));
            }
            keyword_order.push(name.clone());
            by_name.insert(name, value);
        }

        let capacity = self.positional_capacity();
        if positional.len() > capacity {
            return Err(BindingError::TooManyPositional {
                expected: capacity,
                given: positional.len(),
            });
        }

        let mut bound = Vec::with_capacity(self.params.len());
        let mut defaulted = BTreeSet::new();
        let mut positional = positional.into_iter();

        for param in &self.params {
            if param.kind == ParamKind::PositionalOrKeyword {
                if let Some(value) = positional.next() {
                    if by_name.contains_key(&param.name) {
                        return Err(BindingError::MultipleValues(param.name.clone()));
                    }
                    bound.push((param.name.clone(), value));
                    continue;
                }
            }

            let value = match (by_name.remove(&param.name), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => {
                    defaulted.insert(param.name.clone());
                    default.clone()
                }
                (None, None) => return Err(BindingError::MissingArgument(param.name.clone())),
            };
            bound.push((param.name.clone(), value));
        }

        if let Some(name) = keyword_order.into_iter().find(|n| by_name.contains_key(n)) {
            return Err(BindingError::UnexpectedKeyword(name));
        }

        Ok(BoundArgs {
            entries: bound,
            defaulted,
        })
    }
}

/// Arguments as supplied by a caller: positional values, then keyword pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.push((name.into(), value.into()));
        self
    }
}

/// Arguments bound to parameter names, in declaration order.
///
/// Also serves as the caller-owned sink filled by an interception.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    entries: Vec<(String, Value)>,
    /// Parameters filled from their default rather than by the caller.
    defaulted: BTreeSet<String>,
}

impl BoundArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// True when `name` took its declared default.
    pub fn is_defaulted(&self, name: &str) -> bool {
        self.defaulted.contains(name)
    }

    /// Only the arguments the caller supplied, still in declaration order.
    pub fn supplied(&self) -> BoundArgs {
        BoundArgs {
            entries: self
                .entries
                .iter()
                .filter(|(name, _)| !self.defaulted.contains(name))
                .cloned()
                .collect(),
            defaulted: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// As a map value, for diffing and display.
    pub fn to_value(&self) -> Value {
        Value::Map(self.entries.iter().cloned().collect())
    }
}

impl<'a> IntoIterator for &'a BoundArgs {
    type Item = &'a (String, Value);
    type IntoIter = std::slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Signature {
        Signature::positional(&["a", "b", "c"]).unwrap()
    }

    fn pairs(bound: &BoundArgs) -> Vec<(&str, i64)> {
        bound
            .iter()
            .map(|(n, v)| (n, v.as_int().unwrap()))
            .collect()
    }

    #[test]
    fn binds_positional() {
        let bound = abc().bind(CallArgs::new().arg(1).arg(2).arg(3)).unwrap();
        assert_eq!(pairs(&bound), vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn binds_keywords_in_declaration_order() {
        let bound = abc()
            .bind(CallArgs::new().kwarg("c", 3).kwarg("b", 2).kwarg("a", 1))
            .unwrap();
        assert_eq!(pairs(&bound), vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn binds_mixed() {
        let bound = abc()
            .bind(CallArgs::new().arg(1).kwarg("c", 3).kwarg("b", 2))
            .unwrap();
        assert_eq!(pairs(&bound), vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn applies_defaults() {
        let sig = Signature::new(vec![
            Param::required("a"),
            Param::optional("b", 10),
            Param::optional("scale", 2).keyword_only(),
        ])
        .unwrap();
        let bound = sig.bind(CallArgs::new().arg(1)).unwrap();
        assert_eq!(pairs(&bound), vec![("a", 1), ("b", 10), ("scale", 2)]);
        assert!(bound.is_defaulted("b"));
        assert!(!bound.is_defaulted("a"));
    }

    #[test]
    fn supplied_drops_defaults_only() {
        let sig = Signature::new(vec![
            Param::required("a"),
            Param::optional("b", 10),
            Param::optional("scale", 2).keyword_only(),
        ])
        .unwrap();
        let implicit = sig.bind(CallArgs::new().arg(1)).unwrap().supplied();
        assert_eq!(pairs(&implicit), vec![("a", 1)]);

        // Passing the default value explicitly is not the same call.
        let explicit = sig
            .bind(CallArgs::new().kwarg("scale", 2).arg(1).arg(10))
            .unwrap()
            .supplied();
        assert_eq!(pairs(&explicit), vec![("a", 1), ("b", 10), ("scale", 2)]);
        assert_ne!(implicit, explicit);
    }

    #[test]
    fn missing_required() {
        let err = abc().bind(CallArgs::new().arg(1).arg(2)).unwrap_err();
        assert_eq!(err, BindingError::MissingArgument("c".into()));
        assert_eq!(err.to_string(), "missing a required argument: 'c'");
    }

    #[test]
    fn too_many_positional() {
        let err = abc()
            .bind(CallArgs::new().arg(1).arg(2).arg(3).arg(4))
            .unwrap_err();
        assert_eq!(err, BindingError::TooManyPositional { expected: 3, given: 4 });
        assert!(err.to_string().starts_with("too many positional arguments"));
    }

    #[test]
    fn unknown_keyword_reports_missing_first() {
        // The first unfilled parameter is reported before the stray keyword.
        let err = abc().bind(CallArgs::new().kwarg("d", 4)).unwrap_err();
        assert_eq!(err, BindingError::MissingArgument("a".into()));
    }

    #[test]
    fn unknown_keyword() {
        let err = abc()
            .bind(CallArgs::new().arg(1).arg(2).arg(3).kwarg("d", 4))
            .unwrap_err();
        assert_eq!(err.to_string(), "got an unexpected keyword argument 'd'");
    }

    #[test]
    fn duplicate_values() {
        let err = abc()
            .bind(CallArgs::new().arg(1).kwarg("a", 1).kwarg("b", 2).kwarg("c", 3))
            .unwrap_err();
        assert_eq!(err, BindingError::MultipleValues("a".into()));

        let err = abc()
            .bind(CallArgs::new().kwarg("a", 1).kwarg("a", 2))
            .unwrap_err();
        assert_eq!(err, BindingError::MultipleValues("a".into()));
    }

    #[test]
    fn keyword_only_is_not_positional() {
        let sig = Signature::new(vec![Param::required("a"), Param::required("k").keyword_only()])
            .unwrap();
        let err = sig.bind(CallArgs::new().arg(1).arg(2)).unwrap_err();
        assert_eq!(err, BindingError::TooManyPositional { expected: 1, given: 2 });

        let bound = sig.bind(CallArgs::new().arg(1).kwarg("k", 2)).unwrap();
        assert_eq!(pairs(&bound), vec![("a", 1), ("k", 2)]);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        assert_eq!(
            Signature::positional(&["a", "a"]).unwrap_err(),
            SignatureError::DuplicateParameter("a".into())
        );
        assert!(matches!(
            Signature::new(vec![Param::required("k").keyword_only(), Param::required("a")]),
            Err(SignatureError::KeywordOnlyBeforePositional { .. })
        ));
        assert_eq!(
            Signature::new(vec![Param::optional("a", 1), Param::required("b")]).unwrap_err(),
            SignatureError::RequiredAfterDefault("b".into())
        );
    }
}
