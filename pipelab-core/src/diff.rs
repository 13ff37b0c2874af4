//! Structural comparison of value trees.
//!
//! [`deep_diff`] walks two [`Value`]s side by side and reports every
//! difference with the path where it occurs, e.g.
//! `root['BUY_AAPL']['AAPL'][2021-01-05]`. Frames are compared row by row on
//! their dates and column by column on their names.

use crate::frame::Frame;
use crate::value::Value;
use std::collections::BTreeSet;
use std::fmt;

/// One difference between an actual and an expected value.
///
/// `ItemAdded` means present in the actual value only, `ItemRemoved` present
/// in the expected value only.
#[derive(Debug, Clone, PartialEq)]
pub enum Difference {
    ValueChanged {
        path: String,
        actual: String,
        expected: String,
    },
    TypeChanged {
        path: String,
        actual: &'static str,
        expected: &'static str,
    },
    ItemAdded {
        path: String,
    },
    ItemRemoved {
        path: String,
    },
}

impl Difference {
    pub fn path(&self) -> &str {
        match self {
            Difference::ValueChanged { path, .. }
            | Difference::TypeChanged { path, .. }
            | Difference::ItemAdded { path }
            | Difference::ItemRemoved { path } => path,
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::ValueChanged {
                path,
                actual,
                expected,
            } => write!(f, "{path}: {expected} -> {actual}"),
            Difference::TypeChanged {
                path,
                actual,
                expected,
            } => write!(f, "{path}: type {expected} -> {actual}"),
            Difference::ItemAdded { path } => write!(f, "{path}: added"),
            Difference::ItemRemoved { path } => write!(f, "{path}: removed"),
        }
    }
}

/// Every difference between `actual` and `expected`. Empty means identical.
pub fn deep_diff(actual: &Value, expected: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_values("root", actual, expected, &mut out);
    out
}

/// Format a list of differences, one per line.
pub fn describe(differences: &[Difference]) -> String {
    differences
        .iter()
        .map(Difference::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn key_path(path: &str, key: &str) -> String {
    format!("{path}['{key}']")
}

fn diff_values(path: &str, actual: &Value, expected: &Value, out: &mut Vec<Difference>) {
    match (actual, expected) {
        (Value::Float(a), Value::Float(b)) => {
            if !same_float(Some(*a), Some(*b)) {
                out.push(changed(path, actual, expected));
            }
        }
        (Value::List(a), Value::List(b)) => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                diff_values(&format!("{path}[{i}]"), x, y, out);
            }
            for i in b.len()..a.len() {
                out.push(Difference::ItemAdded {
                    path: format!("{path}[{i}]"),
                });
            }
            for i in a.len()..b.len() {
                out.push(Difference::ItemRemoved {
                    path: format!("{path}[{i}]"),
                });
            }
        }
        (Value::Map(a), Value::Map(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let sub = key_path(path, key);
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => diff_values(&sub, x, y, out),
                    (Some(_), None) => out.push(Difference::ItemAdded { path: sub }),
                    (None, _) => out.push(Difference::ItemRemoved { path: sub }),
                }
            }
        }
        (Value::Frame(a), Value::Frame(b)) => diff_frames(path, a, b, out),
        (a, b) if std::mem::discriminant(a) != std::mem::discriminant(b) => {
            out.push(Difference::TypeChanged {
                path: path.to_string(),
                actual: a.type_name(),
                expected: b.type_name(),
            });
        }
        (a, b) => {
            if a != b {
                out.push(changed(path, a, b));
            }
        }
    }
}

fn changed(path: &str, actual: &Value, expected: &Value) -> Difference {
    Difference::ValueChanged {
        path: path.to_string(),
        actual: actual.to_string(),
        expected: expected.to_string(),
    }
}

fn same_float(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
        (None, None) => true,
        _ => false,
    }
}

fn cell(x: Option<f64>) -> String {
    x.map_or_else(|| "nan".to_string(), |x| format!("{x:?}"))
}

fn diff_frames(path: &str, actual: &Frame, expected: &Frame, out: &mut Vec<Difference>) {
    let actual_dates: BTreeSet<_> = actual.index().iter().collect();
    let expected_dates: BTreeSet<_> = expected.index().iter().collect();
    for date in actual_dates.difference(&expected_dates) {
        out.push(Difference::ItemAdded {
            path: format!("{path}[{date}]"),
        });
    }
    for date in expected_dates.difference(&actual_dates) {
        out.push(Difference::ItemRemoved {
            path: format!("{path}[{date}]"),
        });
    }

    let names: BTreeSet<&str> = actual.column_names().into_iter().chain(expected.column_names()).collect();
    for name in names {
        let sub = key_path(path, name);
        match (actual.column(name), expected.column(name)) {
            (Some(_), Some(_)) => {
                for date in actual_dates.intersection(&expected_dates) {
                    let a = actual.get(**date, name);
                    let b = expected.get(**date, name);
                    if !same_float(a, b) {
                        out.push(Difference::ValueChanged {
                            path: format!("{sub}[{date}]"),
                            actual: cell(a),
                            expected: cell(b),
                        });
                    }
                }
            }
            (Some(_), None) => out.push(Difference::ItemAdded { path: sub }),
            (None, _) => out.push(Difference::ItemRemoved { path: sub }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
    }

    fn frame(values: Vec<Option<f64>>) -> Frame {
        let index = (4..4 + values.len() as u32).map(jan).collect();
        Frame::new(index).unwrap().with_column("AAPL", values).unwrap()
    }

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<BTreeMap<_, _>>())
    }

    #[test]
    fn identical_values_have_no_difference() {
        let value = map(&[("a", Value::Int(1)), ("f", frame(vec![Some(1.0), None]).into())]);
        assert!(deep_diff(&value, &value.clone()).is_empty());
    }

    #[test]
    fn reports_changed_cell_with_path() {
        let actual = map(&[("s", frame(vec![Some(1.0), Some(2.0)]).into())]);
        let expected = map(&[("s", frame(vec![Some(1.0), Some(3.0)]).into())]);
        let diff = deep_diff(&actual, &expected);
        assert_eq!(
            diff,
            vec![Difference::ValueChanged {
                path: "root['s']['AAPL'][2021-01-05]".into(),
                actual: "2.0".into(),
                expected: "3.0".into(),
            }]
        );
        assert_eq!(diff[0].to_string(), "root['s']['AAPL'][2021-01-05]: 3.0 -> 2.0");
    }

    #[test]
    fn missing_cell_differs_from_value() {
        let diff = deep_diff(&frame(vec![None]).into(), &frame(vec![Some(1.0)]).into());
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn reports_added_and_removed_items() {
        let actual = map(&[("a", Value::Int(1)), ("new", Value::Null)]);
        let expected = map(&[("a", Value::Int(1)), ("old", Value::Null)]);
        let diff = deep_diff(&actual, &expected);
        assert_eq!(
            diff,
            vec![
                Difference::ItemAdded { path: "root['new']".into() },
                Difference::ItemRemoved { path: "root['old']".into() },
            ]
        );

        let diff = deep_diff(&frame(vec![Some(1.0)]).into(), &frame(vec![Some(1.0), Some(2.0)]).into());
        assert_eq!(diff, vec![Difference::ItemRemoved { path: "root[2021-01-05]".into() }]);
    }

    #[test]
    fn int_and_float_are_different_types() {
        let diff = deep_diff(&Value::Int(1), &Value::Float(1.0));
        assert!(matches!(diff[0], Difference::TypeChanged { actual: "int", expected: "float", .. }));
    }

    #[test]
    fn list_length_changes() {
        let diff = deep_diff(&Value::List(vec![1.into(), 2.into()]), &Value::List(vec![1.into()]));
        assert_eq!(diff, vec![Difference::ItemAdded { path: "root[1]".into() }]);
    }
}
