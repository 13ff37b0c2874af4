//! Frame: a small date-indexed table of `f64` columns.
//!
//! Columns are keyed by name (a ticker or an OHLCV field) and kept sorted.
//! A missing cell is `None`; arithmetic between frames aligns on the union
//! of dates and columns, and a cell missing on either side stays missing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors raised when building or combining frames.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    #[error("column '{column}' has {actual} rows, index has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("index is not strictly ascending at position {position}")]
    UnsortedIndex { position: usize },

    #[error("missing column '{0}'")]
    MissingColumn(String),
}

/// Date-indexed table with sorted, named `f64` columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    index: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl Frame {
    /// Create an empty frame over the given index. The index must be strictly ascending.
    pub fn new(index: Vec<NaiveDate>) -> Result<Self, FrameError> {
        if let Some(position) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(FrameError::UnsortedIndex {
                position: position + 1,
            });
        }
        Ok(Self {
            index,
            columns: BTreeMap::new(),
        })
    }

    /// Insert (or replace) a column. Its length must match the index.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), FrameError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(FrameError::LengthMismatch {
                column: name,
                expected: self.index.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Builder-style variant of [`Frame::insert_column`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, FrameError> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    /// Column names, sorted ascending.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.index.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.index.last().copied()
    }

    /// Value at (date, column), `None` when the row, column or cell is missing.
    pub fn get(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let row = self.index.binary_search(&date).ok()?;
        self.columns.get(column)?.get(row).copied().flatten()
    }

    /// True if any cell is missing.
    pub fn has_missing(&self) -> bool {
        self.columns.values().any(|c| c.iter().any(Option::is_none))
    }

    /// True if every cell is present and strictly positive.
    pub fn all_positive(&self) -> bool {
        self.columns
            .values()
            .all(|c| c.iter().all(|v| v.is_some_and(|x| x > 0.0)))
    }

    /// 1.0 where a cell is present, 0.0 where it is missing.
    pub fn presence(&self) -> Frame {
        Frame {
            index: self.index.clone(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    let mask = values
                        .iter()
                        .map(|v| Some(if v.is_some() { 1.0 } else { 0.0 }))
                        .collect();
                    (name.clone(), mask)
                })
                .collect(),
        }
    }

    /// Cell-wise sum aligned on the union of dates and columns.
    pub fn add(&self, other: &Frame) -> Frame {
        let index: Vec<NaiveDate> = self
            .index
            .iter()
            .chain(other.index.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names: BTreeSet<&String> = self.columns.keys().chain(other.columns.keys()).collect();

        let columns = names
            .into_iter()
            .map(|name| {
                let values = index
                    .iter()
                    .map(|date| match (self.get(*date, name), other.get(*date, name)) {
                        (Some(a), Some(b)) => Some(a + b),
                        _ => None,
                    })
                    .collect();
                (name.clone(), values)
            })
            .collect();

        Frame { index, columns }
    }

    /// Multiply every present cell by `factor`.
    pub fn scale(&self, factor: f64) -> Frame {
        Frame {
            index: self.index.clone(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    (
                        name.clone(),
                        values.iter().map(|v| v.map(|x| x * factor)).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Set (or add) a column holding `value` on every row.
    pub fn set_constant_column(&mut self, name: impl Into<String>, value: f64) {
        self.columns
            .insert(name.into(), vec![Some(value); self.index.len()]);
    }

    /// Build a frame from one series per key, aligned on the union of dates.
    ///
    /// Each series is a list of `(date, value)` pairs; a key without a value on
    /// some date gets a missing cell there. Duplicate dates keep the last value.
    pub fn concat_columns<I, K>(series: I) -> Frame
    where
        I: IntoIterator<Item = (K, Vec<(NaiveDate, Option<f64>)>)>,
        K: Into<String>,
    {
        let series: Vec<(String, BTreeMap<NaiveDate, Option<f64>>)> = series
            .into_iter()
            .map(|(k, points)| (k.into(), points.into_iter().collect()))
            .collect();

        let index: Vec<NaiveDate> = series
            .iter()
            .flat_map(|(_, points)| points.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let columns = series
            .into_iter()
            .map(|(name, points)| {
                let values = index
                    .iter()
                    .map(|date| points.get(date).copied().flatten())
                    .collect();
                (name, values)
            })
            .collect();

        Frame { index, columns }
    }
}
