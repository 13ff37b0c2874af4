//! Non-regression snapshots.
//!
//! A snapshot stores the value of every node from a reference run. Checking
//! a node loads its inputs from the snapshot, evaluates only that node, and
//! compares the result with the stored value. Upstream changes therefore
//! never show up as downstream failures: each node is tested on its own.

use crate::cache::{read_json, write_json, CacheError};
use crate::config::PipelineParams;
use crate::pipeline::{EvaluatedPipeline, Pipeline, PipelineError};
use pipelab_core::diff::{deep_diff, describe, Difference};
use pipelab_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Nodes whose name contains this marker are not checked.
pub const SKIP_MARKER: &str = "slow";

#[derive(Debug, Error)]
pub enum NonRegressionError {
    #[error(
        "the value for {name} has changed. You can either revert the change, or, if you \
         understand the new values, delete the non-regression file {} and regenerate it.\n\
         Differences:\n{}",
        .path.display(),
        describe(.differences)
    )]
    Changed {
        name: String,
        path: PathBuf,
        differences: Vec<Difference>,
    },

    #[error("non-regression data has no value for '{0}'")]
    MissingNode(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] CacheError),
}

/// Values of every node from a reference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    params: PipelineParams,
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Snapshot {
    /// Evaluate every node of `pipeline`.
    pub fn generate(pipeline: &Pipeline) -> Result<Self, PipelineError> {
        tracing::info!(nodes = pipeline.node_names().len(), "generating non-regression data");
        let values = pipeline.compute_all()?.into_values();
        Ok(Self {
            params: pipeline.params().clone(),
            values,
            path: None,
        })
    }

    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let mut snapshot: Snapshot = read_json(path)?;
        snapshot.path = Some(path.to_path_buf());
        Ok(snapshot)
    }

    /// Write atomically to `path`.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        write_json(path, self)
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Where the snapshot was loaded from, if it was.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn into_evaluated(self) -> EvaluatedPipeline {
        EvaluatedPipeline::from_values(self.values)
    }

    fn value(&self, name: &str) -> Result<&Value, NonRegressionError> {
        self.get(name)
            .ok_or_else(|| NonRegressionError::MissingNode(name.to_string()))
    }

    /// Replace the stored value of a node.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }
}

/// Node names to check, skipping those marked slow.
pub fn non_regression_nodes(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .node_names()
        .into_iter()
        .filter(|name| !name.contains(SKIP_MARKER))
        .map(str::to_string)
        .collect()
}

/// Evaluate `name` with inputs from `snapshot` and compare with its stored value.
pub fn check_node(
    pipeline: &Pipeline,
    snapshot: &Snapshot,
    name: &str,
) -> Result<(), NonRegressionError> {
    let expected = snapshot.value(name)?;
    let inputs = pipeline
        .dependencies(name)?
        .into_iter()
        .map(|dep| -> Result<(String, Value), NonRegressionError> {
            let value = snapshot.value(&dep)?.clone();
            Ok((dep, value))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let actual = pipeline.compute_with(name, inputs)?;
    let differences = deep_diff(&actual, expected);
    if differences.is_empty() {
        tracing::debug!(node = name, "no regression");
        return Ok(());
    }
    Err(NonRegressionError::Changed {
        name: name.to_string(),
        path: snapshot.path().map(Path::to_path_buf).unwrap_or_default(),
        differences,
    })
}

/// Check every non-regression node; one result per node.
pub fn check_all(
    pipeline: &Pipeline,
    snapshot: &Snapshot,
) -> Vec<(String, Result<(), NonRegressionError>)> {
    non_regression_nodes(pipeline)
        .into_iter()
        .map(|name| {
            let result = check_node(pipeline, snapshot, &name);
            (name, result)
        })
        .collect()
}

/// Outcome of [`regenerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regeneration {
    /// The file exists; nothing was written.
    AlreadyPresent(PathBuf),
    /// The file was missing and has been generated.
    Regenerated(PathBuf),
}

/// Generate the non-regression file at `path` unless it already exists.
pub fn regenerate(pipeline: &Pipeline, path: &Path) -> Result<Regeneration, NonRegressionError> {
    if path.is_file() {
        return Ok(Regeneration::AlreadyPresent(path.to_path_buf()));
    }
    Snapshot::generate(pipeline)?.save(path)?;
    tracing::warn!(path = %path.display(), "non-regression data was regenerated");
    Ok(Regeneration::Regenerated(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{full_pipeline, CLOSES, SIGNALS};
    use chrono::NaiveDate;
    use pipelab_core::data::FixtureProvider;
    use pipelab_core::library;
    use pipelab_core::symbols::Registry;
    use std::sync::Arc;

    fn pipeline() -> Pipeline {
        let registry = Registry::new();
        library::install(&registry, Arc::new(FixtureProvider)).unwrap();
        let params = PipelineParams::new(
            ["AAPL", "AMZN"],
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 6).unwrap(),
        );
        full_pipeline(&registry, &params).unwrap()
    }

    #[test]
    fn fresh_snapshot_has_no_regression() {
        let pipeline = pipeline();
        let snapshot = Snapshot::generate(&pipeline).unwrap();
        for (name, result) in check_all(&pipeline, &snapshot) {
            assert!(result.is_ok(), "{name}: {result:?}");
        }
    }

    #[test]
    fn tampered_input_changes_downstream_node() {
        let pipeline = pipeline();
        let mut snapshot = Snapshot::generate(&pipeline).unwrap();

        // Drop AAPL from the stored closes: the AAPL cells of BUY_AMZN become missing.
        let closes = snapshot.get(CLOSES).and_then(Value::as_frame).unwrap().clone();
        let mut trimmed = pipelab_core::Frame::new(closes.index().to_vec()).unwrap();
        trimmed
            .insert_column("AMZN", closes.column("AMZN").unwrap().to_vec())
            .unwrap();
        snapshot.insert(CLOSES, trimmed.into());

        let err = check_node(&pipeline, &snapshot, SIGNALS).unwrap_err();
        match err {
            NonRegressionError::Changed { name, differences, .. } => {
                assert_eq!(name, SIGNALS);
                assert!(!differences.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        // The closes node itself is recomputed from yahoo_data and now differs too.
        assert!(check_node(&pipeline, &snapshot, CLOSES).is_err());
    }

    #[test]
    fn missing_input_is_reported() {
        let pipeline = pipeline();
        let mut snapshot = Snapshot::generate(&pipeline).unwrap();
        snapshot.remove(CLOSES);
        assert!(matches!(
            check_node(&pipeline, &snapshot, SIGNALS),
            Err(NonRegressionError::MissingNode(ref n)) if n == CLOSES
        ));
    }

    #[test]
    fn save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("non_reg.json");
        let snapshot = Snapshot::generate(&pipeline()).unwrap();
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.path(), Some(path.as_path()));
        assert_eq!(loaded.names().collect::<Vec<_>>(), snapshot.names().collect::<Vec<_>>());
        assert_eq!(loaded.get(SIGNALS), snapshot.get(SIGNALS));
    }

    #[test]
    fn regenerate_only_when_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("non_reg.json");
        let pipeline = pipeline();

        assert_eq!(regenerate(&pipeline, &path).unwrap(), Regeneration::Regenerated(path.clone()));
        assert_eq!(regenerate(&pipeline, &path).unwrap(), Regeneration::AlreadyPresent(path));
    }
}
