//! Cached pipeline fixtures.
//!
//! Evaluating the full pipeline hits the data provider, so test suites
//! evaluate it once and keep every node on disk:
//!
//! ```text
//! {root}/{worker_id}/
//!     meta.json        params hash, params, cached_at, node names
//!     yahoo_data.json
//!     volumes.json
//!     closes.json
//!     signals.json
//! ```
//!
//! One directory per worker so that parallel test processes never write the
//! same files. A cache is reused while it is younger than the policy's
//! maximum age and was produced with the same parameters.

use crate::config::{PipelineParams, DEFAULT_MAX_AGE_HOURS};
use crate::pipeline::{EvaluatedPipeline, Pipeline, PipelineError};
use chrono::{DateTime, Utc};
use pipelab_core::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const META_FILE: &str = "meta.json";

/// Environment variable that forces regeneration when set (CI runs).
pub const FORCE_ENV: &str = "CI";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no cached node '{node}' in {dir}")]
    MissingNode { dir: PathBuf, node: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `value` as pretty JSON through a temporary file and a rename, so
/// readers never see a partial file.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| CacheError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_error(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_error(path))
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CacheError> {
    let json = std::fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&json).map_err(|source| CacheError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// When a cached pipeline must be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: Duration,
    pub force_regenerate: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_HOURS * 3600),
            force_regenerate: false,
        }
    }
}

impl CachePolicy {
    /// Default policy; regeneration is forced when `CI` is set.
    pub fn from_env() -> Self {
        Self {
            force_regenerate: std::env::var_os(FORCE_ENV).is_some(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub params_hash: String,
    pub params: PipelineParams,
    pub cached_at: DateTime<Utc>,
    pub nodes: Vec<String>,
}

impl CacheMeta {
    pub fn age(&self) -> Duration {
        (Utc::now() - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// State of a cache directory with respect to a pipeline and a policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    Fresh,
    Missing,
    Forced,
    Stale { age: Duration },
    ParamsChanged,
}

/// One worker directory, as reported by [`PipelineCache::status`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub worker_id: String,
    pub dir: PathBuf,
    pub meta: Option<CacheMeta>,
}

#[derive(Debug, Clone)]
pub struct PipelineCache {
    root: PathBuf,
    policy: CachePolicy,
}

impl PipelineCache {
    pub fn new(root: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// `$TMPDIR/cached_pipeline`.
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("cached_pipeline")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn worker_dir(&self, worker_id: &str) -> PathBuf {
        self.root.join(worker_id)
    }

    pub fn freshness(&self, dir: &Path, params: &PipelineParams) -> Freshness {
        let meta: CacheMeta = match read_json(&dir.join(META_FILE)) {
            Ok(meta) => meta,
            Err(_) => return Freshness::Missing,
        };
        if self.policy.force_regenerate {
            return Freshness::Forced;
        }
        if meta.params_hash != params.params_hash() {
            return Freshness::ParamsChanged;
        }
        let age = meta.age();
        if age > self.policy.max_age {
            return Freshness::Stale { age };
        }
        Freshness::Fresh
    }

    /// Make sure `{root}/{worker_id}` holds every node of `pipeline`, and
    /// return that directory.
    pub fn ensure(&self, pipeline: &Pipeline, worker_id: &str) -> Result<PathBuf, CacheError> {
        let dir = self.worker_dir(worker_id);
        let freshness = self.freshness(&dir, pipeline.params());
        if freshness == Freshness::Fresh {
            tracing::info!(dir = %dir.display(), "loading cached pipeline");
            return Ok(dir);
        }

        tracing::info!(dir = %dir.display(), reason = ?freshness, "regenerating cached pipeline");
        let evaluated = pipeline.compute_all()?;
        self.store(&dir, pipeline.params(), &evaluated)?;
        Ok(dir)
    }

    /// Write every node, then the metadata. A crash in between leaves a
    /// directory without valid metadata, which counts as missing.
    pub fn store(
        &self,
        dir: &Path,
        params: &PipelineParams,
        evaluated: &EvaluatedPipeline,
    ) -> Result<(), CacheError> {
        let meta_path = dir.join(META_FILE);
        match std::fs::remove_file(&meta_path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                return Err(io_error(&meta_path)(err))
            }
            _ => {}
        }
        for (node, value) in evaluated.values() {
            write_json(&node_path(dir, node), value)?;
        }
        let meta = CacheMeta {
            params_hash: params.params_hash(),
            params: params.clone(),
            cached_at: Utc::now(),
            nodes: evaluated.names().map(str::to_string).collect(),
        };
        write_json(&meta_path, &meta)
    }

    /// Load one node of a cached pipeline.
    pub fn load(dir: &Path, node: &str) -> Result<Value, CacheError> {
        let path = node_path(dir, node);
        if !path.is_file() {
            return Err(CacheError::MissingNode {
                dir: dir.to_path_buf(),
                node: node.to_string(),
            });
        }
        read_json(&path)
    }

    /// Load every node listed in the metadata.
    pub fn load_all(dir: &Path) -> Result<EvaluatedPipeline, CacheError> {
        let meta: CacheMeta = read_json(&dir.join(META_FILE))?;
        let values = meta
            .nodes
            .iter()
            .map(|node| -> Result<(String, Value), CacheError> {
                Ok((node.clone(), Self::load(dir, node)?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(EvaluatedPipeline::from_values(values))
    }

    /// Worker directories under the root, sorted by worker id.
    pub fn status(&self) -> Result<Vec<CacheEntry>, CacheError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let dir = entry.map_err(io_error(&self.root))?.path();
            if !dir.is_dir() {
                continue;
            }
            let worker_id = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let meta = read_json(&dir.join(META_FILE)).ok();
            entries.push(CacheEntry {
                worker_id,
                dir,
                meta,
            });
        }
        entries.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        Ok(entries)
    }

    /// Remove every worker directory. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries = self.status()?;
        for entry in &entries {
            std::fs::remove_dir_all(&entry.dir).map_err(io_error(&entry.dir))?;
        }
        tracing::info!(root = %self.root.display(), removed = entries.len(), "cleared pipeline cache");
        Ok(entries.len())
    }
}

fn node_path(dir: &Path, node: &str) -> PathBuf {
    dir.join(format!("{node}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::full_pipeline;
    use chrono::NaiveDate;
    use pipelab_core::data::FixtureProvider;
    use pipelab_core::library;
    use pipelab_core::symbols::Registry;
    use std::sync::Arc;

    fn pipeline() -> Pipeline {
        let registry = Registry::new();
        library::install(&registry, Arc::new(FixtureProvider)).unwrap();
        let params = PipelineParams::new(
            ["AAPL", "MSFT"],
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 8).unwrap(),
        );
        full_pipeline(&registry, &params).unwrap()
    }

    #[test]
    fn test_ensure_writes_every_node() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = PipelineCache::new(temp_dir.path(), CachePolicy::default());
        let pipeline = pipeline();

        let dir = cache.ensure(&pipeline, "gw0").unwrap();
        assert_eq!(dir, temp_dir.path().join("gw0"));
        for node in pipeline.node_names() {
            assert!(dir.join(format!("{node}.json")).is_file(), "{node} not cached");
        }
        assert_eq!(cache.freshness(&dir, pipeline.params()), Freshness::Fresh);

        let closes = PipelineCache::load(&dir, "closes").unwrap();
        assert_eq!(closes, pipeline.compute("closes").unwrap());
    }

    #[test]
    fn test_load_all_matches_compute_all() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = PipelineCache::new(temp_dir.path(), CachePolicy::default());
        let pipeline = pipeline();
        let dir = cache.ensure(&pipeline, "master").unwrap();
        assert_eq!(PipelineCache::load_all(&dir).unwrap(), pipeline.compute_all().unwrap());
    }

    #[test]
    fn test_policy_decides_freshness() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline();
        let dir = PipelineCache::new(temp_dir.path(), CachePolicy::default())
            .ensure(&pipeline, "gw0")
            .unwrap();

        let forced = PipelineCache::new(
            temp_dir.path(),
            CachePolicy {
                force_regenerate: true,
                ..CachePolicy::default()
            },
        );
        assert_eq!(forced.freshness(&dir, pipeline.params()), Freshness::Forced);

        let impatient = PipelineCache::new(
            temp_dir.path(),
            CachePolicy {
                max_age: Duration::ZERO,
                force_regenerate: false,
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            impatient.freshness(&dir, pipeline.params()),
            Freshness::Stale { .. }
        ));

        let other = PipelineParams::reference();
        let cache = PipelineCache::new(temp_dir.path(), CachePolicy::default());
        assert_eq!(cache.freshness(&dir, &other), Freshness::ParamsChanged);
        assert_eq!(cache.freshness(&temp_dir.path().join("gw9"), &other), Freshness::Missing);
    }

    #[test]
    fn test_store_reports_unremovable_meta() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = PipelineCache::new(temp_dir.path(), CachePolicy::default());
        let pipeline = pipeline();
        let evaluated = pipeline.compute_all().unwrap();

        // A directory where meta.json belongs cannot be removed as a file.
        let dir = cache.worker_dir("gw0");
        std::fs::create_dir_all(dir.join(META_FILE)).unwrap();
        let err = cache.store(&dir, pipeline.params(), &evaluated).unwrap_err();
        assert!(matches!(err, CacheError::Io { ref path, .. } if path.ends_with(META_FILE)));

        // A missing meta.json is the normal first write.
        let fresh = cache.worker_dir("gw1");
        cache.store(&fresh, pipeline.params(), &evaluated).unwrap();
        assert_eq!(cache.freshness(&fresh, pipeline.params()), Freshness::Fresh);
    }

    #[test]
    fn test_missing_node() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PipelineCache::load(temp_dir.path(), "closes"),
            Err(CacheError::MissingNode { .. })
        ));
    }

    #[test]
    fn test_status_and_clear() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = PipelineCache::new(temp_dir.path().join("cache"), CachePolicy::default());
        assert!(cache.status().unwrap().is_empty());

        let pipeline = pipeline();
        cache.ensure(&pipeline, "gw1").unwrap();
        cache.ensure(&pipeline, "gw0").unwrap();

        let status = cache.status().unwrap();
        assert_eq!(
            status.iter().map(|e| e.worker_id.as_str()).collect::<Vec<_>>(),
            vec!["gw0", "gw1"]
        );
        assert!(status.iter().all(|e| e.meta.is_some()));

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.status().unwrap().is_empty());
    }
}
