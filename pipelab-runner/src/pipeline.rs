//! Pipeline assembly: the lazy task graph and the plain eager version.
//!
//! [`full_pipeline`] resolves its functions through `pipelab.pipeline` when the
//! graph is built, so an interception on that scope must be active before the
//! pipeline is constructed. [`eager_signals`] resolves through `pipelab.data`
//! and `pipelab.signals` at call time.

use crate::config::PipelineParams;
use pipelab_core::data::MarketData;
use pipelab_core::diff::{deep_diff, Difference};
use pipelab_core::graph::{Arg, GraphError, TaskGraph};
use pipelab_core::intercept::{intercept, InterceptError};
use pipelab_core::library::{
    reference, DATA_SCOPE, GET_CLOSES, GET_SIGNALS, GET_VOLUMES, GET_YAHOO_DATA, PIPELINE_SCOPE,
    SIGNALS_SCOPE,
};
use pipelab_core::symbols::{
    BoundArgs, CallArgs, CallError, HaltSignal, Interruptible, Registry, ResolveError,
};
use pipelab_core::{Frame, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const YAHOO_DATA: &str = "yahoo_data";
pub const VOLUMES: &str = "volumes";
pub const CLOSES: &str = "closes";
pub const SIGNALS: &str = "signals";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{target} was not called")]
    NotInvoked { target: String },

    #[error("captured-argument sink must be empty on entry")]
    SinkNotEmpty,

    #[error("node '{node}' holds {actual}, expected {expected}")]
    UnexpectedValue {
        node: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("no node named '{0}'")]
    UnknownNode(String),
}

impl Interruptible for PipelineError {
    fn halt_signal(&self) -> Option<HaltSignal> {
        match self {
            PipelineError::Graph(e) => e.halt_signal(),
            PipelineError::Call(e) => e.halt_signal(),
            _ => None,
        }
    }
}

impl<E: Into<PipelineError>> From<InterceptError<E>> for PipelineError {
    fn from(err: InterceptError<E>) -> Self {
        match err {
            InterceptError::SinkNotEmpty => PipelineError::SinkNotEmpty,
            InterceptError::Resolve(e) => PipelineError::Resolve(e),
            InterceptError::NotInvoked { target } => PipelineError::NotInvoked { target },
            InterceptError::Body(e) => e.into(),
        }
    }
}

fn ticker_list(params: &PipelineParams) -> Value {
    Value::List(params.tickers.iter().map(|t| Value::from(t.as_str())).collect())
}

// ── Lazy pipeline ───────────────────────────────────────────────────

/// The lazy pipeline: one node per step, nothing computed until asked.
#[derive(Debug, Clone)]
pub struct Pipeline {
    params: PipelineParams,
    graph: TaskGraph,
}

/// Build the lazy pipeline with nodes `yahoo_data`, `volumes`, `closes`
/// and `signals`.
pub fn full_pipeline(registry: &Registry, params: &PipelineParams) -> Result<Pipeline, PipelineError> {
    let function = |name: &str| registry.resolve(&reference(PIPELINE_SCOPE, name));

    let mut graph = TaskGraph::new();
    graph.insert_call(
        YAHOO_DATA,
        function(GET_YAHOO_DATA)?,
        vec![
            ticker_list(params).into(),
            Value::Date(params.start_date).into(),
            Value::Date(params.end_date).into(),
        ],
        vec![],
    )?;
    graph.insert_call(VOLUMES, function(GET_VOLUMES)?, vec![Arg::node(YAHOO_DATA)], vec![])?;
    graph.insert_call(CLOSES, function(GET_CLOSES)?, vec![Arg::node(YAHOO_DATA)], vec![])?;
    graph.insert_call(
        SIGNALS,
        function(GET_SIGNALS)?,
        vec![Arg::node(CLOSES), Arg::node(VOLUMES)],
        vec![],
    )?;

    Ok(Pipeline {
        params: params.clone(),
        graph,
    })
}

impl Pipeline {
    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Node names in construction order.
    pub fn node_names(&self) -> Vec<&str> {
        self.graph.keys().collect()
    }

    pub fn dependencies(&self, node: &str) -> Result<BTreeSet<String>, PipelineError> {
        self.check_node(node)?;
        Ok(self.graph.dependencies(node)?)
    }

    pub fn compute(&self, node: &str) -> Result<Value, PipelineError> {
        self.check_node(node)?;
        Ok(self.graph.compute(node)?)
    }

    /// Compute `node` with some upstream nodes replaced by given values.
    pub fn compute_with(
        &self,
        node: &str,
        inputs: BTreeMap<String, Value>,
    ) -> Result<Value, PipelineError> {
        self.check_node(node)?;
        Ok(self.graph.with_values(inputs).compute(node)?)
    }

    /// Graphviz source for `node` and what it needs. Nothing is computed.
    pub fn to_dot(&self, node: &str) -> Result<String, PipelineError> {
        self.check_node(node)?;
        Ok(self.graph.to_dot(node)?)
    }

    /// Every node, each evaluated once.
    pub fn compute_all(&self) -> Result<EvaluatedPipeline, PipelineError> {
        let values = self.graph.compute_many(self.graph.keys())?;
        Ok(EvaluatedPipeline { values })
    }

    fn check_node(&self, node: &str) -> Result<(), PipelineError> {
        if self.graph.contains(node) {
            Ok(())
        } else {
            Err(PipelineError::UnknownNode(node.to_string()))
        }
    }
}

/// Values of every node of a computed pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedPipeline {
    values: BTreeMap<String, Value>,
}

impl EvaluatedPipeline {
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, node: &str) -> Option<&Value> {
        self.values.get(node)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }

    fn node(&self, node: &str) -> Result<&Value, PipelineError> {
        self.values
            .get(node)
            .ok_or_else(|| PipelineError::UnknownNode(node.to_string()))
    }

    fn frame(&self, node: &str) -> Result<&Frame, PipelineError> {
        let value = self.node(node)?;
        value.as_frame().ok_or_else(|| unexpected(node, "frame", value))
    }

    fn frame_map(&self, node: &str) -> Result<BTreeMap<String, Frame>, PipelineError> {
        let value = self.node(node)?;
        value.as_frame_map().ok_or_else(|| unexpected(node, "map of frames", value))
    }

    pub fn yahoo_data(&self) -> Result<MarketData, PipelineError> {
        self.frame_map(YAHOO_DATA)
    }

    pub fn closes(&self) -> Result<&Frame, PipelineError> {
        self.frame(CLOSES)
    }

    pub fn volumes(&self) -> Result<&Frame, PipelineError> {
        self.frame(VOLUMES)
    }

    pub fn signals(&self) -> Result<BTreeMap<String, Frame>, PipelineError> {
        self.frame_map(SIGNALS)
    }
}

fn unexpected(node: &str, expected: &'static str, actual: &Value) -> PipelineError {
    PipelineError::UnexpectedValue {
        node: node.to_string(),
        expected,
        actual: actual.type_name(),
    }
}

// ── Eager pipeline ──────────────────────────────────────────────────

/// The plain implementation: each function resolved when it is called.
pub fn eager_signals(registry: &Registry, params: &PipelineParams) -> Result<Value, CallError> {
    let yahoo_data = registry.call(
        &reference(DATA_SCOPE, GET_YAHOO_DATA),
        CallArgs::new()
            .arg(ticker_list(params))
            .arg(params.start_date)
            .arg(params.end_date),
    )?;
    let closes = registry.call(
        &reference(DATA_SCOPE, GET_CLOSES),
        CallArgs::new().arg(yahoo_data.clone()),
    )?;
    let volumes = registry.call(&reference(DATA_SCOPE, GET_VOLUMES), CallArgs::new().arg(yahoo_data))?;
    registry.call(
        &reference(SIGNALS_SCOPE, GET_SIGNALS),
        CallArgs::new().arg(closes).arg(volumes),
    )
}

/// Arguments each pipeline passes to `get_signals`.
#[derive(Debug, Clone)]
pub struct SignalArguments {
    pub eager: BoundArgs,
    pub lazy: BoundArgs,
}

impl SignalArguments {
    /// Differences of the lazy arguments against the eager ones.
    pub fn differences(&self) -> Vec<Difference> {
        deep_diff(&self.lazy.to_value(), &self.eager.to_value())
    }
}

/// Capture the arguments of `get_signals` in both pipelines.
///
/// The eager pipeline is intercepted at `pipelab.signals.get_signals`, the
/// lazy one at `pipelab.pipeline.get_signals`, the binding it actually uses.
pub fn capture_signal_arguments(
    registry: &Registry,
    params: &PipelineParams,
) -> Result<SignalArguments, PipelineError> {
    let mut eager = BoundArgs::new();
    intercept(registry, &reference(SIGNALS_SCOPE, GET_SIGNALS), &mut eager, || {
        eager_signals(registry, params)
    })?;

    let mut lazy = BoundArgs::new();
    intercept(registry, &reference(PIPELINE_SCOPE, GET_SIGNALS), &mut lazy, || {
        // Built inside the scope: construction stores the function it resolves.
        full_pipeline(registry, params)?.compute(SIGNALS)
    })?;

    Ok(SignalArguments { eager, lazy })
}

/// Deep diff of the arguments the two pipelines pass to `get_signals`.
pub fn compare_signal_arguments(
    registry: &Registry,
    params: &PipelineParams,
) -> Result<Vec<Difference>, PipelineError> {
    Ok(capture_signal_arguments(registry, params)?.differences())
}
