//! Lazy task graph.
//!
//! A [`TaskGraph`] maps keys to tasks: either a plain value or a call of a
//! [`Function`] whose arguments are literals or other keys. Nothing runs until
//! [`TaskGraph::compute`]. A call task may only reference keys that already
//! exist when it is inserted, so the graph is acyclic by construction.
//!
//! Partial evaluation: [`TaskGraph::with_values`] returns a copy in which some
//! keys are replaced by precomputed values; computing a key then skips
//! everything upstream of the replaced keys.

use crate::symbols::{CallArgs, CallError, Function, HaltSignal, Interruptible};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no task named '{0}'")]
    UnknownKey(String),

    #[error("task '{key}' depends on unknown task '{dependency}'")]
    UnknownDependency { key: String, dependency: String },

    #[error("task '{0}' already exists")]
    DuplicateKey(String),

    #[error("task '{key}' failed: {source}")]
    Call {
        key: String,
        #[source]
        source: CallError,
    },
}

impl Interruptible for GraphError {
    fn halt_signal(&self) -> Option<HaltSignal> {
        match self {
            GraphError::Call { source, .. } => source.halt_signal(),
            _ => None,
        }
    }
}

/// Argument of a call task.
#[derive(Debug, Clone)]
pub enum Arg {
    Literal(Value),
    Node(String),
}

impl Arg {
    pub fn node(key: impl Into<String>) -> Self {
        Arg::Node(key.into())
    }

    fn dependency(&self) -> Option<&str> {
        match self {
            Arg::Node(key) => Some(key),
            Arg::Literal(_) => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Literal(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Literal(value.into())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Literal(value.into())
    }
}

#[derive(Debug, Clone)]
pub enum Task {
    Value(Value),
    Call {
        function: Arc<Function>,
        args: Vec<Arg>,
        kwargs: Vec<(String, Arg)>,
    },
}

impl Task {
    fn dependencies(&self) -> impl Iterator<Item = &str> {
        let (args, kwargs): (&[Arg], &[(String, Arg)]) = match self {
            Task::Value(_) => (&[], &[]),
            Task::Call { args, kwargs, .. } => (args.as_slice(), kwargs.as_slice()),
        };
        args.iter()
            .chain(kwargs.iter().map(|(_, arg)| arg))
            .filter_map(Arg::dependency)
    }
}

/// Keyed tasks in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), GraphError> {
        let key = key.into();
        self.check_new(&key)?;
        self.push(key, Task::Value(value.into()));
        Ok(())
    }

    /// Insert a call of `function`. Node arguments must name existing tasks.
    pub fn insert_call(
        &mut self,
        key: impl Into<String>,
        function: Arc<Function>,
        args: Vec<Arg>,
        kwargs: Vec<(String, Arg)>,
    ) -> Result<(), GraphError> {
        let key = key.into();
        self.check_new(&key)?;
        let task = Task::Call {
            function,
            args,
            kwargs,
        };
        if let Some(missing) = task.dependencies().find(|dep| !self.tasks.contains_key(*dep)) {
            return Err(GraphError::UnknownDependency {
                key,
                dependency: missing.to_string(),
            });
        }
        self.push(key, task);
        Ok(())
    }

    fn check_new(&self, key: &str) -> Result<(), GraphError> {
        if self.tasks.contains_key(key) {
            return Err(GraphError::DuplicateKey(key.to_string()));
        }
        Ok(())
    }

    fn push(&mut self, key: String, task: Task) {
        self.order.push(key.clone());
        self.tasks.insert(key, task);
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn task(&self, key: &str) -> Option<&Task> {
        self.tasks.get(key)
    }

    /// Direct dependencies of `key`.
    pub fn dependencies(&self, key: &str) -> Result<BTreeSet<String>, GraphError> {
        let task = self
            .tasks
            .get(key)
            .ok_or_else(|| GraphError::UnknownKey(key.to_string()))?;
        Ok(task.dependencies().map(str::to_string).collect())
    }

    /// A copy where each given key holds a precomputed value. Unknown keys
    /// are added.
    pub fn with_values<I, K>(&self, values: I) -> TaskGraph
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut graph = self.clone();
        for (key, value) in values {
            let key = key.into();
            if graph.tasks.insert(key.clone(), Task::Value(value)).is_none() {
                graph.order.push(key);
            }
        }
        graph
    }

    /// `key` and every task it transitively depends on.
    pub fn upstream(&self, key: &str) -> Result<BTreeSet<String>, GraphError> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![key.to_string()];
        while let Some(current) = stack.pop() {
            if seen.contains(&current) {
                continue;
            }
            stack.extend(self.dependencies(&current)?);
            seen.insert(current);
        }
        Ok(seen)
    }

    /// Graphviz rendering of the tasks `key` needs, for `dot -Tsvg`.
    pub fn to_dot(&self, key: &str) -> Result<String, GraphError> {
        let needed = self.upstream(key)?;
        let mut dot = String::from("digraph {\n    rankdir=BT;\n");
        for key in self.keys().filter(|k| needed.contains(*k)) {
            let (label, shape) = match &self.tasks[key] {
                Task::Call { function, .. } => (format!("{key}\\n{}()", function.name()), "box"),
                Task::Value(value) => (format!("{key}\\n{}", value.type_name()), "ellipse"),
            };
            dot.push_str(&format!("    \"{key}\" [label=\"{label}\", shape={shape}];\n"));
        }
        for key in self.keys().filter(|k| needed.contains(*k)) {
            for dep in self.tasks[key].dependencies() {
                dot.push_str(&format!("    \"{dep}\" -> \"{key}\";\n"));
            }
        }
        dot.push_str("}\n");
        Ok(dot)
    }

    pub fn compute(&self, key: &str) -> Result<Value, GraphError> {
        let mut memo = HashMap::new();
        self.evaluate(key, &mut memo)
    }

    /// Compute several keys, sharing intermediate results.
    pub fn compute_many<'a, I>(&self, keys: I) -> Result<BTreeMap<String, Value>, GraphError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut memo = HashMap::new();
        keys.into_iter()
            .map(|key| -> Result<(String, Value), GraphError> {
                Ok((key.to_string(), self.evaluate(key, &mut memo)?))
            })
            .collect()
    }

    fn evaluate(&self, key: &str, memo: &mut HashMap<String, Value>) -> Result<Value, GraphError> {
        if let Some(value) = memo.get(key) {
            return Ok(value.clone());
        }
        let task = self
            .tasks
            .get(key)
            .ok_or_else(|| GraphError::UnknownKey(key.to_string()))?;

        let value = match task {
            Task::Value(value) => value.clone(),
            Task::Call {
                function,
                args,
                kwargs,
            } => {
                let mut call = CallArgs::new();
                for arg in args {
                    call = call.arg(self.resolve_arg(arg, memo)?);
                }
                for (name, arg) in kwargs {
                    call = call.kwarg(name.clone(), self.resolve_arg(arg, memo)?);
                }
                tracing::debug!(key, function = function.name(), "evaluating task");
                function.call(call).map_err(|source| GraphError::Call {
                    key: key.to_string(),
                    source,
                })?
            }
        };

        memo.insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn resolve_arg(&self, arg: &Arg, memo: &mut HashMap<String, Value>) -> Result<Value, GraphError> {
        match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Node(key) => self.evaluate(key, memo),
        }
    }
}
