use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Marker bound satisfied by every type that can sit in the value graph:
/// constants, parameters, task inputs/outputs, and aggregate elements.
///
/// A statically typed value graph means arity and element-type mismatches
/// between a task body and its declared inputs are compile errors rather
/// than the reflection-checked runtime errors the original implementation
/// reports — see DESIGN.md, Open Question (a).
pub trait Element: Any + Send + Sync + fmt::Debug + Clone + Serialize + DeserializeOwned + 'static {}
impl<T> Element for T where T: Any + Send + Sync + fmt::Debug + Clone + Serialize + DeserializeOwned + 'static {}

/// Type-erased handle to a concrete [`Element`], materialized at run time.
pub(crate) trait AnyElement: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T: Element> AnyElement for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

pub(crate) type DynValue = Arc<dyn AnyElement>;

pub(crate) fn downcast<T: Element>(v: &DynValue) -> T {
    v.as_any()
        .downcast_ref::<T>()
        .expect("element type checked at definition time")
        .clone()
}

pub(crate) fn boxed<T: Element>(v: T) -> DynValue {
    Arc::new(v)
}

/// Deserializes a stored JSON payload into the concrete type a task declared
/// as its output, type-erasing the result back into [`DynValue`]. Captured
/// per task at definition time (see `Definition::task*`), this is what lets
/// `Resume` decode persisted results using only the definition's knowledge
/// of each task's output type (spec §4.2).
pub(crate) type Decoder = Arc<dyn Fn(serde_json::Value) -> serde_json::Result<DynValue> + Send + Sync>;

pub(crate) fn decoder_for<T: Element>() -> Decoder {
    Arc::new(|v| serde_json::from_value::<T>(v).map(boxed))
}

/// Identity of a single definition instance. Values created by one
/// definition's builder carry their owner's id so cross-definition misuse
/// (passing a `Value` built against one `Definition` into another) is a
/// reported error rather than silently indexing the wrong graph.
pub(crate) type DefinitionId = u64;

/// Stable identifier of a node in a definition's value graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ValueId {
    pub(crate) definition: DefinitionId,
    pub(crate) index: usize,
}

/// A typed handle to a node in the value graph: a constant, a parameter, a
/// task's output, or an aggregate. `Value<T>` carries no data itself — it is
/// a reference into the owning [`Definition`](crate::engine::definition::Definition);
/// the data lives in the graph and is materialized at run time.
pub struct Value<T> {
    pub(crate) id: ValueId,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Value<T> {}

impl<T> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("index", &self.id.index)
            .finish()
    }
}

impl<T> Value<T> {
    pub(crate) fn new(id: ValueId) -> Self {
        Value {
            id,
            _marker: PhantomData,
        }
    }
}

pub(crate) enum ValueKind {
    Constant(DynValue),
    Parameter(String),
    TaskOutput(usize),
    /// Ordered sequence of elements plus the function that knows how to
    /// downcast each materialized element and collect them into the
    /// concrete `Vec<T>` this aggregate represents.
    Aggregate {
        elements: Vec<ValueId>,
        combine: Arc<dyn Fn(Vec<DynValue>) -> DynValue + Send + Sync>,
    },
}

pub(crate) struct ValueNode {
    pub(crate) kind: ValueKind,
    pub(crate) type_name: &'static str,
}

/// The persistable record of a single task's execution within a run.
///
/// Once `finished` is `true` this record is immutable for the remainder of
/// the run (spec §3). `result` is an opaque, self-describing payload (we use
/// JSON) that `Resume` decodes using the definition's declared output type
/// for that task; `error` is empty unless the task failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub name: String,
    pub started: bool,
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TaskState {
    pub(crate) fn pending(name: impl Into<String>) -> Self {
        TaskState {
            name: name.into(),
            started: false,
            finished: false,
            result: None,
            error: String::new(),
        }
    }

    pub(crate) fn running(&mut self) {
        self.started = true;
        self.finished = false;
    }

    pub(crate) fn succeeded(&mut self, result: serde_json::Value) {
        self.started = true;
        self.finished = true;
        self.result = Some(result);
        self.error.clear();
    }

    pub(crate) fn failed(&mut self, error: String) {
        self.started = true;
        self.finished = true;
        self.error = error;
    }
}
