use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::engine::context::TaskContextArg;
use crate::engine::task::{Adapter0, Adapter1, Adapter2, Adapter3, TaskBody};
use crate::engine::types::{
    DefinitionId, Decoder, Element, Value, ValueId, ValueKind, ValueNode, boxed, decoder_for,
};

/// Errors reported by the definition builder. All of these are caught
/// before a run can be started — configuration errors never escape into
/// `Start` or `Run` (spec §7).
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("task name {0:?} is already used in this definition")]
    DuplicateTask(String),
    #[error("parameter name {0:?} is already declared in this definition")]
    DuplicateParameter(String),
    #[error("output name {0:?} is already declared in this definition")]
    DuplicateOutput(String),
    #[error("value passed to {context} does not belong to this definition")]
    ForeignValue { context: &'static str },
}

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct TaskNode {
    pub(crate) name: String,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) output: ValueId,
    pub(crate) body: Arc<dyn TaskBody>,
    pub(crate) decode_output: Decoder,
}

/// The closure of named tasks, the value graph reachable from their inputs
/// and the declared outputs, declared parameters, and declared outputs
/// (spec §3). Immutable once built; shared read-only by every [`Run`] it
/// spawns (spec §5).
pub struct Definition {
    pub(crate) id: DefinitionId,
    pub(crate) values: Vec<ValueNode>,
    pub(crate) tasks: Vec<TaskNode>,
    pub(crate) task_names: HashMap<String, usize>,
    pub(crate) parameters: Vec<String>,
    pub(crate) outputs: Vec<(String, ValueId)>,
}

impl Default for Definition {
    fn default() -> Self {
        Self::new()
    }
}

impl Definition {
    pub fn new() -> Self {
        Definition {
            id: NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed),
            values: Vec::new(),
            tasks: Vec::new(),
            task_names: HashMap::new(),
            parameters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push_value(&mut self, kind: ValueKind, type_name: &'static str) -> ValueId {
        let index = self.values.len();
        self.values.push(ValueNode { kind, type_name });
        ValueId {
            definition: self.id,
            index,
        }
    }

    fn check_owned(&self, id: ValueId, context: &'static str) -> Result<(), DefinitionError> {
        if id.definition != self.id {
            return Err(DefinitionError::ForeignValue { context });
        }
        Ok(())
    }

    /// Records a value fixed at definition time.
    pub fn constant<T: Element>(&mut self, value: T) -> Value<T> {
        let id = self.push_value(
            ValueKind::Constant(boxed(value)),
            std::any::type_name::<T>(),
        );
        Value::new(id)
    }

    /// Declares a named external input, bound at `Start` time. Parameters
    /// are a single explicit scalar type (`String`) per spec Design Notes
    /// Open Question (a) — not generalized to arbitrary element types.
    pub fn parameter(&mut self, name: impl Into<String>) -> Result<Value<String>, DefinitionError> {
        let name = name.into();
        if self.parameters.contains(&name) {
            return Err(DefinitionError::DuplicateParameter(name));
        }
        self.parameters.push(name.clone());
        let id = self.push_value(ValueKind::Parameter(name), "String");
        Ok(Value::new(id))
    }

    /// Combines several values of a common element type into one ordered
    /// aggregate value. Homogeneity is a compile-time property of
    /// `&[Value<T>]` in this implementation (see DESIGN.md).
    pub fn slice<T: Element>(&mut self, values: &[Value<T>]) -> Result<Value<Vec<T>>, DefinitionError> {
        let mut elements = Vec::with_capacity(values.len());
        for v in values {
            self.check_owned(v.id, "slice")?;
            elements.push(v.id);
        }
        let combine: Arc<dyn Fn(Vec<crate::engine::types::DynValue>) -> crate::engine::types::DynValue + Send + Sync> =
            Arc::new(|elems| {
                let vec: Vec<T> = elems.iter().map(crate::engine::types::downcast::<T>).collect();
                boxed(vec)
            });
        let id = self.push_value(
            ValueKind::Aggregate { elements, combine },
            std::any::type_name::<Vec<T>>(),
        );
        Ok(Value::new(id))
    }

    /// Declares an externally visible output. Fails on duplicate name or
    /// when the value was not built against this definition.
    pub fn output<T: Element>(&mut self, name: impl Into<String>, value: Value<T>) -> Result<(), DefinitionError> {
        self.check_owned(value.id, "output")?;
        let name = name.into();
        if self.outputs.iter().any(|(n, _)| n == &name) {
            return Err(DefinitionError::DuplicateOutput(name));
        }
        self.outputs.push((name, value.id));
        Ok(())
    }

    fn register_task<O: Element>(
        &mut self,
        name: String,
        inputs: Vec<ValueId>,
        body: Arc<dyn TaskBody>,
    ) -> Result<Value<O>, DefinitionError> {
        if self.task_names.contains_key(&name) {
            return Err(DefinitionError::DuplicateTask(name));
        }
        let task_idx = self.tasks.len();
        let output = self.push_value(ValueKind::TaskOutput(task_idx), std::any::type_name::<O>());
        self.task_names.insert(name.clone(), task_idx);
        self.tasks.push(TaskNode {
            name,
            inputs,
            output,
            body,
            decode_output: decoder_for::<O>(),
        });
        Ok(Value::new(output))
    }

    /// Declares a task with no data inputs.
    pub fn task0<F, Fut, Ctx, O, E>(&mut self, name: impl Into<String>, body: F) -> Result<Value<O>, DefinitionError>
    where
        F: Fn(Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        Ctx: TaskContextArg,
        O: Element,
        E: std::fmt::Display + Send + 'static,
    {
        self.register_task(name.into(), Vec::new(), Arc::new(Adapter0::new(body)))
    }

    /// Declares a task taking one input value.
    pub fn task1<F, Fut, Ctx, A1, O, E>(
        &mut self,
        name: impl Into<String>,
        body: F,
        in1: Value<A1>,
    ) -> Result<Value<O>, DefinitionError>
    where
        F: Fn(Ctx, A1) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        Ctx: TaskContextArg,
        A1: Element,
        O: Element,
        E: std::fmt::Display + Send + 'static,
    {
        self.check_owned(in1.id, "task input")?;
        self.register_task(name.into(), vec![in1.id], Arc::new(Adapter1::new(body)))
    }

    /// Declares a task taking two input values.
    pub fn task2<F, Fut, Ctx, A1, A2, O, E>(
        &mut self,
        name: impl Into<String>,
        body: F,
        in1: Value<A1>,
        in2: Value<A2>,
    ) -> Result<Value<O>, DefinitionError>
    where
        F: Fn(Ctx, A1, A2) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        Ctx: TaskContextArg,
        A1: Element,
        A2: Element,
        O: Element,
        E: std::fmt::Display + Send + 'static,
    {
        self.check_owned(in1.id, "task input")?;
        self.check_owned(in2.id, "task input")?;
        self.register_task(name.into(), vec![in1.id, in2.id], Arc::new(Adapter2::new(body)))
    }

    /// Declares a task taking three input values.
    pub fn task3<F, Fut, Ctx, A1, A2, A3, O, E>(
        &mut self,
        name: impl Into<String>,
        body: F,
        in1: Value<A1>,
        in2: Value<A2>,
        in3: Value<A3>,
    ) -> Result<Value<O>, DefinitionError>
    where
        F: Fn(Ctx, A1, A2, A3) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        Ctx: TaskContextArg,
        A1: Element,
        A2: Element,
        A3: Element,
        O: Element,
        E: std::fmt::Display + Send + 'static,
    {
        self.check_owned(in1.id, "task input")?;
        self.check_owned(in2.id, "task input")?;
        self.check_owned(in3.id, "task input")?;
        self.register_task(
            name.into(),
            vec![in1.id, in2.id, in3.id],
            Arc::new(Adapter3::new(body)),
        )
    }
}
