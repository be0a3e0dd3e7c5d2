use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::context::Context;
use crate::engine::definition::Definition;
use crate::engine::run::Run;
use crate::engine::types::{AnyElement as _, DynValue, ValueId, ValueKind};
use crate::listener::{Listener, ListenerError};

/// Errors returned by [`Run::run`]. These are the only errors the run loop
/// itself can return — individual task failures are captured in
/// [`TaskState`](crate::engine::types::TaskState) instead and never surface
/// here directly (spec §7).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run was cancelled")]
    Cancelled,
    #[error("{message}")]
    Stuck { message: String },
    #[error("listener rejected a state update: {0}")]
    Listener(#[from] ListenerError),
    #[error("failed to serialize a value: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resolves a value node to its concrete runtime representation, recursing
/// through aggregates. Returns `None` if some input the value depends on
/// (a task output, most commonly) is not yet available.
fn materialize(
    definition: &Definition,
    completed: &HashMap<usize, DynValue>,
    parameters: &HashMap<String, String>,
    id: ValueId,
) -> Option<DynValue> {
    let node = &definition.values[id.index];
    match &node.kind {
        ValueKind::Constant(v) => Some(v.clone()),
        ValueKind::Parameter(name) => parameters
            .get(name)
            .map(|s| crate::engine::types::boxed(s.clone())),
        ValueKind::TaskOutput(task_idx) => completed.get(task_idx).cloned(),
        ValueKind::Aggregate { elements, combine } => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(materialize(definition, completed, parameters, *element)?);
            }
            Some(combine(values))
        }
    }
}

impl Run {
    /// Drives the scheduler to completion: fires tasks as their inputs
    /// become ready, awaits completions, applies results, and terminates on
    /// cancellation, success, or a stuck condition (spec §4.3).
    ///
    /// There is no bound on concurrency — every ready task is dispatched
    /// the moment it becomes ready, each on its own `tokio::spawn`.
    /// Embedders throttle by scheduling choices inside their task bodies.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        listener: Arc<dyn Listener>,
    ) -> Result<HashMap<String, serde_json::Value>, RunError> {
        let definition = self.definition.clone();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(usize, Result<DynValue, String>)>();
        let mut in_flight = 0usize;
        // Once cancellation is observed, pending tasks stop being dispatched
        // and completions of already-running tasks are drained but not
        // applied: their outcome was "not observed before cancellation"
        // (spec §4.3), so the task's last-notified state (Running) is what
        // ends up persisted, not whatever the task body happened to return
        // while racing the cancellation.
        let mut draining = false;

        loop {
            if !draining && cancel.is_cancelled() {
                draining = true;
            }

            if !draining {
                let ready: Vec<usize> = definition
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, task)| {
                        let state = &self.task_states[&task.name];
                        !state.started
                            && task.inputs.iter().all(|value_id| {
                                materialize(&definition, &self.completed, &self.parameters, *value_id)
                                    .is_some()
                            })
                    })
                    .map(|(idx, _)| idx)
                    .collect();

                for idx in ready {
                    let task = &definition.tasks[idx];
                    let args: Vec<DynValue> = task
                        .inputs
                        .iter()
                        .map(|value_id| {
                            materialize(&definition, &self.completed, &self.parameters, *value_id)
                                .expect("input availability re-checked at dispatch time")
                        })
                        .collect();

                    {
                        let state = self.task_states.get_mut(&task.name).expect("state initialized for every task");
                        state.running();
                        listener
                            .task_state_changed(self.id, &task.name, state)
                            .await
                            .map_err(RunError::Listener)?;
                    }
                    info!(run_id = %self.id, task = %task.name, "task started");

                    in_flight += 1;
                    let body = task.body.clone();
                    let ctx = Context::new(self.id, task.name.clone(), cancel.clone());
                    let logger = listener.logger(self.id, &task.name);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let result = body.invoke(ctx, logger, args).await;
                        let _ = tx.send((idx, result));
                    });
                }
            }

            if let Some(outputs) = self.collect_outputs_if_ready(&definition)? {
                return Ok(outputs);
            }

            if in_flight == 0 {
                if draining {
                    warn!(run_id = %self.id, "run cancelled with no tasks in flight");
                    return Err(RunError::Cancelled);
                }
                let message = format!(
                    "workflow {} has run as far as it can: no task is running and none are ready to start",
                    self.id
                );
                warn!(run_id = %self.id, "{}", message);
                return Err(RunError::Stuck { message });
            }

            tokio::select! {
                _ = cancel.cancelled(), if !draining => {
                    info!(run_id = %self.id, "cancellation observed, draining in-flight tasks");
                    draining = true;
                }
                Some((idx, result)) = rx.recv() => {
                    in_flight -= 1;
                    if draining {
                        info!(run_id = %self.id, task = %definition.tasks[idx].name, "discarding completion observed after cancellation");
                    } else {
                        self.apply_result(&definition, idx, result, &listener).await?;
                    }
                }
            }
        }
    }

    async fn apply_result(
        &mut self,
        definition: &Definition,
        idx: usize,
        result: Result<DynValue, String>,
        listener: &Arc<dyn Listener>,
    ) -> Result<(), RunError> {
        let task = &definition.tasks[idx];
        let mut state = self
            .task_states
            .get(&task.name)
            .cloned()
            .expect("state initialized for every task");

        match result {
            // Round-trip through the same serialize-then-deserialize path
            // `resume` uses to seed `completed` (run.rs), so a live run and a
            // resumed run feed downstream tasks bit-identical inputs (spec
            // §5, §9 "serialization seam") rather than the in-process value.
            Ok(value) => match value.to_json().and_then(|json| {
                (task.decode_output)(json.clone()).map(|decoded| (json, decoded))
            }) {
                Ok((json, decoded)) => {
                    state.succeeded(json);
                    self.completed.insert(idx, decoded);
                    info!(run_id = %self.id, task = %task.name, "task finished");
                }
                Err(e) => {
                    let message = format!("failed to serialize result: {e}");
                    warn!(run_id = %self.id, task = %task.name, error = %message, "task failed");
                    state.failed(message);
                }
            },
            Err(message) => {
                warn!(run_id = %self.id, task = %task.name, error = %message, "task failed");
                state.failed(message);
            }
        }

        self.task_states.insert(task.name.clone(), state.clone());
        listener
            .task_state_changed(self.id, &task.name, &state)
            .await
            .map_err(RunError::Listener)?;
        Ok(())
    }

    fn collect_outputs_if_ready(
        &self,
        definition: &Definition,
    ) -> Result<Option<HashMap<String, serde_json::Value>>, RunError> {
        let mut resolved = Vec::with_capacity(definition.outputs.len());
        for (name, value_id) in &definition.outputs {
            match materialize(definition, &self.completed, &self.parameters, *value_id) {
                Some(v) => resolved.push((name.clone(), v)),
                None => return Ok(None),
            }
        }
        let mut outputs = HashMap::with_capacity(resolved.len());
        for (name, value) in resolved {
            outputs.insert(name, value.to_json()?);
        }
        Ok(Some(outputs))
    }
}
