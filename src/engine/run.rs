use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::engine::definition::Definition;
use crate::engine::types::{DynValue, TaskState};

/// Errors reported by `Start`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("missing value(s) for parameter(s): {0:?}")]
    MissingParameters(Vec<String>),
    #[error("unexpected parameter(s) not declared by the definition: {0:?}")]
    UnexpectedParameters(Vec<String>),
}

/// Errors reported by `Resume`.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("could not decode persisted result for task {task:?}: {source}")]
    SchemaMismatch {
        task: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single execution instance of a [`Definition`]: a fresh or
/// reconstructed identity, bound parameter values, and one [`TaskState`] per
/// declared task (spec §3).
pub struct Run {
    pub(crate) id: Uuid,
    pub(crate) definition: Arc<Definition>,
    pub(crate) parameters: HashMap<String, String>,
    pub(crate) task_states: HashMap<String, TaskState>,
    /// Materialized outputs of tasks already finished successfully, keyed
    /// by task index — seeded from `Resume`'s decoded results so downstream
    /// tasks compute identical inputs whether or not the run was
    /// interrupted (spec §5 ordering guarantees).
    pub(crate) completed: HashMap<usize, DynValue>,
}

impl Run {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Binds parameter values and yields a fresh run with a new identity
/// (spec §4.2). The run is not yet executing; call `Run::run` to drive it.
pub fn start(
    definition: Arc<Definition>,
    parameters: HashMap<String, String>,
) -> Result<Run, StartError> {
    let declared: std::collections::HashSet<&String> = definition.parameters.iter().collect();
    let supplied: std::collections::HashSet<&String> = parameters.keys().collect();

    let missing: Vec<String> = declared
        .difference(&supplied)
        .map(|s| s.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(StartError::MissingParameters(missing));
    }
    let unexpected: Vec<String> = supplied
        .difference(&declared)
        .map(|s| s.to_string())
        .collect();
    if !unexpected.is_empty() {
        return Err(StartError::UnexpectedParameters(unexpected));
    }

    let task_states = definition
        .tasks
        .iter()
        .map(|t| (t.name.clone(), TaskState::pending(&t.name)))
        .collect();

    Ok(Run {
        id: Uuid::new_v4(),
        definition,
        parameters,
        task_states,
        completed: HashMap::new(),
    })
}

/// A run's persistent identity and parameter bindings — the part of a
/// [`Run`] that `Resume` adopts verbatim rather than regenerating.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunHeader {
    pub id: Uuid,
    pub parameters: HashMap<String, String>,
}

/// Reconstructs a run from previously persisted task states (spec §4.2).
///
/// Tasks present in `persisted` and still declared by `definition` are
/// installed verbatim, their serialized results decoded using the
/// definition's knowledge of that task's declared output type. Tasks absent
/// from `persisted`, or present in `persisted` but no longer declared, start
/// Pending; persisted entries with no matching task are ignored. Adding
/// tasks to a workflow and resuming an old run remains valid as long as
/// previously persisted tasks still exist with compatible result types.
pub fn resume(
    definition: Arc<Definition>,
    header: RunHeader,
    persisted: HashMap<String, TaskState>,
) -> Result<Run, ResumeError> {
    let mut task_states = HashMap::with_capacity(definition.tasks.len());
    let mut completed = HashMap::new();

    for (idx, task) in definition.tasks.iter().enumerate() {
        match persisted.get(&task.name) {
            Some(state) if state.finished && state.error.is_empty() => {
                let payload = state.result.clone().unwrap_or(serde_json::Value::Null);
                let decoded = (task.decode_output)(payload).map_err(|source| ResumeError::SchemaMismatch {
                    task: task.name.clone(),
                    source,
                })?;
                completed.insert(idx, decoded);
                task_states.insert(task.name.clone(), state.clone());
            }
            Some(state) if state.finished => {
                // Finished-with-error: immutable per spec §3, nothing to
                // decode, no completed output to seed. Its `started` flag
                // being `true` keeps the scheduler from ever re-firing it,
                // matching "the engine does not retry" (spec §7).
                task_states.insert(task.name.clone(), state.clone());
            }
            Some(_) => {
                // Started but not finished: its completion was never
                // observed by the listener before the run that persisted it
                // stopped (most commonly cancellation draining an in-flight
                // task). Spec §4.3: such a task "remains Pending in
                // persisted state", which here means installing a fresh
                // Pending record so the scheduler's `!started` readiness
                // check fires it again rather than getting permanently
                // stuck behind a task that looks started but never will
                // finish.
                task_states.insert(task.name.clone(), TaskState::pending(&task.name));
            }
            None => {
                task_states.insert(task.name.clone(), TaskState::pending(&task.name));
            }
        }
    }

    Ok(Run {
        id: header.id,
        definition,
        parameters: header.parameters,
        task_states,
        completed,
    })
}
