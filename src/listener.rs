use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::engine::context::Logger;
use crate::engine::types::TaskState;

/// Failure returned from [`Listener::task_state_changed`]. Wraps an
/// arbitrary embedder error (typically an I/O failure writing persisted
/// state) the way the engine's other internal plumbing uses `anyhow`.
#[derive(Debug)]
pub struct ListenerError(pub anyhow::Error);

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for ListenerError {
    fn from(e: anyhow::Error) -> Self {
        ListenerError(e)
    }
}

/// The embedder-supplied persistence and observability seam (spec §4.5).
/// The engine has no hard dependency on any storage or log backend: every
/// state transition and every per-task log line passes through here.
///
/// `task_state_changed` is invoked synchronously from the engine's point of
/// view — calls are serialized by the run loop, so at most one is in flight
/// at a time — and is permitted to fail, which aborts the run with
/// [`RunError::Listener`](crate::engine::executor::RunError::Listener).
#[async_trait]
pub trait Listener: Send + Sync {
    async fn task_state_changed(
        &self,
        run_id: Uuid,
        task: &str,
        state: &TaskState,
    ) -> Result<(), ListenerError>;

    /// Returns the log sink for a given task within a given run.
    fn logger(&self, run_id: Uuid, task: &str) -> Arc<dyn Logger>;
}
