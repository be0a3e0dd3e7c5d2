use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-task log sink obtained from the listener by (run id, task name). Its
/// output is the task's own log stream, orthogonal to `TaskStateChanged`
/// notifications (spec §4.4). Implementations are expected to be safe to
/// call concurrently — the engine never serializes logger writes.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

/// A [`Logger`] that discards everything, used where the embedder supplies
/// no listener-backed logger.
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _message: &str) {}
}

/// The ambient context every task body receives: run identity, the task's
/// own name, and the cancellation signal propagated from `Run::run`'s
/// cancellation token. Plain task bodies declare this as their first
/// parameter; bodies that also want logging declare [`TaskContext`] instead
/// (see [`TaskContextArg`]).
#[derive(Clone)]
pub struct Context {
    run_id: Uuid,
    task: String,
    cancellation: CancellationToken,
}

impl Context {
    pub(crate) fn new(run_id: Uuid, task: impl Into<String>, cancellation: CancellationToken) -> Self {
        Context {
            run_id,
            task: task.into(),
            cancellation,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// True once the run's cancellation token has fired. Task bodies that
    /// poll in a loop should check this and return promptly.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the run's cancellation token fires. Task bodies that
    /// block on I/O should `select!` on this alongside their own work.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// The augmented context: a [`Context`] plus a [`Logger`] bound to this
/// task's (run id, name). Accessed via `Deref` for the plain-context
/// methods, so `ctx.run_id()` and `ctx.cancelled()` work on either shape.
#[derive(Clone)]
pub struct TaskContext {
    inner: Context,
    logger: Arc<dyn Logger>,
}

impl TaskContext {
    pub(crate) fn new(inner: Context, logger: Arc<dyn Logger>) -> Self {
        TaskContext { inner, logger }
    }

    /// Writes a formatted line to this task's log stream, mirroring the
    /// `Printf`-style logger the original implementation exposes.
    pub fn printf(&self, args: std::fmt::Arguments<'_>) {
        self.logger.log(&args.to_string());
    }
}

impl std::ops::Deref for TaskContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.inner
    }
}

/// Distinguishes the two context shapes a task body may declare as its
/// first parameter. The engine picks the implementation matching the
/// closure's declared parameter type at the call site (generic inference on
/// `Definition::task*`), the static analogue of introspecting the body's
/// declared first parameter at definition time.
///
/// Sealed: [`Context`] and [`TaskContext`] are the only two shapes a task
/// body may declare.
pub trait TaskContextArg: sealed::Sealed + Send + 'static {
    #[doc(hidden)]
    fn from_parts(ctx: Context, logger: Arc<dyn Logger>) -> Self;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Context {}
    impl Sealed for super::TaskContext {}
}

impl TaskContextArg for Context {
    fn from_parts(ctx: Context, _logger: Arc<dyn Logger>) -> Self {
        ctx
    }
}

impl TaskContextArg for TaskContext {
    fn from_parts(ctx: Context, logger: Arc<dyn Logger>) -> Self {
        TaskContext::new(ctx, logger)
    }
}
