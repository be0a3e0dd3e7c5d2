//! Exercises the `TaskContext`-to-`Listener::logger` path end to end,
//! mirroring the original implementation's logging scenario: a task body
//! that declares the augmented context and writes through it, observed via
//! a listener that hands back a capturing logger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tracing_test::{logs_contain, traced_test};
use workflow::{Context, Definition, Listener, ListenerError, Logger, TaskContext, TaskState, start};

struct NullListener;

#[async_trait]
impl Listener for NullListener {
    async fn task_state_changed(
        &self,
        _run_id: Uuid,
        _task: &str,
        _state: &TaskState,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn logger(&self, _run_id: Uuid, _task: &str) -> Arc<dyn Logger> {
        Arc::new(workflow::NullLogger)
    }
}

#[derive(Default)]
struct CapturingLogger {
    lines: Mutex<Vec<String>>,
}

impl Logger for CapturingLogger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

struct LoggingListener {
    logger: Arc<CapturingLogger>,
}

#[async_trait]
impl Listener for LoggingListener {
    async fn task_state_changed(
        &self,
        _run_id: Uuid,
        _task: &str,
        _state: &TaskState,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn logger(&self, _run_id: Uuid, _task: &str) -> Arc<dyn Logger> {
        self.logger.clone()
    }
}

async fn noisy(ctx: TaskContext) -> Result<String, String> {
    ctx.printf(format_args!("hello from {}", ctx.task_name()));
    Ok("done".to_string())
}

#[tokio::test]
async fn task_context_printf_reaches_the_listeners_logger() {
    let mut wd = Definition::new();
    let out = wd.task0("noisy", noisy).unwrap();
    wd.output("out", out).unwrap();

    let logger = Arc::new(CapturingLogger::default());
    let listener = Arc::new(LoggingListener {
        logger: logger.clone(),
    });

    let run = start(Arc::new(wd), HashMap::new()).unwrap();
    let outputs = run.run(CancellationToken::new(), listener).await.unwrap();

    assert_eq!(outputs.get("out").unwrap(), &serde_json::json!("done"));
    assert_eq!(logger.lines.lock().unwrap().as_slice(), ["hello from noisy"]);
}

/// A plain [`Context`] task never touches the logger — confirms the two
/// context shapes are genuinely independent, not one wrapping the other
/// at the call site.
#[tokio::test]
async fn plain_context_task_does_not_log() {
    async fn quiet(_ctx: Context) -> Result<String, String> {
        Ok("quiet".to_string())
    }

    let mut wd = Definition::new();
    let out = wd.task0("quiet", quiet).unwrap();
    wd.output("out", out).unwrap();

    let logger = Arc::new(CapturingLogger::default());
    let listener = Arc::new(LoggingListener {
        logger: logger.clone(),
    });

    let run = start(Arc::new(wd), HashMap::new()).unwrap();
    run.run(CancellationToken::new(), listener).await.unwrap();

    assert!(logger.lines.lock().unwrap().is_empty());
}

/// The engine's own ambient `tracing` events (dispatch/completion) are
/// independent of the per-task [`Logger`] above — this exercises that
/// second channel, the one an embedder's own subscriber would pick up.
#[traced_test]
#[tokio::test]
async fn engine_emits_tracing_events_around_dispatch() {
    let mut wd = Definition::new();
    let c = wd.constant("x".to_string());
    let out = wd.task1("echo", |_ctx: Context, s: String| async move { Ok::<_, String>(s) }, c).unwrap();
    wd.output("out", out).unwrap();

    let run = start(Arc::new(wd), HashMap::new()).unwrap();
    run.run(CancellationToken::new(), Arc::new(NullListener))
        .await
        .unwrap();

    assert!(logs_contain("task started"));
    assert!(logs_contain("task finished"));
}
