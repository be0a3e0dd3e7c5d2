//! A library for declaring directed acyclic graphs of computational tasks,
//! executing them with maximum parallelism, and resuming partially
//! completed runs after a process restart or cancellation.
//!
//! Four layers, leaves first: the [`Value`] graph (constants, parameters,
//! task outputs, aggregates), the [`Definition`] builder, [`Run`] state
//! (start/resume, per-task [`TaskState`]), and the scheduler that drives a
//! run via [`Run::run`]. Concrete task state storage, log sinks, and task
//! implementations are the embedder's responsibility, reached through the
//! [`Listener`] trait — this crate never writes to disk itself.
//!
//! ```ignore
//! use std::sync::Arc;
//! use workflow::{Definition, start};
//!
//! let mut wd = Definition::new();
//! let greeting = wd.constant("hello world".to_string());
//! let out = wd.task1("echo", |_ctx, s: String| async move { Ok::<_, String>(s) }, greeting).unwrap();
//! wd.output("greeting", out).unwrap();
//!
//! let run = start(Arc::new(wd), Default::default()).unwrap();
//! // run.run(cancellation_token, listener).await
//! ```

pub mod engine;
pub mod listener;

pub use engine::context::{Context, Logger, NullLogger, TaskContext};
pub use engine::definition::{Definition, DefinitionError};
pub use engine::executor::RunError;
pub use engine::run::{ResumeError, Run, RunHeader, StartError, resume, start};
pub use engine::types::{TaskState, Value};
pub use listener::{Listener, ListenerError};
