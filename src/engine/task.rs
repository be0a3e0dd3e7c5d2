use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::context::{Context, Logger, TaskContextArg};
use crate::engine::types::{DynValue, Element, downcast};

/// Type-erased, arity-erased task body. Definition-time adapters (below)
/// close over the concrete argument/output types and the concrete context
/// shape, so by the time a [`TaskNode`](crate::engine::definition::TaskNode)
/// is built, dispatch needs no further reflection.
#[async_trait]
pub(crate) trait TaskBody: Send + Sync {
    async fn invoke(&self, ctx: Context, logger: Arc<dyn Logger>, args: Vec<DynValue>) -> Result<DynValue, String>;
}

/// Generates one `AdapterN` struct plus its `TaskBody` impl for a task body
/// of arity N. Each arity differs only in how many declared inputs the
/// closure takes after its context parameter; this macro is the statically
/// typed stand-in for the reflection-based arity dispatch the original
/// implementation performs at definition time (spec Design Notes).
macro_rules! impl_adapter {
    ($name:ident ; $($arg:ident : $idx:tt),* ) => {
        pub(crate) struct $name<F, Fut, Ctx, $($arg,)* O, E> {
            f: F,
            _marker: PhantomData<fn() -> (Fut, Ctx, $($arg,)* O, E)>,
        }

        impl<F, Fut, Ctx, $($arg,)* O, E> $name<F, Fut, Ctx, $($arg,)* O, E> {
            pub(crate) fn new(f: F) -> Self {
                $name { f, _marker: PhantomData }
            }
        }

        #[async_trait]
        impl<F, Fut, Ctx, $($arg,)* O, E> TaskBody for $name<F, Fut, Ctx, $($arg,)* O, E>
        where
            F: Fn(Ctx, $($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<O, E>> + Send + 'static,
            Ctx: TaskContextArg,
            $($arg: Element,)*
            O: Element,
            E: std::fmt::Display + Send + 'static,
        {
            #[allow(unused_variables)]
            async fn invoke(&self, ctx: Context, logger: Arc<dyn Logger>, args: Vec<DynValue>) -> Result<DynValue, String> {
                let ctx = Ctx::from_parts(ctx, logger);
                $(let $arg: $arg = downcast(&args[$idx]);)*
                (self.f)(ctx, $($arg),*)
                    .await
                    .map(crate::engine::types::boxed)
                    .map_err(|e| e.to_string())
            }
        }
    };
}

impl_adapter!(Adapter0;);
impl_adapter!(Adapter1; A1: 0);
impl_adapter!(Adapter2; A1: 0, A2: 1);
impl_adapter!(Adapter3; A1: 0, A2: 1, A3: 2);
