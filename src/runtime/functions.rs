//! Host-supplied custom functions

use crate::domain::errors::{FatalError, MpalError};
use crate::domain::value_objects::{CustomArgs, FunctionIndex};
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A game-specific side effect invoked by index from a command list
///
/// Calls run inside a scheduler task and may suspend (sleep, wait on events,
/// start scripts). Returning a fatal error fails the calling task.
#[async_trait]
pub trait CustomFunction: Send + Sync {
    async fn call(&self, runtime: Runtime, args: CustomArgs) -> Result<(), MpalError>;
}

/// Adapter turning an async closure into a [`CustomFunction`]
pub struct FnFunction<F>(F);

#[async_trait]
impl<F, Fut> CustomFunction for FnFunction<F>
where
    F: Fn(Runtime, CustomArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MpalError>> + Send + 'static,
{
    async fn call(&self, runtime: Runtime, args: CustomArgs) -> Result<(), MpalError> {
        (self.0)(runtime, args).await
    }
}

/// Wrap a closure returning a future as a custom function
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn CustomFunction>
where
    F: Fn(Runtime, CustomArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MpalError>> + Send + 'static,
{
    Arc::new(FnFunction(f))
}

/// Custom functions keyed by index
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<FunctionIndex, Arc<dyn CustomFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` at `index`, returning the one it replaced
    pub fn register(
        &mut self,
        index: FunctionIndex,
        function: Arc<dyn CustomFunction>,
    ) -> Option<Arc<dyn CustomFunction>> {
        self.functions.insert(index, function)
    }

    /// Look up `index`; a missing entry is a fatal fault of the command stream
    pub fn resolve(&self, index: FunctionIndex) -> Result<Arc<dyn CustomFunction>, MpalError> {
        self.functions
            .get(&index)
            .cloned()
            .ok_or(MpalError::Fatal(FatalError::UnknownFunction(index)))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
