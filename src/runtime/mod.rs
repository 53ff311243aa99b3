//! Scripting runtime
//!
//! A [`Runtime`] owns the resource tables, the variable store, the custom
//! function registry and the scheduler. Item actions, scripts, dialogs and
//! idle polling all run as scheduler tasks holding a clone of the runtime
//! handle.

use crate::config::RuntimeConfig;
use crate::domain::entities::{Item, ResourceTables};
use crate::domain::errors::MpalError;
use crate::domain::repositories::{ExpressionEvaluator, ItemObserver, ResourceRepository};
use crate::domain::services::StandardEvaluator;
use crate::domain::value_objects::{
    Command, CustomArgs, Expression, FunctionIndex, ItemId, LocationId, PATTERN_PREFIX,
    STATUS_PREFIX, VariableName,
};
use crate::scheduler::{Event, Scheduler, lock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

pub mod action;
pub mod dialog;
pub mod functions;
pub mod idle;
pub mod script;
pub mod variables;

pub use dialog::ChoiceWait;
pub use functions::{CustomFunction, FunctionRegistry, from_fn};
pub use variables::VariableStore;

use action::ActionLedger;
use dialog::DialogState;
use idle::IdleSlots;

pub(crate) struct RuntimeInner {
    tables: ResourceTables,
    variables: VariableStore,
    scheduler: Scheduler,
    evaluator: Arc<dyn ExpressionEvaluator>,
    functions: Mutex<FunctionRegistry>,
    observer: Mutex<Option<Arc<dyn ItemObserver>>>,
    config: RuntimeConfig,
    action: Mutex<ActionLedger>,
    dialog: Mutex<DialogState>,
    ask_choice: Event,
    done_choice: Event,
    idle: Mutex<IdleSlots>,
    idle_teardowns: AtomicUsize,
    rng: Mutex<StdRng>,
}

/// Handle to a loaded runtime; clones share the same state
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Builder for [`Runtime`]
///
/// ```rust
/// use mpal::{Runtime, ResourceTables, RuntimeConfig};
///
/// let runtime = Runtime::builder(ResourceTables::default())
///     .config(RuntimeConfig::default())
///     .build()
///     .unwrap();
/// assert!(runtime.executing_action().is_none());
/// ```
pub struct RuntimeBuilder {
    tables: ResourceTables,
    config: RuntimeConfig,
    evaluator: Arc<dyn ExpressionEvaluator>,
    functions: FunctionRegistry,
    observer: Option<Arc<dyn ItemObserver>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn function(mut self, index: u32, function: Arc<dyn CustomFunction>) -> Self {
        self.functions.register(FunctionIndex::new(index), function);
        self
    }

    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ItemObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the tables and assemble the runtime
    pub fn build(self) -> Result<Runtime, MpalError> {
        self.tables.validate()?;

        let rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let variables = VariableStore::new(self.tables.variables.clone());
        let idle = IdleSlots::with_capacity(self.config.max_polling_locations);

        log::info!(
            "runtime loaded: {} variables, {} items, {} dialogs, {} scripts",
            variables.len(),
            self.tables.items.len(),
            self.tables.dialogs.len(),
            self.tables.scripts.len()
        );

        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                scheduler: Scheduler::new(self.config.fatal_policy),
                tables: self.tables,
                variables,
                evaluator: self.evaluator,
                functions: Mutex::new(self.functions),
                observer: Mutex::new(self.observer),
                config: self.config,
                action: Mutex::new(ActionLedger::default()),
                dialog: Mutex::new(DialogState::default()),
                ask_choice: Event::new(false),
                done_choice: Event::new(false),
                idle: Mutex::new(idle),
                idle_teardowns: AtomicUsize::new(0),
                rng: Mutex::new(rng),
            }),
        })
    }
}

impl Runtime {
    pub fn builder(tables: ResourceTables) -> RuntimeBuilder {
        RuntimeBuilder {
            tables,
            config: RuntimeConfig::default(),
            evaluator: Arc::new(StandardEvaluator::new()),
            functions: FunctionRegistry::new(),
            observer: None,
        }
    }

    /// Build a runtime over already-parsed tables with default settings
    pub fn load_resources(tables: ResourceTables) -> Result<Self, MpalError> {
        Self::builder(tables).build()
    }

    /// Load the tables from `repository` and build a runtime with `config`
    pub async fn from_repository(
        repository: &dyn ResourceRepository,
        config: RuntimeConfig,
    ) -> Result<Self, MpalError> {
        let tables = repository.load_tables().await?;
        Self::builder(tables).config(config).build()
    }

    pub fn tables(&self) -> &ResourceTables {
        &self.inner.tables
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn variables(&self) -> &VariableStore {
        &self.inner.variables
    }

    /// First fatal error recorded by any task (only under `FatalPolicy::Record`)
    pub fn fatal_error(&self) -> Option<MpalError> {
        self.inner.scheduler.fatal_error()
    }

    pub fn get_variable(&self, name: &str) -> Result<i32, MpalError> {
        self.inner
            .variables
            .get(&VariableName::from(name))
            .ok_or_else(|| MpalError::not_found(format!("variable '{name}'")))
    }

    pub fn set_variable(&self, name: &str, value: i32) -> Result<(), MpalError> {
        let name = VariableName::from(name);
        self.inner.variables.set(&name, value)?;
        self.notify_item_change(&name, value);
        Ok(())
    }

    /// Register or replace a host callback
    pub fn register_custom_function(&self, index: u32, function: Arc<dyn CustomFunction>) {
        if lock(&self.inner.functions)
            .register(FunctionIndex::new(index), function)
            .is_some()
        {
            log::debug!("custom function {index} replaced");
        }
    }

    pub fn set_item_observer(&self, observer: Arc<dyn ItemObserver>) {
        *lock(&self.inner.observer) = Some(observer);
    }

    /// Items currently placed in `location`
    pub fn items_in_location(&self, location: LocationId) -> Vec<ItemId> {
        self.inner.variables.items_in_location(location)
    }

    pub fn item_name(&self, item: ItemId) -> Option<&str> {
        self.inner.tables.item(item)?.name.as_deref()
    }

    pub fn message(&self, id: u32) -> Option<&str> {
        self.inner.tables.message(id).map(|message| message.text.as_str())
    }

    /// Raw byte dump of the variable store
    pub fn save_state(&self) -> Vec<u8> {
        crate::storage::save_state(&self.inner.variables)
    }

    /// Restore a dump produced by [`Runtime::save_state`]
    pub fn load_state(&self, bytes: &[u8]) -> Result<(), MpalError> {
        crate::storage::load_state(&self.inner.variables, bytes)
    }

    pub(crate) fn item(&self, item: ItemId) -> Result<&Item, MpalError> {
        self.inner
            .tables
            .item(item)
            .ok_or_else(|| MpalError::not_found(format!("item {item}")))
    }

    /// Value of `Status.<item>`; a missing variable counts as inactive
    pub(crate) fn item_status(&self, item: ItemId) -> i32 {
        self.inner
            .variables
            .get(&VariableName::status_of(item))
            .unwrap_or(-1)
    }

    pub(crate) fn evaluate(&self, expr: &Expression) -> Result<i32, MpalError> {
        self.inner
            .variables
            .evaluate(self.inner.evaluator.as_ref(), expr)
    }

    /// Evaluate an optional precondition; absent means true
    pub(crate) fn precondition_holds(&self, when: Option<&Expression>) -> Result<bool, MpalError> {
        match when {
            Some(expr) => Ok(self.evaluate(expr)? != 0),
            None => Ok(true),
        }
    }

    pub(crate) fn assign(&self, name: &VariableName, expr: &Expression) -> Result<(), MpalError> {
        let value = self
            .inner
            .variables
            .assign(self.inner.evaluator.as_ref(), name, expr)?;
        log::trace!("{name} = {value}");
        self.notify_item_change(name, value);
        Ok(())
    }

    /// Invoke custom function `index` in the calling task
    pub(crate) async fn call_custom(
        &self,
        index: FunctionIndex,
        args: CustomArgs,
    ) -> Result<(), MpalError> {
        let function = lock(&self.inner.functions).resolve(index)?;
        log::trace!("custom function {index} {args:?}");
        function.call(self.clone(), args).await
    }

    /// Run one action/script command inline
    pub(crate) async fn execute_command(&self, command: &Command) -> Result<(), MpalError> {
        match command {
            Command::CustomCall { function, args } => self.call_custom(*function, *args).await,
            Command::VarAssign { name, value } => self.assign(name, value),
        }
    }

    /// Surface a fatal error raised outside any task
    pub(crate) fn escalate(&self, err: MpalError) -> MpalError {
        if err.is_fatal() {
            self.inner.scheduler.report_fatal("host call", err.clone());
        }
        err
    }

    pub(crate) fn draw_percent(&self) -> u8 {
        use rand::Rng;
        lock(&self.inner.rng).gen_range(0..100)
    }

    fn notify_item_change(&self, name: &VariableName, value: i32) {
        let observer = match lock(&self.inner.observer).clone() {
            Some(observer) => observer,
            None => return,
        };
        if let Some(item) = name.item_suffix(PATTERN_PREFIX) {
            observer.pattern_changed(item, value);
        } else if let Some(item) = name.item_suffix(STATUS_PREFIX) {
            observer.status_changed(item, value);
        }
    }
}

#[cfg(test)]
mod tests;
