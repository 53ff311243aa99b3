//! Shared fixtures for integration tests
#![allow(dead_code)]

use mpal::domain::{Command, CustomArgs, Expression, FunctionIndex, VariableName};
use mpal::scheduler;
use mpal::{CustomFunction, FatalPolicy, ResourceTables, Runtime, RuntimeConfig, from_fn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Config that records fatal errors instead of aborting the test process
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        fatal_policy: FatalPolicy::Record,
        rng_seed: Some(7),
        ..Default::default()
    }
}

pub fn build(tables: ResourceTables) -> Runtime {
    Runtime::builder(tables)
        .config(test_config())
        .build()
        .expect("fixture tables are valid")
}

pub fn call(function: u32, args: CustomArgs) -> Command {
    Command::CustomCall {
        function: FunctionIndex::new(function),
        args,
    }
}

pub fn assign(name: &str, value: i32) -> Command {
    Command::VarAssign {
        name: VariableName::from(name),
        value: Expression::Const(value),
    }
}

/// `name = name + 1`
pub fn increment(name: &str) -> Command {
    Command::VarAssign {
        name: VariableName::from(name),
        value: Expression::binary(
            mpal::domain::BinaryOp::Add,
            Expression::var(name),
            Expression::Const(1),
        ),
    }
}

/// `name == value`
pub fn var_equals(name: &str, value: i32) -> Expression {
    Expression::equals(Expression::var(name), Expression::Const(value))
}

/// One observed custom function call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub function: u32,
    pub args: CustomArgs,
    pub started: Duration,
    pub finished: Option<Duration>,
}

/// Custom functions that log their calls
///
/// A recorded function sleeps `args[3]` milliseconds before returning, so
/// fixtures can model host callbacks of different lengths.
#[derive(Clone)]
pub struct Recorder {
    origin: Instant,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            calls: Arc::default(),
        }
    }

    pub fn function(&self, index: u32) -> Arc<dyn CustomFunction> {
        let recorder = self.clone();
        from_fn(move |_runtime: Runtime, args: CustomArgs| {
            let recorder = recorder.clone();
            async move {
                let slot = recorder.start(index, args);
                if args[3] > 0 {
                    scheduler::sleep(Duration::from_millis(args[3] as u64)).await;
                }
                recorder.finish(slot);
                Ok(())
            }
        })
    }

    /// Register `indices` on `runtime`
    pub fn install(&self, runtime: &Runtime, indices: &[u32]) {
        for &index in indices {
            runtime.register_custom_function(index, self.function(index));
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, function: u32) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.function == function)
            .collect()
    }

    fn start(&self, function: u32, args: CustomArgs) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call {
            function,
            args,
            started: self.origin.elapsed(),
            finished: None,
        });
        calls.len() - 1
    }

    fn finish(&self, slot: usize) {
        self.calls.lock().unwrap()[slot].finished = Some(self.origin.elapsed());
    }
}
