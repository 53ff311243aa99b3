//! Script runner - Time-sequenced command moments

use super::Runtime;
use crate::domain::entities::{FireTime, Script};
use crate::domain::errors::MpalError;
use crate::domain::value_objects::{Command, CustomArgs, FunctionIndex, ScriptId};
use crate::scheduler::{self, INFINITE, TaskHandle, lock};
use std::time::Duration;
use tokio::time::Instant;

impl Runtime {
    /// Start script `id` as a new task
    pub fn execute_script(&self, id: ScriptId) -> Result<TaskHandle, MpalError> {
        let script = self
            .tables()
            .script(id)
            .cloned()
            .ok_or_else(|| MpalError::not_found(format!("script {id}")))?;

        log::debug!("starting script {id} ({} moments)", script.moments.len());
        let runtime = self.clone();
        Ok(self
            .scheduler()
            .spawn(format!("script:{id}"), async move { runtime.run_script(&script).await }))
    }

    async fn run_script(&self, script: &Script) -> Result<(), MpalError> {
        let mut start = Instant::now();
        let mut previous: Vec<TaskHandle> = Vec::new();

        for (index, moment) in script.moments.iter().enumerate() {
            match moment.time {
                FireTime::JoinPrevious => {
                    scheduler::wait_all(&previous, INFINITE).await;
                    start = Instant::now();
                }
                FireTime::At(offset_ms) => {
                    let deadline = start + Duration::from_millis(offset_ms);
                    if Instant::now() < deadline {
                        scheduler::sleep_until(deadline).await;
                    }
                }
            }

            log::trace!("script {} moment {index} fires", script.id);
            previous = Vec::new();
            for command in &moment.commands {
                match command {
                    Command::CustomCall { function, args } => {
                        previous.push(self.spawn_custom_call(*function, *args)?);
                    }
                    Command::VarAssign { name, value } => self.assign(name, value)?,
                }
            }
        }

        log::debug!("script {} finished", script.id);
        Ok(())
    }

    /// Run custom function `index` in a task of its own
    fn spawn_custom_call(&self, index: FunctionIndex, args: CustomArgs) -> Result<TaskHandle, MpalError> {
        // Resolve up front so an unknown index fails the script, not a detached child
        lock(&self.inner.functions).resolve(index)?;
        let runtime = self.clone();
        Ok(self
            .scheduler()
            .spawn(format!("custom:{index}"), async move {
                runtime.call_custom(index, args).await
            }))
    }
}
