//! Dialog engine - Groups, choices and host-resolved selections
//!
//! A dialog runs as one task executing its start group. `DoChoice` commands
//! evaluate the choice's selects, raise the ask event and block on the done
//! event until the host picks an active select with
//! [`Runtime::select_choice`]. The chosen select's groups run inline in the
//! same task. A shepherd task clears the dialog state when the root task
//! ends and signals the ask event so a blocked [`Runtime::wait_for_choice`]
//! returns [`ChoiceWait::NoDialog`].

use super::Runtime;
use crate::domain::entities::Dialog;
use crate::domain::errors::{FatalError, MpalError};
use crate::domain::value_objects::{ChoiceId, DialogId, GroupCommand, GroupId};
use crate::scheduler::{INFINITE, TaskHandle, lock};
use std::future::Future;
use std::pin::Pin;

/// What the host learns from [`Runtime::wait_for_choice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceWait {
    /// The running dialog waits for a selection on this choice
    Choice(ChoiceId),
    /// No dialog is running any more
    NoDialog,
}

#[derive(Debug, Default)]
pub(crate) struct DialogState {
    running: Option<DialogId>,
    pending: Option<PendingChoice>,
    selected: Option<usize>,
}

#[derive(Debug)]
struct PendingChoice {
    choice: ChoiceId,
    /// Activity of each select, in declaration order
    active: Vec<bool>,
}

/// How a group ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupFlow {
    Continue,
    EndDialog,
}

type GroupFuture<'a> = Pin<Box<dyn Future<Output = Result<GroupFlow, MpalError>> + Send + 'a>>;

impl Runtime {
    /// Start dialog `dialog` at `group`
    pub fn do_dialog(&self, dialog: DialogId, group: GroupId) -> Result<TaskHandle, MpalError> {
        let definition = self
            .tables()
            .dialog(dialog)
            .ok_or_else(|| MpalError::not_found(format!("dialog {dialog}")))?;
        if definition.group(group).is_none() {
            return Err(MpalError::not_found(format!("group {group} of dialog {dialog}")));
        }

        {
            let mut state = lock(&self.inner.dialog);
            if state.running.is_some() {
                return Err(MpalError::AlreadyRunning);
            }
            *state = DialogState {
                running: Some(dialog),
                ..Default::default()
            };
        }
        self.inner.ask_choice.reset();
        self.inner.done_choice.reset();

        log::info!("starting dialog {dialog} at group {group}");
        let runtime = self.clone();
        let handle = self
            .scheduler()
            .spawn(format!("dialog:{dialog}"), async move {
                let definition = runtime
                    .tables()
                    .dialog(dialog)
                    .ok_or_else(|| MpalError::not_found(format!("dialog {dialog}")))?;
                runtime.run_group(definition, group).await?;
                Ok(())
            });

        let runtime = self.clone();
        let watched = handle.clone();
        self.scheduler()
            .spawn(format!("dialog-shepherd:{dialog}"), async move {
                watched.join().await;
                *lock(&runtime.inner.dialog) = DialogState::default();
                log::info!("dialog {dialog} finished");
                runtime.inner.ask_choice.set();
                Ok(())
            });

        Ok(handle)
    }

    /// Block until a choice is pending or no dialog is running
    ///
    /// Returns at once when a choice is already pending or no dialog runs.
    pub async fn wait_for_choice(&self) -> ChoiceWait {
        loop {
            {
                let state = lock(&self.inner.dialog);
                if let Some(pending) = &state.pending {
                    return ChoiceWait::Choice(pending.choice);
                }
                if state.running.is_none() {
                    return ChoiceWait::NoDialog;
                }
            }
            // The event stays set until reset, so a raise between the check and the wait is kept
            self.inner.ask_choice.wait(INFINITE).await;
            self.inner.ask_choice.reset();
        }
    }

    /// Resolve the pending `choice` with the active select carrying `data`
    pub fn select_choice(&self, choice: ChoiceId, data: i32) -> Result<(), MpalError> {
        let invalid = MpalError::InvalidSelection { choice, data };
        {
            let mut state = lock(&self.inner.dialog);
            let dialog = state
                .running
                .and_then(|id| self.tables().dialog(id))
                .ok_or_else(|| invalid.clone())?;
            let pending = state
                .pending
                .as_ref()
                .filter(|pending| pending.choice == choice)
                .ok_or_else(|| invalid.clone())?;
            let selects = &dialog.choice(choice).ok_or_else(|| invalid.clone())?.selects;
            let index = selects
                .iter()
                .zip(&pending.active)
                .position(|(select, &active)| active && select.data == data)
                .ok_or_else(|| {
                    log::warn!("rejected selection {data} for choice {choice}");
                    invalid.clone()
                })?;

            state.pending = None;
            state.selected = Some(index);
        }
        log::debug!("choice {choice} resolved with data {data}");
        self.inner.done_choice.set();
        Ok(())
    }

    /// Data tags of the active selects of the pending `choice`
    pub fn dialog_select_list(&self, choice: ChoiceId) -> Vec<i32> {
        let state = lock(&self.inner.dialog);
        let (Some(pending), Some(dialog)) = (
            state.pending.as_ref().filter(|pending| pending.choice == choice),
            state.running.and_then(|id| self.tables().dialog(id)),
        ) else {
            return Vec::new();
        };
        let Some(definition) = dialog.choice(choice) else {
            return Vec::new();
        };
        definition
            .selects
            .iter()
            .zip(&pending.active)
            .filter(|(_, active)| **active)
            .map(|(select, _)| select.data)
            .collect()
    }

    /// Text of period `id` in the running dialog
    pub fn dialog_period(&self, id: u32) -> Option<&str> {
        let running = lock(&self.inner.dialog).running?;
        self.tables()
            .dialog(running)?
            .period(id)
            .map(|period| period.text.as_str())
    }

    pub fn executing_dialog(&self) -> Option<DialogId> {
        lock(&self.inner.dialog).running
    }

    fn run_group<'a>(&'a self, dialog: &'a Dialog, group: GroupId) -> GroupFuture<'a> {
        Box::pin(async move {
            let definition = dialog
                .group(group)
                .ok_or(MpalError::Fatal(FatalError::UnknownGroup(group)))?;
            log::debug!("dialog {} group {group}", dialog.id);

            for command in &definition.commands {
                match command {
                    GroupCommand::CustomCall { function, args } => {
                        self.call_custom(*function, *args).await?;
                    }
                    GroupCommand::VarAssign { name, value } => self.assign(name, value)?,
                    GroupCommand::DoChoice { choice } => {
                        if self.do_choice(dialog, *choice).await? == GroupFlow::EndDialog {
                            return Ok(GroupFlow::EndDialog);
                        }
                    }
                }
            }
            Ok(GroupFlow::Continue)
        })
    }

    async fn do_choice(&self, dialog: &Dialog, choice: ChoiceId) -> Result<GroupFlow, MpalError> {
        let definition = dialog
            .choice(choice)
            .ok_or(MpalError::Fatal(FatalError::UnknownChoice(choice)))?;

        loop {
            let active = definition
                .selects
                .iter()
                .map(|select| self.precondition_holds(select.when.as_ref()))
                .collect::<Result<Vec<_>, _>>()?;
            if !active.contains(&true) {
                log::debug!("choice {choice} has no active selects");
                return Ok(GroupFlow::Continue);
            }

            // Reset before publishing so a selection made right away is not lost
            self.inner.done_choice.reset();
            {
                let mut state = lock(&self.inner.dialog);
                state.pending = Some(PendingChoice { choice, active });
                state.selected = None;
            }
            self.inner.ask_choice.set();
            log::debug!("choice {choice} waiting for selection");
            self.inner.done_choice.wait(INFINITE).await;

            let index = lock(&self.inner.dialog).selected.take().ok_or_else(|| {
                MpalError::consistency(format!("choice {choice} resumed without a selection"))
            })?;
            let select = &definition.selects[index];

            for group in &select.groups {
                if self.run_group(dialog, *group).await? == GroupFlow::EndDialog {
                    return Ok(GroupFlow::EndDialog);
                }
            }
            if select.ends_dialog {
                return Ok(GroupFlow::EndDialog);
            }
            if select.ends_choice {
                return Ok(GroupFlow::Continue);
            }
        }
    }
}
