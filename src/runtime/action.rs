//! Action runner - Resolves and executes one item action as a task

use super::Runtime;
use crate::domain::entities::Item;
use crate::domain::errors::MpalError;
use crate::domain::value_objects::ItemId;
use crate::scheduler::{TaskHandle, lock};
use std::collections::HashMap;

/// Which items currently have an action task running
#[derive(Debug, Default)]
pub(crate) struct ActionLedger {
    /// Item of the host-dispatched action in progress
    executing: Option<ItemId>,
    /// Outstanding idle-dispatched tasks per item, across every poller
    idle_running: HashMap<ItemId, usize>,
}

impl ActionLedger {
    pub(crate) fn is_busy(&self, item: ItemId) -> bool {
        self.executing == Some(item) || self.idle_running.contains_key(&item)
    }
}

impl Runtime {
    /// Dispatch the first action of `item` matching `trigger` and `param`
    ///
    /// Only one host-dispatched action runs at a time; a call made while one
    /// is in progress, or while an idle action runs on the same item, is
    /// rejected with [`MpalError::ActionInProgress`].
    pub fn do_action(&self, trigger: u32, item: ItemId, param: u32) -> Result<TaskHandle, MpalError> {
        let source = self.item(item)?;
        if self.item_status(item) <= 0 {
            return Err(MpalError::NotActive { item });
        }

        let mut ledger = lock(&self.inner.action);
        if let Some(busy) = ledger.executing {
            log::warn!("action {trigger} on item {item} rejected: item {busy} is executing");
            return Err(MpalError::ActionInProgress { item: busy });
        }
        if ledger.is_busy(item) {
            log::warn!("action {trigger} on item {item} rejected: idle action running");
            return Err(MpalError::ActionInProgress { item });
        }

        let index = self
            .select_action(source, trigger, param)
            .map_err(|err| self.escalate(err))?
            .ok_or_else(|| {
                MpalError::not_found(format!("action {trigger}/{param} on item {item}"))
            })?;
        let copy = source
            .with_single_action(index)
            .ok_or_else(|| MpalError::consistency(format!("item {item} lost action {index}")))?;
        ledger.executing = Some(item);
        drop(ledger);

        log::debug!("dispatching action {trigger}/{param} on item {item}");
        let handle = self.spawn_action(copy);

        let runtime = self.clone();
        let watched = handle.clone();
        self.scheduler()
            .spawn(format!("action-shepherd:{item}"), async move {
                watched.join().await;
                runtime.finish_action(item);
                Ok(())
            });

        Ok(handle)
    }

    /// Item of the host-dispatched action in progress, if any
    pub fn executing_action(&self) -> Option<ItemId> {
        lock(&self.inner.action).executing
    }

    /// Index of the first action matching `trigger`/`param` whose precondition holds
    fn select_action(&self, item: &Item, trigger: u32, param: u32) -> Result<Option<usize>, MpalError> {
        for (index, action) in item.actions.iter().enumerate() {
            if action.trigger != trigger || action.param != param {
                continue;
            }
            if self.precondition_holds(action.when.as_ref())? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Spawn a task running the single action of `item` in declaration order
    pub(crate) fn spawn_action(&self, item: Item) -> TaskHandle {
        let runtime = self.clone();
        let name = format!("action:{}", item.id);
        self.scheduler().spawn(name, async move {
            let commands = item
                .actions
                .first()
                .map(|action| action.commands.as_slice())
                .unwrap_or_default();
            for command in commands {
                runtime.execute_command(command).await?;
            }
            Ok(())
        })
    }

    fn finish_action(&self, item: ItemId) {
        let mut ledger = lock(&self.inner.action);
        if ledger.executing == Some(item) {
            ledger.executing = None;
        }
        log::debug!("action on item {item} finished");
    }

    /// Record an idle-dispatched task on `item` if nothing else runs there
    pub(crate) fn claim_idle(&self, item: ItemId) -> bool {
        let mut ledger = lock(&self.inner.action);
        if ledger.is_busy(item) {
            return false;
        }
        *ledger.idle_running.entry(item).or_default() += 1;
        true
    }

    pub(crate) fn release_idle(&self, item: ItemId) {
        let mut ledger = lock(&self.inner.action);
        if let Some(count) = ledger.idle_running.get_mut(&item) {
            *count -= 1;
            if *count == 0 {
                ledger.idle_running.remove(&item);
            }
        }
    }
}
