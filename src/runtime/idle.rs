//! Idle-action poller - Background, probability-driven item actions
//!
//! Each polled location gets a long-lived task. It snapshots the idle actions
//! of the items present when polling starts and fires each one at its
//! deadline with the action's percent chance, skipping items that already
//! have an action running. Slots in a fixed-size table bound how many
//! locations can be polled at once.

use super::Runtime;
use crate::domain::entities::{Action, Item};
use crate::domain::errors::MpalError;
use crate::domain::value_objects::{ItemId, LocationId};
use crate::scheduler::{self, Event, TaskHandle, WaitOutcome, lock};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Fixed-capacity table of polled locations
pub(crate) struct IdleSlots {
    slots: Vec<Option<PollSlot>>,
}

struct PollSlot {
    location: LocationId,
    cancel: Event,
    /// Held by the poller while dispatching and by `stop` while cancelling
    gate: Arc<Mutex<()>>,
    task: TaskHandle,
    stopping: bool,
}

impl IdleSlots {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    fn find(&mut self, location: LocationId) -> Option<&mut PollSlot> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|slot| slot.location == location)
    }

    fn release(&mut self, location: LocationId) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|slot| slot.location == location) {
                *slot = None;
            }
        }
    }
}

/// Private copy of one idle action, owned by its poller
struct IdleEntry {
    item: ItemId,
    action: Action,
    interval: Duration,
    percent: u8,
    next_due: Instant,
}

impl Runtime {
    /// Start polling the idle actions of `location`
    pub fn start_idle_poll(&self, location: LocationId) -> Result<(), MpalError> {
        let mut slots = lock(&self.inner.idle);
        if slots.find(location).is_some() {
            return Err(MpalError::AlreadyPolling { location });
        }
        let capacity = slots.slots.len();
        let free = slots
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(MpalError::LimitExceeded { capacity })?;

        let cancel = Event::new(false);
        let gate = Arc::new(Mutex::new(()));
        let runtime = self.clone();
        let task = self.scheduler().spawn(format!("idle-poll:{location}"), {
            let cancel = cancel.clone();
            let gate = Arc::clone(&gate);
            async move { runtime.poll_location(location, cancel, gate).await }
        });

        slots.slots[free] = Some(PollSlot {
            location,
            cancel,
            gate,
            task,
            stopping: false,
        });
        log::info!("idle polling started for location {location}");
        Ok(())
    }

    /// Stop polling `location`, waiting for its shutdown to complete
    ///
    /// No idle action of the location is dispatched once this is called, and
    /// every idle action it dispatched has finished or been killed when it
    /// returns.
    pub async fn stop_idle_poll(&self, location: LocationId) -> Result<(), MpalError> {
        let (cancel, gate, task) = {
            let mut slots = lock(&self.inner.idle);
            let slot = slots
                .find(location)
                .filter(|slot| !slot.stopping)
                .ok_or(MpalError::NotPolling { location })?;
            slot.stopping = true;
            (slot.cancel.clone(), Arc::clone(&slot.gate), slot.task.clone())
        };

        {
            let _gate = lock(&gate);
            cancel.set();
        }
        task.join().await;

        lock(&self.inner.idle).release(location);
        log::info!("idle polling stopped for location {location}");
        Ok(())
    }

    pub fn is_polling(&self, location: LocationId) -> bool {
        lock(&self.inner.idle).find(location).is_some()
    }

    /// Whether idle animations may run at normal pace
    ///
    /// Turned off while any poller is tearing down.
    pub fn idle_fast_forward(&self) -> bool {
        self.inner.idle_teardowns.load(Ordering::SeqCst) == 0
    }

    async fn poll_location(
        &self,
        location: LocationId,
        cancel: Event,
        gate: Arc<Mutex<()>>,
    ) -> Result<(), MpalError> {
        let mut entries = self.collect_idle_entries(location);
        if entries.is_empty() {
            log::debug!("location {location} has no idle actions");
            return Ok(());
        }

        let mut running: HashMap<ItemId, TaskHandle> = HashMap::new();
        let result = self
            .poll_loop(&mut entries, &mut running, &cancel, &gate)
            .await;
        self.tear_down(location, running).await;
        result
    }

    fn collect_idle_entries(&self, location: LocationId) -> Vec<IdleEntry> {
        let start = Instant::now();
        let min_interval = self.config().min_idle_interval();
        self.items_in_location(location)
            .into_iter()
            .filter_map(|id| self.tables().item(id))
            .filter(|item| item.has_idle_actions())
            .flat_map(|item| {
                item.actions.iter().filter_map(move |action| {
                    let idle = action.idle?;
                    Some(IdleEntry {
                        item: item.id,
                        action: action.clone(),
                        interval: Duration::from_millis(idle.time_ms).max(min_interval),
                        percent: idle.percent,
                        next_due: start,
                    })
                })
            })
            .collect()
    }

    async fn poll_loop(
        &self,
        entries: &mut [IdleEntry],
        running: &mut HashMap<ItemId, TaskHandle>,
        cancel: &Event,
        gate: &Mutex<()>,
    ) -> Result<(), MpalError> {
        loop {
            let next_due = entries
                .iter()
                .map(|entry| entry.next_due)
                .min()
                .unwrap_or_else(Instant::now);
            let timeout = next_due.saturating_duration_since(Instant::now());
            if cancel.wait(Some(timeout)).await == WaitOutcome::Signaled {
                return Ok(());
            }
            if !self.fire_due(entries, running, cancel, gate)? {
                return Ok(());
            }
        }
    }

    /// Fire every entry whose deadline passed; `false` once cancelled
    fn fire_due(
        &self,
        entries: &mut [IdleEntry],
        running: &mut HashMap<ItemId, TaskHandle>,
        cancel: &Event,
        gate: &Mutex<()>,
    ) -> Result<bool, MpalError> {
        running.retain(|_, task| !task.is_finished());
        let now = Instant::now();
        let _gate = lock(gate);
        if cancel.is_set() {
            return Ok(false);
        }

        for entry in entries.iter_mut() {
            if entry.next_due > now {
                continue;
            }
            entry.next_due += entry.interval;

            if self.draw_percent() >= entry.percent {
                continue;
            }
            if running.contains_key(&entry.item) {
                continue;
            }
            if let Some(task) = self.dispatch_idle(entry)? {
                running.insert(entry.item, task);
            }
        }
        Ok(true)
    }

    /// Run `entry` through the action runner if its item is active and free and its precondition holds
    fn dispatch_idle(&self, entry: &IdleEntry) -> Result<Option<TaskHandle>, MpalError> {
        if self.item_status(entry.item) <= 0 {
            return Ok(None);
        }
        if lock(&self.inner.action).is_busy(entry.item) {
            return Ok(None);
        }
        if !self.precondition_holds(entry.action.when.as_ref())? {
            return Ok(None);
        }
        if !self.claim_idle(entry.item) {
            return Ok(None);
        }

        log::debug!("idle action {} fires on item {}", entry.action.trigger, entry.item);
        let copy = Item::new(entry.item, vec![entry.action.clone()]);
        let task = self.spawn_action(copy);

        let runtime = self.clone();
        let watched = task.clone();
        let item = entry.item;
        self.scheduler()
            .spawn(format!("idle-shepherd:{item}"), async move {
                watched.reaped().await;
                runtime.release_idle(item);
                Ok(())
            });

        Ok(Some(task))
    }

    async fn tear_down(&self, location: LocationId, running: HashMap<ItemId, TaskHandle>) {
        self.inner.idle_teardowns.fetch_add(1, Ordering::SeqCst);

        let tasks: Vec<TaskHandle> = running.into_values().collect();
        let timeout = self.config().idle_shutdown_timeout();
        if scheduler::wait_all(&tasks, Some(timeout)).await == WaitOutcome::TimedOut {
            for task in tasks.iter().filter(|task| !task.is_finished()) {
                log::warn!("killing idle task {} of location {location}", task.id());
                task.kill();
            }
        }
        for task in &tasks {
            task.reaped().await;
        }

        self.inner.idle_teardowns.fetch_sub(1, Ordering::SeqCst);
    }
}
