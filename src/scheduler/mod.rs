//! Cooperative task scheduler
//!
//! Tasks are tokio tasks. A task only gives up control at an explicit
//! suspension point: [`sleep`], [`Event::wait`], [`TaskHandle::wait`],
//! [`wait_all`] or [`wait_any`]. Shared state guarded by the runtime's
//! mutexes is never held across one of those points.
//!
//! Killing a task never touches the tasks it spawned; callers that need
//! recursive teardown track their children themselves.

use crate::config::FatalPolicy;
use crate::domain::errors::MpalError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::{AbortHandle, JoinSet};


/// Timeout value meaning "wait forever"
pub const INFINITE: Option<Duration> = None;

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Sleeping,
    WaitingOnEvent,
    WaitingOnTask,
    Finished,
    Killed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Killed)
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

struct TaskShared {
    id: TaskId,
    name: String,
    state: watch::Sender<TaskState>,
    /// Flips once the body has been dropped, after completion or abort
    exited: watch::Sender<bool>,
    abort: OnceLock<AbortHandle>,
}

impl TaskShared {
    /// Move to `next` unless the task already ended
    fn transition(&self, next: TaskState) -> TaskState {
        let mut previous = next;
        self.state.send_if_modified(|state| {
            previous = *state;
            if state.is_terminal() || *state == next {
                return false;
            }
            *state = next;
            true
        });
        previous
    }
}

tokio::task_local! {
    static CURRENT_TASK: Arc<TaskShared>;
}

/// Id of the scheduler task the caller is running in, if any
pub fn current() -> Option<TaskId> {
    CURRENT_TASK.try_with(|task| task.id).ok()
}

/// Marks the current task as suspended for the guard's lifetime
struct SuspendGuard {
    task: Option<Arc<TaskShared>>,
    previous: TaskState,
}

impl SuspendGuard {
    fn enter(state: TaskState) -> Self {
        match CURRENT_TASK.try_with(Arc::clone) {
            Ok(task) => {
                let previous = task.transition(state);
                Self {
                    task: Some(task),
                    previous,
                }
            }
            Err(_) => Self {
                task: None,
                previous: TaskState::Runnable,
            },
        }
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.transition(self.previous);
        }
    }
}

/// Marks the task finished however its body ends, including by panic
struct FinishGuard(Arc<TaskShared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.transition(TaskState::Finished);
        self.0.exited.send_replace(true);
    }
}

/// Cloneable reference to a spawned task
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> TaskState {
        *self.shared.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Forcibly terminate the task
    ///
    /// The state reads `Killed` at once, but a body running on another worker
    /// only stops at its next suspension point; use [`TaskHandle::reaped`] to
    /// wait for that. Tasks it spawned keep running.
    pub fn kill(&self) {
        if self.shared.transition(TaskState::Killed).is_terminal() {
            return;
        }
        log::debug!("killing task {} ({})", self.shared.id, self.shared.name);
        if let Some(abort) = self.shared.abort.get() {
            abort.abort();
        }
    }

    /// Wait until the task body has been dropped
    pub async fn reaped(&self) {
        let mut rx = self.shared.exited.subscribe();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Wait until the task has finished or been killed
    pub async fn join(&self) {
        self.wait(INFINITE).await;
    }

    /// Wait for the task to end; returns at once if it already has
    pub async fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let mut rx = self.shared.state.subscribe();
        if rx.borrow().is_terminal() {
            return WaitOutcome::Signaled;
        }
        let _suspended = SuspendGuard::enter(TaskState::WaitingOnTask);
        with_timeout(timeout, async move {
            // The sender lives in `shared`, which this handle keeps alive
            let _ = rx.wait_for(|state| state.is_terminal()).await;
        })
        .await
    }
}

struct SchedulerInner {
    next_id: AtomicU64,
    policy: FatalPolicy,
    fatal: Mutex<Option<MpalError>>,
}

/// Spawns tasks and applies the fatal error policy to their results
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(policy: FatalPolicy) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                next_id: AtomicU64::new(1),
                policy,
                fatal: Mutex::new(None),
            }),
        }
    }

    /// Spawn `body` as a new task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> TaskHandle
    where
        F: Future<Output = Result<(), MpalError>> + Send + 'static,
    {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (state, _) = watch::channel(TaskState::Runnable);
        let shared = Arc::new(TaskShared {
            id,
            name: name.into(),
            state,
            exited: watch::channel(false).0,
            abort: OnceLock::new(),
        });

        let scheduler = self.clone();
        let finish = FinishGuard(Arc::clone(&shared));
        let scoped = CURRENT_TASK.scope(Arc::clone(&shared), body);
        log::debug!("spawning task {id} ({})", shared.name);

        let join = tokio::spawn(async move {
            let finish = finish;
            if let Err(err) = scoped.await {
                scheduler.report(&finish.0, err);
            }
        });
        // `set` only fails if already set, which cannot happen for a fresh task
        let _ = shared.abort.set(join.abort_handle());

        TaskHandle { shared }
    }

    /// First fatal error seen under [`FatalPolicy::Record`]
    pub fn fatal_error(&self) -> Option<MpalError> {
        lock(&self.inner.fatal).clone()
    }

    fn report(&self, task: &TaskShared, err: MpalError) {
        if !err.is_fatal() {
            log::warn!("task {} ({}) ended with: {err}", task.id, task.name);
            return;
        }

        self.report_fatal(&format!("task {} ({})", task.id, task.name), err);
    }

    /// Apply the fatal policy to `err`, raised in `context`
    pub(crate) fn report_fatal(&self, context: &str, err: MpalError) {
        log::error!("{context} failed: {err}");
        match self.inner.policy {
            FatalPolicy::Abort => std::process::abort(),
            FatalPolicy::Record => {
                lock(&self.inner.fatal).get_or_insert(err);
            }
        }
    }
}

/// Suspend the calling task for `duration`
pub async fn sleep(duration: Duration) {
    let _suspended = SuspendGuard::enter(TaskState::Sleeping);
    tokio::time::sleep(duration).await;
}

/// Suspend the calling task until `deadline`
pub async fn sleep_until(deadline: tokio::time::Instant) {
    let _suspended = SuspendGuard::enter(TaskState::Sleeping);
    tokio::time::sleep_until(deadline).await;
}

/// Wait until every task in `handles` has ended
pub async fn wait_all(handles: &[TaskHandle], timeout: Option<Duration>) -> WaitOutcome {
    if handles.iter().all(TaskHandle::is_finished) {
        return WaitOutcome::Signaled;
    }
    let _suspended = SuspendGuard::enter(TaskState::WaitingOnTask);
    let handles = handles.to_vec();
    with_timeout(timeout, async move {
        for handle in &handles {
            handle.join().await;
        }
    })
    .await
}

/// Wait until any task in `handles` has ended, returning its index
///
/// `None` means the timeout elapsed, or `handles` was empty.
pub async fn wait_any(handles: &[TaskHandle], timeout: Option<Duration>) -> Option<usize> {
    if let Some(index) = handles.iter().position(TaskHandle::is_finished) {
        return Some(index);
    }
    if handles.is_empty() {
        return None;
    }

    let _suspended = SuspendGuard::enter(TaskState::WaitingOnTask);
    let mut watchers = JoinSet::new();
    for (index, handle) in handles.iter().cloned().enumerate() {
        watchers.spawn(async move {
            handle.join().await;
            index
        });
    }

    let first = async { watchers.join_next().await.and_then(Result::ok) };
    match timeout {
        None => first.await,
        Some(duration) => tokio::time::timeout(duration, first).await.ok().flatten(),
    }
}

async fn with_timeout<F>(timeout: Option<Duration>, fut: F) -> WaitOutcome
where
    F: Future<Output = ()>,
{
    match timeout {
        None => {
            fut.await;
            WaitOutcome::Signaled
        }
        Some(duration) => match tokio::time::timeout(duration, fut).await {
            Ok(()) => WaitOutcome::Signaled,
            Err(_) => WaitOutcome::TimedOut,
        },
    }
}

struct EventInner {
    signaled: Mutex<bool>,
    notify: Notify,
}

/// Manual-reset binary event
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("set", &self.is_set()).finish()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Event {
    pub fn new(initially_set: bool) -> Self {
        Self {
            inner: Arc::new(EventInner {
                signaled: Mutex::new(initially_set),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal the event and wake every waiter; stays signaled until reset
    pub fn set(&self) {
        *lock(&self.inner.signaled) = true;
        self.inner.notify.notify_waiters();
    }

    pub fn reset(&self) {
        *lock(&self.inner.signaled) = false;
    }

    /// Wake the current waiters and leave the event unsignaled
    pub fn pulse(&self) {
        *lock(&self.inner.signaled) = false;
        self.inner.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.inner.signaled)
    }

    pub async fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent set/pulse is not lost
        notified.as_mut().enable();
        if self.is_set() {
            return WaitOutcome::Signaled;
        }
        let _suspended = SuspendGuard::enter(TaskState::WaitingOnEvent);
        with_timeout(timeout, notified).await
    }
}
