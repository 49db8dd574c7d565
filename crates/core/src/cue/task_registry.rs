use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use cuelight_devices::DeviceId;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};

/// Identifies one cancellable unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Deferred start of the step at this index of the running cue.
    StepStart(usize),
    /// The transition currently driving a device. At most one per device.
    Transition(DeviceId),
    /// Fixed-horizon completion deadline of the running cue.
    Completion,
}

struct TaskEntry {
    token: u64,
    abort: AbortHandle,
}

struct RegistryState {
    epoch: u64,
    next_token: u64,
    tasks: HashMap<TaskKey, TaskEntry>,
}

struct Inner {
    state: Mutex<RegistryState>,
    released: Notify,
}

/// Owns every outstanding step start, transition and completion task.
///
/// Spawning under a key that is already taken aborts the previous task. A
/// reset aborts everything and moves to a new epoch; spawns tagged with an
/// older epoch are refused, so work scheduled by a stopped cue cannot
/// re-register itself.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState {
                    epoch: 0,
                    next_token: 0,
                    tasks: HashMap::new(),
                }),
                released: Notify::new(),
            }),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.inner.state.lock().epoch
    }

    /// Spawn `future` under `key`, replacing whatever task held the key.
    ///
    /// Returns `None` without spawning if `epoch` is no longer current. Panics
    /// inside the task are caught and logged.
    pub fn spawn<F>(&self, key: TaskKey, epoch: u64, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return None;
        }

        state.next_token += 1;
        let token = state.next_token;
        let registry = self.clone();

        let handle = tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
                log::error!("Task {:?} panicked: {}", key, panic_message(&*panic));
            }
            registry.release(key, token);
        });

        let displaced = state.tasks.insert(
            key,
            TaskEntry {
                token,
                abort: handle.abort_handle(),
            },
        );
        drop(state);

        if let Some(previous) = displaced {
            log::debug!("Task {:?} superseded", key);
            previous.abort.abort();
        }

        Some(handle)
    }

    /// Abort every registered task and start a new epoch, which is returned.
    pub fn reset(&self) -> u64 {
        let (epoch, drained) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            let drained: Vec<(TaskKey, TaskEntry)> = state.tasks.drain().collect();
            (state.epoch, drained)
        };

        if !drained.is_empty() {
            log::debug!("Cancelling {} outstanding task(s)", drained.len());
        }
        for (_, entry) in drained {
            entry.abort.abort();
        }
        self.inner.released.notify_waiters();

        epoch
    }

    /// Wait until no task other than `except` is registered.
    pub async fn wait_until_drained(&self, except: TaskKey) {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if !self.inner.state.lock().tasks.keys().any(|k| *k != except) {
                return;
            }
            released.await;
        }
    }

    pub fn contains(&self, key: TaskKey) -> bool {
        self.inner.state.lock().tasks.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Devices with a transition currently registered.
    pub fn active_transitions(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self
            .inner
            .state
            .lock()
            .tasks
            .keys()
            .filter_map(|key| match key {
                TaskKey::Transition(device_id) => Some(*device_id),
                _ => None,
            })
            .collect();
        devices.sort_unstable();
        devices
    }

    /// Drop the entry for `key` if it still belongs to the task holding `token`.
    fn release(&self, key: TaskKey, token: u64) {
        let released = {
            let mut state = self.inner.state.lock();
            match state.tasks.get(&key) {
                Some(entry) if entry.token == token => {
                    state.tasks.remove(&key);
                    true
                }
                _ => false,
            }
        };

        if released {
            self.inner.released.notify_waiters();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
