use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::error::FieldErrors;

/// Outcome of a background checkout task, polled by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Running,
    /// Input was rejected; the field errors are redelivered to the poller.
    Rejected { errors: FieldErrors },
    /// The task itself crashed (database down, provider unreachable).
    Failed { message: String },
    Completed { order_id: Uuid },
}

const FINISHED_TTL: Duration = Duration::from_secs(3600);
const PRUNE_THRESHOLD: usize = 256;

struct TaskEntry {
    state: TaskState,
    finished_at: Option<Instant>,
}

/// In-process registry of checkout tasks keyed by task id. Finished entries
/// are pruned once they are old enough for every reasonable poller to have
/// seen them, so the map cannot grow without bound.
#[derive(Default)]
pub struct TaskRegistry {
    inner: Mutex<HashMap<Uuid, TaskEntry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Uuid {
        let task_id = Uuid::new_v4();
        let mut map = self.lock();
        if map.len() > PRUNE_THRESHOLD {
            map.retain(|_, entry| {
                entry
                    .finished_at
                    .is_none_or(|at| at.elapsed() < FINISHED_TTL)
            });
        }
        map.insert(
            task_id,
            TaskEntry {
                state: TaskState::Running,
                finished_at: None,
            },
        );
        task_id
    }

    pub fn finish(&self, task_id: Uuid, state: TaskState) {
        let mut map = self.lock();
        map.insert(
            task_id,
            TaskEntry {
                state,
                finished_at: Some(Instant::now()),
            },
        );
    }

    pub fn get(&self, task_id: Uuid) -> Option<TaskState> {
        self.lock().get(&task_id).map(|entry| entry.state.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskEntry>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Per-user checkout mutual exclusion. Unlike a blocking keyed lock, the
/// second caller is turned away immediately: a double-submitted checkout
/// must not queue behind the first and run the stock check twice.
#[derive(Default)]
pub struct CheckoutLocks {
    held: Mutex<std::collections::HashSet<Uuid>>,
}

impl CheckoutLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard while no checkout is in flight for `user_id`,
    /// `None` otherwise. The slot frees itself when the guard drops,
    /// including on panic and task-failure paths.
    pub fn try_acquire(self: Arc<Self>, user_id: Uuid) -> Option<CheckoutGuard> {
        let mut held = self.lock();
        if !held.insert(user_id) {
            return None;
        }
        drop(held);
        Some(CheckoutGuard {
            locks: self,
            user_id,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, std::collections::HashSet<Uuid>> {
        self.held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

pub struct CheckoutGuard {
    locks: Arc<CheckoutLocks>,
    user_id: Uuid,
}

impl Drop for CheckoutGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.user_id);
    }
}
