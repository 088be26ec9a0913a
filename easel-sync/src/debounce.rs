//! Per-object debounce table.
//!
//! Each object id owns at most one scheduled write. Scheduling again for the
//! same id replaces the previous task and restarts the window with the new
//! payload, so a burst of edits collapses into one write once the window
//! closes. Cancelling is by id.
//!
//! ```text
//! modify r1 @0ms ──► task#1 due 300ms
//! modify r1 @40ms ─► task#1 replaced, task#2 due 340ms
//! modify r1 @90ms ─► task#2 replaced, task#3 due 390ms
//! due(390ms) ──────► [(r1, payload of task#3)]
//! ```
//!
//! Time is passed in explicitly; the table never reads a clock itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use easel_core::ObjectId;
use tokio::time::Instant;

/// Source of "now" for the sync layer.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock. Follows `tokio::time::pause` in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scheduling sequence number; breaks deadline ties in schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct TaskToken(u64);

#[derive(Debug)]
struct ScheduledTask<T> {
    token: TaskToken,
    deadline: Instant,
    payload: T,
}

#[derive(Debug)]
pub struct DebounceTable<T> {
    window: Duration,
    tasks: HashMap<ObjectId, ScheduledTask<T>>,
    next_token: u64,
    superseded: u64,
}

impl<T> DebounceTable<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            tasks: HashMap::new(),
            next_token: 0,
            superseded: 0,
        }
    }

    /// Schedule `payload` for `id`, replacing any pending task for it.
    pub fn schedule(&mut self, id: ObjectId, payload: T, now: Instant) {
        let token = TaskToken(self.next_token);
        self.next_token += 1;
        let task = ScheduledTask {
            token,
            deadline: now + self.window,
            payload,
        };
        if self.tasks.insert(id, task).is_some() {
            self.superseded += 1;
        }
    }

    /// Cancel and return the pending payload for `id`.
    pub fn cancel(&mut self, id: &str) -> Option<T> {
        self.tasks.remove(id).map(|t| t.payload)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Remove and return every task due at `now`, in deadline order.
    pub fn take_due(&mut self, now: Instant) -> Vec<(ObjectId, T)> {
        let due: Vec<ObjectId> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let mut fired: Vec<(ObjectId, ScheduledTask<T>)> = due
            .into_iter()
            .filter_map(|id| self.tasks.remove(id.as_str()).map(|t| (id, t)))
            .collect();
        fired.sort_by_key(|(_, t)| (t.deadline, t.token));
        fired.into_iter().map(|(id, t)| (id, t.payload)).collect()
    }

    /// Remove and return every task regardless of deadline, oldest first.
    pub fn take_all(&mut self) -> Vec<(ObjectId, T)> {
        let mut all: Vec<(ObjectId, ScheduledTask<T>)> = self.tasks.drain().collect();
        all.sort_by_key(|(_, t)| t.token);
        all.into_iter().map(|(id, t)| (id, t.payload)).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.values().map(|t| t.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// How many scheduled tasks were replaced before firing.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}
