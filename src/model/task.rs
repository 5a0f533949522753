use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable handle for a task. Assigned once at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| format!("invalid task id '{}' (expected a number)", s))
    }
}

/// A single todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Task text, trimmed. Never edited after creation.
    pub text: String,
    pub completed: bool,
}

impl Task {
    /// Create a new, not yet completed task
    pub fn new(id: TaskId, text: impl Into<String>) -> Self {
        Task {
            id,
            text: text.into(),
            completed: false,
        }
    }

    /// Is this task still open?
    pub fn is_active(&self) -> bool {
        !self.completed
    }
}

/// Hands out fresh task ids.
///
/// Ids are millisecond timestamps, bumped past the last id handed out and past
/// anything already present in the list, so two tasks created within the same
/// millisecond still get distinct, increasing ids.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    last: u64,
    clock: fn() -> u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::with_clock(now_millis)
    }

    /// Allocator driven by a custom clock (tests use a frozen one)
    pub fn with_clock(clock: fn() -> u64) -> Self {
        IdAllocator { last: 0, clock }
    }

    /// Make sure every future id is greater than `id`
    pub fn observe(&mut self, id: TaskId) {
        self.last = self.last.max(id.0);
    }

    /// Next id above everything handed out or observed so far. `None` once
    /// that range is used up, i.e. after `u64::MAX` was observed.
    pub fn next_id(&mut self) -> Option<TaskId> {
        let floor = self.last.checked_add(1)?;
        let candidate = (self.clock)().max(floor);
        self.last = candidate;
        Some(TaskId(candidate))
    }

    /// Like [`IdAllocator::next_id`], falling back to the smallest id for
    /// which `in_use` is false once the range above is used up.
    pub fn next_free(&mut self, in_use: impl Fn(TaskId) -> bool) -> TaskId {
        if let Some(id) = self.next_id() {
            return id;
        }
        (1..=u64::MAX)
            .map(TaskId)
            .find(|id| !in_use(*id))
            .unwrap_or(TaskId(0))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
