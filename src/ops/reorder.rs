use crate::model::task::{Task, TaskId};

/// Outcome of a reorder request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Nothing changed: unknown id, or the task was dropped onto itself
    None,
    /// The source task moved from index `from` to index `to`
    Moved { from: usize, to: usize },
}

impl Move {
    pub fn happened(self) -> bool {
        matches!(self, Move::Moved { .. })
    }
}

/// Move the task `source` into the position currently held by `target`.
///
/// Both ids are resolved against the full list, so a reorder issued from a
/// filtered view lands in the right place. Tasks between the two positions
/// shift by one slot: this is a single-element move, not a swap.
pub fn reorder(tasks: &mut Vec<Task>, source: TaskId, target: TaskId) -> Move {
    if source == target {
        return Move::None;
    }
    let Some(from) = tasks.iter().position(|t| t.id == source) else {
        return Move::None;
    };
    let Some(to) = tasks.iter().position(|t| t.id == target) else {
        return Move::None;
    };

    let task = tasks.remove(from);
    tasks.insert(to, task);
    Move::Moved { from, to }
}

/// Tracks the task currently being dragged. At most one drag is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DragSession {
    source: Option<TaskId>,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start dragging `id`, replacing any drag already in progress
    pub fn begin(&mut self, id: TaskId) {
        self.source = Some(id);
    }

    pub fn source(&self) -> Option<TaskId> {
        self.source
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Finish the drag over `target`. Returns the `(source, target)` pair to
    /// reorder, or `None` if nothing was being dragged.
    pub fn drop_on(&mut self, target: TaskId) -> Option<(TaskId, TaskId)> {
        self.source.take().map(|source| (source, target))
    }

    /// Abandon the drag (released outside any drop target)
    pub fn cancel(&mut self) {
        self.source = None;
    }
}
