use crate::io::store::{SlotStore, StorageError};
use crate::io::todo_io::{self, CorruptDataError, LoadError};
use crate::model::filter::FilterMode;
use crate::model::task::{IdAllocator, Task, TaskId};
use crate::ops::filter;
use crate::ops::reorder::{self, DragSession, Move};

/// Rejected user input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("task text must not be empty")]
    EmptyText,
}

/// Error type for list operations
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The in-memory change was applied but could not be saved; it may not
    /// survive a restart.
    #[error("change not saved: {0}")]
    Storage(#[from] StorageError),
}

/// What a mutation did, delivered to every listener after the save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    Added(TaskId),
    Toggled { id: TaskId, completed: bool },
    Removed(TaskId),
    ClearedCompleted { removed: usize },
    Reordered { id: TaskId, from: usize, to: usize },
}

/// Handle returned by [`TodoList::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ListChange)>;

/// The task list and everything that may change it.
///
/// Each successful mutation writes the whole list to the store exactly once
/// and then notifies listeners exactly once. Unknown ids are silently
/// ignored by `toggle`, `remove` and `reorder`.
pub struct TodoList<S: SlotStore> {
    store: S,
    tasks: Vec<Task>,
    ids: IdAllocator,
    drag: DragSession,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    recovered: Option<CorruptDataError>,
}

impl<S: SlotStore> TodoList<S> {
    /// Load the list from `store`.
    ///
    /// - Never saved: start from `seed` (blank entries skipped) and save it
    ///   right away, so the seed is only ever used once.
    /// - Unreadable: hand the raw contents to the store for safekeeping, warn
    ///   on stderr and start empty. The bad slot is overwritten by the next
    ///   mutation. [`TodoList::recovered_from`] reports what happened.
    /// - Ids reassigned during load: save right away so they stay stable.
    pub fn open(store: S, seed: &[String]) -> Result<Self, StorageError> {
        Self::open_with_ids(store, seed, IdAllocator::new())
    }

    /// Like [`TodoList::open`], with a caller-supplied id source
    pub fn open_with_ids(store: S, seed: &[String], ids: IdAllocator) -> Result<Self, StorageError> {
        let mut list = TodoList {
            store,
            tasks: Vec::new(),
            ids,
            drag: DragSession::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            recovered: None,
        };

        match todo_io::load_tasks(&list.store) {
            Ok(Some(loaded)) => {
                list.tasks = loaded.tasks;
                for task in &list.tasks {
                    list.ids.observe(task.id);
                }
                if loaded.repaired {
                    todo_io::save_tasks(&mut list.store, &list.tasks)?;
                }
            }
            Ok(None) => {
                for text in seed {
                    let text = text.trim();
                    if !text.is_empty() {
                        let id = list.ids.next_free(|id| list.tasks.iter().any(|t| t.id == id));
                        list.tasks.push(Task::new(id, text));
                    }
                }
                todo_io::save_tasks(&mut list.store, &list.tasks)?;
            }
            Err(LoadError::Corrupt(e)) => {
                list.store.preserve_unreadable(&e.slot, &e.raw, &e.reason);
                eprintln!(
                    "warning: {}; starting with an empty list (original contents preserved)",
                    e
                );
                list.recovered = Some(e);
            }
            Err(LoadError::Storage(e)) => return Err(e),
        }

        Ok(list)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The full list, in order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count_active(&self) -> usize {
        filter::count_active(&self.tasks)
    }

    /// The tasks shown under `mode`, in list order
    pub fn visible(&self, mode: FilterMode) -> Vec<&Task> {
        filter::project(&self.tasks, mode)
    }

    /// The load problem that forced an empty start, if any
    pub fn recovered_from(&self) -> Option<&CorruptDataError> {
        self.recovered.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Append a new incomplete task. Blank text is rejected with no change.
    pub fn add(&mut self, text: &str) -> Result<TaskId, TodoError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        let tasks = &self.tasks;
        let id = self.ids.next_free(|id| tasks.iter().any(|t| t.id == id));
        self.tasks.push(Task::new(id, text));
        self.commit(ListChange::Added(id))?;
        Ok(id)
    }

    /// Flip a task's completion. Returns `false` if `id` is unknown.
    pub fn toggle(&mut self, id: TaskId) -> Result<bool, TodoError> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        task.completed = !task.completed;
        let completed = task.completed;
        self.commit(ListChange::Toggled { id, completed })?;
        Ok(true)
    }

    /// Delete a task. Returns `false` if `id` is unknown.
    pub fn remove(&mut self, id: TaskId) -> Result<bool, TodoError> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            return Ok(false);
        };
        self.tasks.remove(idx);
        self.commit(ListChange::Removed(id))?;
        Ok(true)
    }

    /// Delete every completed task, keeping the order of the rest. Always
    /// saves, even when nothing was completed. Returns how many were removed.
    pub fn clear_completed(&mut self) -> Result<usize, TodoError> {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed);
        let removed = before - self.tasks.len();
        self.commit(ListChange::ClearedCompleted { removed })?;
        Ok(removed)
    }

    /// Move `source` into `target`'s position. Saves and notifies only if
    /// something moved.
    pub fn reorder(&mut self, source: TaskId, target: TaskId) -> Result<Move, TodoError> {
        let moved = reorder::reorder(&mut self.tasks, source, target);
        if let Move::Moved { from, to } = moved {
            self.commit(ListChange::Reordered { id: source, from, to })?;
        }
        Ok(moved)
    }

    // -----------------------------------------------------------------------
    // Drag and drop
    // -----------------------------------------------------------------------

    /// Start dragging `id`. Replaces any drag already in progress.
    pub fn begin_drag(&mut self, id: TaskId) {
        self.drag.begin(id);
    }

    pub fn dragging(&self) -> Option<TaskId> {
        self.drag.source()
    }

    /// Drop the dragged task onto `target`, ending the drag
    pub fn drop_on(&mut self, target: TaskId) -> Result<Move, TodoError> {
        match self.drag.drop_on(target) {
            Some((source, target)) => self.reorder(source, target),
            None => Ok(Move::None),
        }
    }

    /// End a drag without moving anything
    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    // -----------------------------------------------------------------------
    // Change notification
    // -----------------------------------------------------------------------

    /// Register a listener called after every change to the list
    pub fn subscribe(&mut self, listener: impl FnMut(&ListChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    /// Save, then notify. Listeners hear about the change even when the save
    /// failed, since the in-memory list did change.
    fn commit(&mut self, change: ListChange) -> Result<(), StorageError> {
        let saved = todo_io::save_tasks(&mut self.store, &self.tasks);
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::MemoryStore;
    use crate::io::todo_io::{TODOS_SLOT, load_tasks};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn frozen() -> u64 {
        1_000
    }

    fn empty_list() -> TodoList<MemoryStore> {
        TodoList::open_with_ids(MemoryStore::new(), &[], IdAllocator::with_clock(frozen)).unwrap()
    }

    fn list_with(texts: &[&str]) -> (TodoList<MemoryStore>, Vec<TaskId>) {
        let mut list = empty_list();
        let ids = texts.iter().map(|t| list.add(t).unwrap()).collect();
        (list, ids)
    }

    fn texts(list: &TodoList<MemoryStore>) -> Vec<String> {
        list.tasks().iter().map(|t| t.text.clone()).collect()
    }

    fn stored(list: &TodoList<MemoryStore>) -> Vec<Task> {
        load_tasks(list.store()).unwrap().unwrap().tasks
    }

    fn record_changes(list: &mut TodoList<MemoryStore>) -> Rc<RefCell<Vec<ListChange>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        list.subscribe(move |c| sink.borrow_mut().push(c.clone()));
        seen
    }

    // --- add ---

    #[test]
    fn add_appends_incomplete_task() {
        let (mut list, _) = list_with(&["A", "B"]);
        let id = list.add("  Walk the dog  ").unwrap();

        assert_eq!(list.len(), 3);
        let task = list.get(id).unwrap();
        assert_eq!(task.text, "Walk the dog");
        assert!(!task.completed);
        assert_eq!(list.tasks().last().unwrap().id, id);
    }

    #[test]
    fn add_blank_is_rejected_without_side_effects() {
        let (mut list, _) = list_with(&["A"]);
        let changes = record_changes(&mut list);
        let writes = list.store().writes();

        for blank in ["", "   ", "\t\n"] {
            let err = list.add(blank).unwrap_err();
            assert!(matches!(err, TodoError::Validation(ValidationError::EmptyText)));
        }
        assert_eq!(list.len(), 1);
        assert_eq!(list.store().writes(), writes);
        assert!(changes.borrow().is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let (list, ids) = list_with(&["a", "b", "c", "d"]);
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
        assert_eq!(list.len(), 4);
    }

    // --- toggle / remove ---

    #[test]
    fn toggle_twice_restores_state() {
        let (mut list, ids) = list_with(&["A"]);
        assert!(list.toggle(ids[0]).unwrap());
        assert!(list.get(ids[0]).unwrap().completed);
        assert!(list.toggle(ids[0]).unwrap());
        assert!(!list.get(ids[0]).unwrap().completed);
    }

    #[test]
    fn unknown_id_is_a_silent_noop() {
        let (mut list, _) = list_with(&["A"]);
        let changes = record_changes(&mut list);
        let writes = list.store().writes();

        assert!(!list.toggle(TaskId(424242)).unwrap());
        assert!(!list.remove(TaskId(424242)).unwrap());
        assert_eq!(list.store().writes(), writes);
        assert!(changes.borrow().is_empty());
    }

    #[test]
    fn removed_task_cannot_be_touched_again() {
        let (mut list, ids) = list_with(&["A", "B"]);
        assert!(list.remove(ids[0]).unwrap());
        assert!(!list.toggle(ids[0]).unwrap());
        assert!(!list.remove(ids[0]).unwrap());
        assert_eq!(texts(&list), vec!["B"]);
    }

    // --- clear completed / count ---

    #[test]
    fn clear_completed_keeps_remaining_order() {
        let (mut list, ids) = list_with(&["A", "B", "C", "D"]);
        list.toggle(ids[0]).unwrap();
        list.toggle(ids[2]).unwrap();

        assert_eq!(list.clear_completed().unwrap(), 2);
        assert_eq!(texts(&list), vec!["B", "D"]);
    }

    #[test]
    fn clear_completed_with_nothing_completed_still_saves() {
        let (mut list, _) = list_with(&["A"]);
        let changes = record_changes(&mut list);
        let writes = list.store().writes();

        assert_eq!(list.clear_completed().unwrap(), 0);
        assert_eq!(list.store().writes(), writes + 1);
        assert_eq!(
            *changes.borrow(),
            vec![ListChange::ClearedCompleted { removed: 0 }]
        );
    }

    #[test]
    fn count_active_ignores_completed() {
        let (mut list, ids) = list_with(&["A", "B", "C"]);
        assert_eq!(list.count_active(), 3);
        list.toggle(ids[1]).unwrap();
        assert_eq!(list.count_active(), 2);
    }

    // --- reorder ---

    #[test]
    fn reorder_moves_into_target_slot() {
        let (mut list, ids) = list_with(&["A", "B", "C", "D"]);
        let m = list.reorder(ids[0], ids[2]).unwrap();
        assert!(m.happened());
        assert_eq!(texts(&list), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn reorder_noops_do_not_save() {
        let (mut list, ids) = list_with(&["A", "B", "C", "D"]);
        let changes = record_changes(&mut list);
        let writes = list.store().writes();

        assert_eq!(list.reorder(ids[1], ids[1]).unwrap(), Move::None);
        assert_eq!(list.reorder(TaskId(7), ids[2]).unwrap(), Move::None);
        assert_eq!(texts(&list), vec!["A", "B", "C", "D"]);
        assert_eq!(list.store().writes(), writes);
        assert!(changes.borrow().is_empty());
    }

    #[test]
    fn reorder_under_filter_uses_full_list() {
        let (mut list, ids) = list_with(&["A", "B", "C", "D"]);
        list.toggle(ids[1]).unwrap();

        // Active view shows A, C, D. Dragging D onto A in that view must act on
        // the full list by id.
        let active: Vec<TaskId> = list.visible(FilterMode::Active).iter().map(|t| t.id).collect();
        assert_eq!(active, vec![ids[0], ids[2], ids[3]]);
        list.reorder(ids[3], ids[0]).unwrap();

        assert_eq!(texts(&list), vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn drag_and_drop_reorders() {
        let (mut list, ids) = list_with(&["A", "B", "C"]);
        list.begin_drag(ids[0]);
        list.begin_drag(ids[2]);
        assert_eq!(list.dragging(), Some(ids[2]));

        list.drop_on(ids[0]).unwrap();
        assert_eq!(texts(&list), vec!["C", "A", "B"]);
        assert_eq!(list.dragging(), None);
    }

    #[test]
    fn cancelled_drag_changes_nothing() {
        let (mut list, ids) = list_with(&["A", "B"]);
        let writes = list.store().writes();
        list.begin_drag(ids[0]);
        list.cancel_drag();
        assert_eq!(list.drop_on(ids[1]).unwrap(), Move::None);
        assert_eq!(texts(&list), vec!["A", "B"]);
        assert_eq!(list.store().writes(), writes);
    }

    // --- persistence ---

    #[test]
    fn store_matches_memory_after_every_mutation() {
        let mut list = empty_list();
        let a = list.add("A").unwrap();
        assert_eq!(stored(&list), list.tasks());
        let b = list.add("B").unwrap();
        let c = list.add("C").unwrap();
        assert_eq!(stored(&list), list.tasks());
        list.toggle(b).unwrap();
        assert_eq!(stored(&list), list.tasks());
        list.reorder(c, a).unwrap();
        assert_eq!(stored(&list), list.tasks());
        list.remove(a).unwrap();
        assert_eq!(stored(&list), list.tasks());
        list.clear_completed().unwrap();
        assert_eq!(stored(&list), list.tasks());
        assert_eq!(texts(&list), vec!["C"]);
    }

    #[test]
    fn each_mutation_saves_once_then_notifies_once() {
        let mut list = empty_list();
        let changes = record_changes(&mut list);
        let start = list.store().writes();

        let a = list.add("A").unwrap();
        let b = list.add("B").unwrap();
        list.toggle(a).unwrap();
        list.reorder(b, a).unwrap();
        list.remove(a).unwrap();

        assert_eq!(list.store().writes(), start + 5);
        assert_eq!(
            *changes.borrow(),
            vec![
                ListChange::Added(a),
                ListChange::Added(b),
                ListChange::Toggled { id: a, completed: true },
                ListChange::Reordered { id: b, from: 1, to: 0 },
                ListChange::Removed(a),
            ]
        );
    }

    #[test]
    fn unsubscribed_listener_stops_hearing() {
        let mut list = empty_list();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let sub = list.subscribe(move |_| *sink.borrow_mut() += 1);

        list.add("A").unwrap();
        assert!(list.unsubscribe(sub));
        assert!(!list.unsubscribe(sub));
        list.add("B").unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn storage_failure_is_reported_but_change_kept() {
        let mut store = MemoryStore::new();
        let mut list =
            TodoList::open_with_ids(&mut store, &[], IdAllocator::with_clock(frozen)).unwrap();
        list.add("A").unwrap();
        drop(list);

        store.set_fail_writes(true);
        let mut list =
            TodoList::open_with_ids(&mut store, &[], IdAllocator::with_clock(frozen)).unwrap();
        let heard = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&heard);
        list.subscribe(move |_| *sink.borrow_mut() += 1);

        let err = list.add("B").unwrap_err();
        assert!(matches!(
            err,
            TodoError::Storage(StorageError::Unavailable { .. })
        ));
        assert_eq!(list.len(), 2);
        assert_eq!(*heard.borrow(), 1);
        drop(list);

        // Only the first task made it to the store
        let loaded = load_tasks(&store).unwrap().unwrap();
        assert_eq!(loaded.tasks.len(), 1);
    }

    #[test]
    fn quota_exceeded_surfaces_as_storage_error() {
        let mut list =
            TodoList::open_with_ids(MemoryStore::with_quota(64), &[], IdAllocator::with_clock(frozen))
                .unwrap();
        list.add("short").unwrap();
        let err = list.add(&"x".repeat(100)).unwrap_err();
        assert!(matches!(
            err,
            TodoError::Storage(StorageError::QuotaExceeded { .. })
        ));
    }

    // --- open ---

    #[test]
    fn open_seeds_once_and_saves() {
        let seed = vec![
            "Complete online JavaScript course".to_string(),
            "  ".to_string(),
            "Jog around the park 3x".to_string(),
        ];
        let list = TodoList::open(MemoryStore::new(), &seed).unwrap();
        assert_eq!(
            texts(&list),
            vec!["Complete online JavaScript course", "Jog around the park 3x"]
        );
        assert!(list.tasks().iter().all(|t| !t.completed));
        assert_eq!(list.store().writes(), 1);

        // Reopening ignores the seed
        let store = list.into_store();
        let other_seed = vec!["Something else".to_string()];
        let list = TodoList::open(store, &other_seed).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn open_with_empty_saved_list_does_not_seed() {
        let store = MemoryStore::new().with_slot(TODOS_SLOT, "[]");
        let list = TodoList::open(store, &["seed".to_string()]).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn open_corrupt_falls_back_to_empty() {
        let store = MemoryStore::new().with_slot(TODOS_SLOT, "not json {{{");
        let mut list = TodoList::open(store, &["seed".to_string()]).unwrap();

        assert!(list.is_empty());
        assert!(list.recovered_from().is_some());
        assert_eq!(
            list.store().unreadable(),
            vec![(TODOS_SLOT.to_string(), "not json {{{".to_string())]
        );
        // Nothing written until the next mutation
        assert_eq!(list.store().get(TODOS_SLOT), Some("not json {{{"));

        list.add("fresh start").unwrap();
        assert_eq!(stored(&list), list.tasks());
    }

    #[test]
    fn reopening_corrupt_store_keeps_one_copy() {
        let mut store = MemoryStore::new().with_slot(TODOS_SLOT, "not json {{{");
        for _ in 0..5 {
            let list = TodoList::open(store, &[]).unwrap();
            assert!(list.recovered_from().is_some());
            store = list.into_store();
        }
        assert_eq!(store.unreadable().len(), 1);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn add_after_largest_possible_id_stays_unique() {
        let store = MemoryStore::new().with_slot(
            TODOS_SLOT,
            r#"[{"id":18446744073709551615,"text":"a"},{"id":1,"text":"b"}]"#,
        );
        let mut list = TodoList::open(store, &[]).unwrap();
        let c = list.add("c").unwrap();
        let d = list.add("d").unwrap();
        assert_eq!((c, d), (TaskId(2), TaskId(3)));

        list.toggle(TaskId(u64::MAX)).unwrap();
        assert!(list.get(TaskId(u64::MAX)).unwrap().completed);
        assert!(!list.get(c).unwrap().completed);
    }

    #[test]
    fn open_drops_blank_records_and_persists() {
        let store = MemoryStore::new().with_slot(
            TODOS_SLOT,
            r#"[{"id":1,"text":"   ","completed":false},{"id":2,"text":"b","completed":true}]"#,
        );
        let list = TodoList::open(store, &[]).unwrap();
        assert_eq!(texts(&list), vec!["b"]);
        assert!(list.recovered_from().is_none());
        assert_eq!(list.store().writes(), 1);
        assert_eq!(stored(&list), list.tasks());
    }

    #[test]
    fn open_repairs_and_persists_legacy_ids() {
        let store = MemoryStore::new().with_slot(
            TODOS_SLOT,
            r#"[{"id":1.5,"text":"a","completed":false},{"id":2,"text":"b","completed":true}]"#,
        );
        let mut list = TodoList::open(store, &[]).unwrap();
        assert_eq!(list.store().writes(), 1);
        assert_eq!(stored(&list), list.tasks());

        // Fresh ids never collide with loaded ones
        let id = list.add("c").unwrap();
        assert_eq!(list.tasks().iter().filter(|t| t.id == id).count(), 1);
    }

    #[test]
    fn added_task_visible_under_active_not_completed() {
        let (mut list, _) = list_with(&[]);
        let id = list.add("new").unwrap();
        assert!(list.visible(FilterMode::Active).iter().any(|t| t.id == id));
        assert!(list.visible(FilterMode::All).iter().any(|t| t.id == id));
        assert!(list.visible(FilterMode::Completed).is_empty());
    }
}
