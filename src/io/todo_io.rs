use std::collections::HashSet;

use serde::Deserialize;

use crate::io::store::{SlotStore, StorageError};
use crate::model::task::{IdAllocator, Task, TaskId};
use crate::model::theme::Theme;

/// Slot holding the serialized task list
pub const TODOS_SLOT: &str = "todos";
/// Slot holding the theme literal
pub const THEME_SLOT: &str = "theme";

/// Stored data exists but is not a valid task list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("slot '{slot}' holds unreadable data: {reason}")]
pub struct CorruptDataError {
    pub slot: String,
    pub reason: String,
    /// The raw slot contents, kept so they can be preserved before fallback
    pub raw: String,
}

/// Error type for [`load_tasks`]
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Corrupt(#[from] CorruptDataError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub tasks: Vec<Task>,
    /// Some stored records needed fixing: unusable ids (fractional, negative
    /// or duplicated) were reassigned and records with blank text dropped.
    /// The caller should save so the fixed list sticks.
    pub repaired: bool,
}

/// Record as found in the slot. Older writers produced fractional ids for
/// seeded tasks and may have omitted `completed`, so both are accepted here
/// and normalized afterwards.
#[derive(Debug, Deserialize)]
struct StoredTask {
    id: serde_json::Number,
    text: String,
    #[serde(default)]
    completed: bool,
}

/// Load the task list from the `todos` slot.
///
/// Returns `Ok(None)` when nothing has ever been saved.
pub fn load_tasks<S: SlotStore + ?Sized>(store: &S) -> Result<Option<Loaded>, LoadError> {
    let raw = match store.read_slot(TODOS_SLOT) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(None),
        Err(StorageError::NotText { slot, lossy }) => {
            return Err(CorruptDataError {
                slot,
                reason: "contents are not valid UTF-8".to_string(),
                raw: lossy,
            }
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let records: Vec<StoredTask> =
        serde_json::from_str(&raw).map_err(|e| CorruptDataError {
            slot: TODOS_SLOT.to_string(),
            reason: e.to_string(),
            raw: raw.clone(),
        })?;

    Ok(Some(normalize(records)))
}

/// Overwrite the `todos` slot with `tasks`, preserving order and every field.
pub fn save_tasks<S: SlotStore + ?Sized>(store: &mut S, tasks: &[Task]) -> Result<(), StorageError> {
    let json = serde_json::to_string(tasks)?;
    store.write_slot(TODOS_SLOT, &json)
}

/// Read the theme preference. Absent, unknown or non-text values mean the
/// default.
pub fn load_theme<S: SlotStore + ?Sized>(store: &S) -> Result<Theme, StorageError> {
    let value = match store.read_slot(THEME_SLOT) {
        Ok(value) => value,
        Err(StorageError::NotText { .. }) => None,
        Err(e) => return Err(e),
    };
    Ok(Theme::from_slot(value.as_deref().map(str::trim)))
}

pub fn save_theme<S: SlotStore + ?Sized>(store: &mut S, theme: Theme) -> Result<(), StorageError> {
    store.write_slot(THEME_SLOT, theme.as_str())
}

fn normalize(records: Vec<StoredTask>) -> Loaded {
    let mut repaired = false;
    let records: Vec<StoredTask> = records
        .into_iter()
        .filter(|r| {
            let keep = !r.text.trim().is_empty();
            repaired |= !keep;
            keep
        })
        .collect();

    // Every usable id is reserved up front so reassigned ones never take it
    let mut ids = IdAllocator::new();
    let parsed: Vec<Option<TaskId>> = records
        .iter()
        .map(|r| r.id.as_u64().map(TaskId))
        .collect();
    let reserved: HashSet<TaskId> = parsed.iter().flatten().copied().collect();
    for id in &reserved {
        ids.observe(*id);
    }

    let mut seen = HashSet::new();
    let tasks = records
        .into_iter()
        .zip(parsed)
        .map(|(record, id)| {
            let id = match id {
                Some(id) if seen.insert(id) => id,
                _ => {
                    repaired = true;
                    let fresh = ids.next_free(|id| reserved.contains(&id) || seen.contains(&id));
                    seen.insert(fresh);
                    fresh
                }
            };
            Task {
                id,
                text: record.text,
                completed: record.completed,
            }
        })
        .collect();

    Loaded { tasks, repaired }
}
