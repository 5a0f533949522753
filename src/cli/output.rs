use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::filter::FilterMode;
use crate::model::task::{Task, TaskId};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
}

#[derive(Serialize)]
pub struct ListingJson {
    pub filter: FilterMode,
    pub items_left: usize,
    pub tasks: Vec<TaskJson>,
}

pub fn task_to_json(task: &Task) -> TaskJson {
    TaskJson {
        id: task.id,
        text: task.text.clone(),
        completed: task.completed,
    }
}

pub fn listing_to_json(visible: &[&Task], filter: FilterMode, items_left: usize) -> ListingJson {
    ListingJson {
        filter,
        items_left,
        tasks: visible.iter().map(|t| task_to_json(t)).collect(),
    }
}

pub fn recovery_to_json(entries: &[RecoveryEntry]) -> serde_json::Value {
    serde_json::Value::Array(entries.iter().map(|e| e.to_json()).collect())
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// `[x] 1700000000000 Buy milk`, or without the id when `show_ids` is off
pub fn format_task_line(task: &Task, show_ids: bool) -> String {
    let mark = if task.completed { 'x' } else { ' ' };
    if show_ids {
        format!("[{}] {} {}", mark, task.id, task.text)
    } else {
        format!("[{}] {}", mark, task.text)
    }
}

/// `1 item left` / `3 items left`
pub fn format_items_left(count: usize) -> String {
    let noun = if count == 1 { "item" } else { "items" };
    format!("{} {} left", count, noun)
}

/// Full listing: one line per visible task, then the footer
pub fn format_listing(
    visible: &[&Task],
    filter: FilterMode,
    items_left: usize,
    show_ids: bool,
) -> Vec<String> {
    let mut lines: Vec<String> = visible
        .iter()
        .map(|t| format_task_line(t, show_ids))
        .collect();
    if visible.is_empty() {
        lines.push(match filter {
            FilterMode::All => "(no tasks)".to_string(),
            other => format!("(no {} tasks)", other),
        });
    }
    lines.push(String::new());
    let mut footer = format_items_left(items_left);
    if filter != FilterMode::All {
        footer.push_str(&format!("  [{}]", filter));
    }
    lines.push(footer);
    lines
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} [{}] {}",
        entry
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        entry.category,
        entry.slot
    )];
    if !entry.detail.is_empty() {
        lines.push(format!("  {}", entry.detail));
    }
    for body_line in entry.body.lines() {
        lines.push(format!("  | {}", body_line));
    }
    lines
}
