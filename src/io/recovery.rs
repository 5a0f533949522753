use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::NamedTempFile;

/// Entries older than this many days are dropped by a default prune.
pub const PRUNE_AGE_DAYS: i64 = 30;

/// Written once at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- tick recovery log: append-only.
     Holds store contents that tick could not read or write normally.
     View with: tk recovery
     Prune old entries: tk recovery --prune -->

---
";

/// Why an entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A slot held data that could not be parsed
    Corrupt,
    /// A slot write failed; the body is what should have been written
    Write,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Corrupt => write!(f, "corrupt"),
            RecoveryCategory::Write => write!(f, "write"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "corrupt" => Some(RecoveryCategory::Corrupt),
            "write" => Some(RecoveryCategory::Write),
            _ => None,
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    /// Slot the data belongs to
    pub slot: String,
    pub detail: String,
    pub body: String,
}

impl RecoveryEntry {
    pub fn now(category: RecoveryCategory, slot: &str, detail: impl Into<String>, body: &str) -> Self {
        RecoveryEntry {
            timestamp: Utc::now(),
            category,
            slot: slot.to_string(),
            detail: detail.into(),
            body: body.to_string(),
        }
    }

    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} [{}] {}\n\n",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.slot,
        );
        if !self.detail.is_empty() {
            out.push_str(&format!("Detail: {}\n", self.detail));
        }
        if !self.body.is_empty() {
            // The fence is longer than any backtick run in the body, and the
            // newline before the closing fence is not part of the body.
            let fence = "`".repeat(longest_backtick_run(&self.body).max(2) + 1);
            out.push_str(&format!("\n{}text\n", fence));
            out.push_str(&self.body);
            out.push_str(&format!("\n{}\n", fence));
        }
        out.push_str("\n---\n");
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "slot": self.slot,
            "detail": self.detail,
            "body": self.body,
        })
    }
}

fn longest_backtick_run(s: &str) -> usize {
    s.split(|c: char| c != '`').map(str::len).max().unwrap_or(0)
}

pub fn recovery_log_path(store_dir: &Path) -> PathBuf {
    store_dir.join(".recovery.log")
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Append an entry to the log. Failures are reported on stderr and otherwise
/// ignored: the recovery log must never turn a recoverable problem into a
/// hard error.
pub fn log_recovery(store_dir: &Path, entry: &RecoveryEntry) {
    if let Err(e) = append_entry(store_dir, entry) {
        eprintln!("warning: could not write to recovery log: {}", e);
    }
}

fn append_entry(store_dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    let path = recovery_log_path(store_dir);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())
}

/// Read entries, most recent first. A missing log reads as empty.
pub fn read_recovery_entries(store_dir: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let content = match std::fs::read_to_string(recovery_log_path(store_dir)) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut entries = parse_entries(&content);
    entries.reverse();
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}

/// The instant `days` days ago, or `None` if that is negative or out of range.
pub fn days_ago(days: i64) -> Option<DateTime<Utc>> {
    if days < 0 {
        return None;
    }
    Utc::now().checked_sub_signed(chrono::Duration::try_days(days)?)
}

/// Drop entries older than `before` (default: [`PRUNE_AGE_DAYS`] ago).
/// Returns the number of entries removed.
pub fn prune_recovery(store_dir: &Path, before: Option<DateTime<Utc>>) -> io::Result<usize> {
    let path = recovery_log_path(store_dir);
    if !path.exists() {
        return Ok(0);
    }

    let Some(cutoff) = before.or_else(|| days_ago(PRUNE_AGE_DAYS)) else {
        return Ok(0);
    };
    let content = std::fs::read_to_string(&path)?;
    let entries = parse_entries(&content);
    let (kept, dropped): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|e| e.timestamp >= cutoff);

    let mut out = String::from(FILE_HEADER);
    for entry in &kept {
        out.push_str(&entry.to_markdown());
    }
    atomic_write(&path, out.as_bytes())?;
    Ok(dropped.len())
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    // split rather than lines(): a body may carry its own \r
    let mut lines = content.split('\n').peekable();

    while let Some(line) = lines.next() {
        let Some(header) = line.strip_prefix("## ") else {
            continue;
        };
        let Some((timestamp, category, slot)) = parse_entry_header(header) else {
            continue;
        };

        let mut detail = String::new();
        let mut body_lines: Vec<&str> = Vec::new();
        let mut fence: Option<&str> = None;

        while let Some(&line) = lines.peek() {
            if fence.is_none() && line.starts_with("## ") {
                break;
            }
            lines.next();
            match fence {
                Some(f) if line == f => fence = None,
                Some(_) => body_lines.push(line),
                None if line == "---" => break,
                None if line.starts_with("```") => {
                    let ticks = line.len() - line.trim_start_matches('`').len();
                    fence = Some(&line[..ticks]);
                }
                None => {
                    if let Some(d) = line.strip_prefix("Detail: ") {
                        detail = d.to_string();
                    }
                }
            }
        }

        entries.push(RecoveryEntry {
            timestamp,
            category,
            slot,
            detail,
            body: body_lines.join("\n"),
        });
    }

    entries
}

/// `<timestamp> [<category>] <slot>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp_str, rest) = header.split_once(" [")?;
    let (category_str, slot) = rest.split_once("] ")?;

    let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
        .ok()?
        .with_timezone(&Utc);
    let category = RecoveryCategory::parse_category(category_str)?;
    Some((timestamp, category, slot.to_string()))
}
