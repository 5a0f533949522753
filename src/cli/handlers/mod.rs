mod init;
pub use init::cmd_init;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::recovery;
use crate::io::store::DirStore;
use crate::io::todo_io;
use crate::model::config::Config;
use crate::model::filter::FilterMode;
use crate::model::task::TaskId;
use crate::model::theme::Theme;
use crate::ops::list_ops::{TodoError, TodoList};
use crate::ops::reorder::Move;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let root = resolve_root(cli.dir.as_deref())?;

    match cli.command {
        None => cmd_list(&root, FilterMode::All, json),
        Some(cmd) => match cmd {
            Commands::Init(args) => cmd_init(&root, args),

            // Read commands
            Commands::List(args) => cmd_list(&root, parse_filter(&args.filter)?, json),
            Commands::Left => cmd_left(&root, json),
            Commands::Recovery(args) => cmd_recovery(&root, args, json),

            // Write commands
            Commands::Add(args) => cmd_add(&root, args, json),
            Commands::Toggle(args) => cmd_toggle(&root, args, json),
            Commands::Rm(args) => cmd_rm(&root, args, json),
            Commands::Clear => cmd_clear(&root, json),
            Commands::Mv(args) => cmd_mv(&root, args, json),
            Commands::Theme(args) => cmd_theme(&root, args, json),
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_root(dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match dir {
        Some(dir) => std::fs::canonicalize(dir).map_err(|e| {
            Box::<dyn std::error::Error>::from(format!("cannot resolve -C path '{}': {}", dir, e))
        }),
        None => Ok(std::env::current_dir()?),
    }
}

fn parse_filter(s: &str) -> Result<FilterMode, Box<dyn std::error::Error>> {
    s.parse::<FilterMode>().map_err(Into::into)
}

fn parse_id(s: &str) -> Result<TaskId, Box<dyn std::error::Error>> {
    s.parse::<TaskId>().map_err(Into::into)
}

fn open_store(root: &Path) -> Result<(Config, DirStore), Box<dyn std::error::Error>> {
    let config = config_io::read_config(root)?;
    let store = DirStore::open(config_io::store_dir(root, &config))?;
    Ok((config, store))
}

fn open_list(root: &Path) -> Result<(Config, TodoList<DirStore>), Box<dyn std::error::Error>> {
    let (config, store) = open_store(root)?;
    let list = TodoList::open(store, &config.seed.tasks)?;
    Ok((config, list))
}

fn print_listing(list: &TodoList<DirStore>, filter: FilterMode, show_ids: bool, json: bool) -> CmdResult {
    let visible = list.visible(filter);
    let left = list.count_active();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&listing_to_json(&visible, filter, left))?
        );
    } else {
        for line in format_listing(&visible, filter, left, show_ids) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Run one mutation against the list. A listener marks the list as changed,
/// and the listing is redrawn only if it fired. A save failure is reported
/// after the redraw, since the change was still applied in memory.
fn with_list<F>(root: &Path, json: bool, mutate: F) -> CmdResult
where
    F: FnOnce(&mut TodoList<DirStore>) -> Result<String, TodoError>,
{
    let (config, mut list) = open_list(root)?;
    let changed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&changed);
    list.subscribe(move |_| flag.set(true));

    let result = mutate(&mut list);

    if let Ok(message) = &result
        && !json
    {
        println!("{}", message);
    }
    if changed.get() {
        if !json {
            println!();
        }
        print_listing(&list, FilterMode::All, config.ui.show_ids, json)?;
    } else if json {
        println!("{}", serde_json::json!({ "changed": false }));
    }
    result?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(root: &Path, filter: FilterMode, json: bool) -> CmdResult {
    let (config, list) = open_list(root)?;
    print_listing(&list, filter, config.ui.show_ids, json)
}

fn cmd_left(root: &Path, json: bool) -> CmdResult {
    let (_, list) = open_list(root)?;
    let left = list.count_active();
    if json {
        println!("{}", serde_json::json!({ "items_left": left }));
    } else {
        println!("{}", format_items_left(left));
    }
    Ok(())
}

fn cmd_recovery(root: &Path, args: RecoveryArgs, json: bool) -> CmdResult {
    let config = config_io::read_config(root)?;
    let store_dir = config_io::store_dir(root, &config);

    if args.prune {
        let before = match args.days {
            Some(days) => Some(
                recovery::days_ago(days).ok_or_else(|| format!("--days {} is out of range", days))?,
            ),
            None => None,
        };
        let removed = recovery::prune_recovery(&store_dir, before)?;
        if json {
            println!("{}", serde_json::json!({ "removed": removed }));
        } else {
            println!("pruned {} recovery entries", removed);
        }
        return Ok(());
    }

    let entries = recovery::read_recovery_entries(&store_dir, args.limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&recovery_to_json(&entries))?);
    } else if entries.is_empty() {
        println!("recovery log is empty");
    } else {
        for entry in &entries {
            for line in format_recovery_entry(entry) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_add(root: &Path, args: AddArgs, json: bool) -> CmdResult {
    let text = args.text.join(" ");
    with_list(root, json, |list| {
        let id = list.add(&text)?;
        Ok(format!("added {}", id))
    })
}

fn cmd_toggle(root: &Path, args: IdArgs, json: bool) -> CmdResult {
    let id = parse_id(&args.id)?;
    with_list(root, json, |list| {
        if !list.toggle(id)? {
            return Ok(format!("no task {}", id));
        }
        let state = match list.get(id) {
            Some(t) if t.completed => "completed",
            _ => "active",
        };
        Ok(format!("{} is now {}", id, state))
    })
}

fn cmd_rm(root: &Path, args: IdArgs, json: bool) -> CmdResult {
    let id = parse_id(&args.id)?;
    with_list(root, json, |list| {
        let message = if list.remove(id)? {
            format!("removed {}", id)
        } else {
            format!("no task {}", id)
        };
        Ok(message)
    })
}

fn cmd_clear(root: &Path, json: bool) -> CmdResult {
    with_list(root, json, |list| {
        let removed = list.clear_completed()?;
        Ok(format!("cleared {} completed", removed))
    })
}

fn cmd_mv(root: &Path, args: MvArgs, json: bool) -> CmdResult {
    let source = parse_id(&args.source)?;
    let target = parse_id(&args.target)?;
    with_list(root, json, |list| {
        // Same path as a drag gesture: pick up source, drop on target
        list.begin_drag(source);
        let message = match list.drop_on(target)? {
            Move::Moved { from, to } => format!("moved {} from #{} to #{}", source, from + 1, to + 1),
            Move::None => "nothing to move".to_string(),
        };
        Ok(message)
    })
}

fn cmd_theme(root: &Path, args: ThemeArgs, json: bool) -> CmdResult {
    let (_, mut store) = open_store(root)?;
    let current = todo_io::load_theme(&store)?;

    let theme = match args.value.as_deref() {
        None => current,
        Some("toggle") => current.toggled(),
        Some(value) => value.parse::<Theme>()?,
    };
    if args.value.is_some() {
        todo_io::save_theme(&mut store, theme)?;
    }

    if json {
        println!("{}", serde_json::json!({ "theme": theme.as_str() }));
    } else {
        println!("{}", theme);
    }
    Ok(())
}
