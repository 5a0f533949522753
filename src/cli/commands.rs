use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tk", about = concat!("[x] tick v", env!("CARGO_PKG_VERSION"), " - a small, ordered todo list"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different directory
    #[arg(short = 'C', long = "dir", global = true)]
    pub dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter tick.toml in the current directory
    Init(InitArgs),
    /// List tasks (the default when no subcommand is given)
    List(ListArgs),
    /// Add a task to the end of the list
    Add(AddArgs),
    /// Mark a task complete, or incomplete again
    Toggle(IdArgs),
    /// Delete a task
    Rm(IdArgs),
    /// Delete all completed tasks
    Clear,
    /// Move a task into another task's position
    Mv(MvArgs),
    /// Show how many tasks are left
    Left,
    /// Show or change the theme
    Theme(ThemeArgs),
    /// View or prune the recovery log
    Recovery(RecoveryArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing tick.toml
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Which tasks to show: all, active, completed
    #[arg(long, short = 'f', default_value = "all")]
    pub filter: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Task text (words are joined with spaces)
    #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
    pub text: Vec<String>,
}

#[derive(Args)]
pub struct IdArgs {
    /// Task ID
    pub id: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Task to move
    pub source: String,
    /// Task whose position it takes
    pub target: String,
}

#[derive(Args)]
pub struct ThemeArgs {
    /// light, dark, or toggle (omit to show the current theme)
    pub value: Option<String>,
}

#[derive(Args)]
pub struct RecoveryArgs {
    /// Maximum number of entries to show
    #[arg(long)]
    pub limit: Option<usize>,
    /// Remove old entries instead of showing them
    #[arg(long)]
    pub prune: bool,
    /// With --prune: remove entries older than this many days
    #[arg(long, requires = "prune", value_parser = clap::value_parser!(i64).range(0..))]
    pub days: Option<i64>,
}
