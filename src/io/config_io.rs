use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::Config;

/// Config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "tick.toml";

/// Written by `tk init`
const CONFIG_TEMPLATE: &str = r#"[store]
dir = ".tick"

# Tasks to start with. Used only the first time, before anything is saved.
[seed]
tasks = [
    "Complete online JavaScript course",
    "Jog around the park 3x",
    "10 minutes meditation",
    "Read for 1 hour",
    "Pick up groceries",
    "Complete Todo App on Frontend Mentor",
]

[ui]
show_ids = true
"#;

/// Error type for configuration I/O
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{path} already exists")]
    AlreadyExists { path: PathBuf },
}

/// Read `tick.toml` from `dir`. A missing file yields the defaults.
pub fn read_config(dir: &Path) -> Result<Config, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(ConfigError::ReadError { path, source: e }),
    };
    toml::from_str(&text).map_err(|e| ConfigError::ParseError { path, source: e })
}

/// Write the starter `tick.toml` into `dir`. Refuses to overwrite unless
/// `force` is set.
pub fn write_config_template(dir: &Path, force: bool) -> Result<PathBuf, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists { path });
    }
    fs::write(&path, CONFIG_TEMPLATE).map_err(|e| ConfigError::WriteError {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

/// Resolve the store directory relative to `dir`
pub fn store_dir(dir: &Path, config: &Config) -> PathBuf {
    dir.join(&config.store.dir)
}
