use serde::{Deserialize, Serialize};

/// Configuration from tick.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory, relative to the directory holding tick.toml
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> String {
    ".tick".to_string()
}

/// Initial tasks used once, when the store has never been written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    /// Print task ids in listings
    #[serde(default = "default_true")]
    pub show_ids: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig { show_ids: true }
    }
}

fn default_true() -> bool {
    true
}
