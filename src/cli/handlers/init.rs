use std::path::Path;

use crate::cli::commands::InitArgs;
use crate::io::config_io;
use crate::io::store::DirStore;

/// Write a starter tick.toml and create the store directory next to it.
pub fn cmd_init(root: &Path, args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_io::write_config_template(root, args.force)?;
    let config = config_io::read_config(root)?;
    let store = DirStore::open(config_io::store_dir(root, &config))?;

    println!("wrote {}", path.display());
    println!("store: {}", store.dir().display());
    Ok(())
}
