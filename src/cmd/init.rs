//! Database initialization — `taskboard init`.

use anyhow::Result;
use taskboard::config::BoardConfig;

pub fn cmd_init(config: &BoardConfig) -> Result<()> {
    super::open_store(config)?;
    println!(
        "Initialized board database at {}",
        config.store.path.display()
    );
    Ok(())
}
