//! `bd init` - create a beads workspace in the current directory.

use crate::error::{BeadworkError, Result};
use crate::storage::SqliteStorage;

/// # Errors
///
/// Returns `AlreadyInitialized` if `.beads/` exists here.
pub fn execute(prefix: &str) -> Result<()> {
    let beads_dir = std::env::current_dir()?.join(".beads");
    if beads_dir.exists() {
        return Err(BeadworkError::AlreadyInitialized { path: beads_dir });
    }

    std::fs::create_dir_all(&beads_dir)?;
    if prefix != "bd" {
        std::fs::write(beads_dir.join("config.yaml"), format!("prefix: {prefix}\n"))?;
    }

    // Open once so the schema exists before the first command.
    let db_path = beads_dir.join("beads.db");
    SqliteStorage::open(&db_path)?;

    println!("Initialized beads workspace at {}", beads_dir.display());
    println!("  Database: {}", db_path.display());
    println!("  Journal:  {}", beads_dir.join("issues.jsonl").display());
    println!("  Prefix:   {prefix}");
    Ok(())
}
