//! Initialize a new ICE workspace.

use super::spinner;
use anyhow::{Context, Result};
use ice_core::Workspace;

/// Initialize a new ICE workspace in the current directory.
pub fn run() -> Result<()> {
    let pb = spinner("Indexing codebase...");
    let ws = Workspace::init(".").context("Failed to initialize ICE workspace");
    pb.finish_and_clear();
    let ws = ws?;

    let snapshot = ws.index().snapshot();

    println!("Initialized ICE workspace in .ice/");
    println!();
    println!("Directory structure:");
    println!("  .ice/config.toml   - Settings");
    println!("  .ice/index.cache   - Persisted codebase index (gitignored)");
    println!("  .ice/session.json  - Resumable session (gitignored)");
    println!("  .ice/objects/      - Backups for undo (gitignored)");
    println!();
    println!(
        "Indexed {} files, {} symbols, {} lines (version {})",
        snapshot.len(),
        snapshot.total_symbols(),
        snapshot.total_lines(),
        snapshot.version()
    );

    Ok(())
}
