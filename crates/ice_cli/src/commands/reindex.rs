//! Reindex command implementation.

use super::{open_workspace, spinner};
use anyhow::{Context, Result};
use console::style;
use std::time::Instant;

/// Re-extract changed files (or all of them) and save the cache.
pub fn run(full: bool) -> Result<()> {
    let ws = open_workspace()?;
    let start = Instant::now();

    let pb = spinner(if full { "Rebuilding index..." } else { "Checking for changes..." });
    let report = ws.reindex(full).context("Failed to reindex");
    pb.finish_and_clear();
    let report = report?;

    match report.version {
        Some(version) => println!(
            "{} Reindexed {} file(s) in {:.2}s (version {})",
            style("✓").green(),
            report.changed,
            start.elapsed().as_secs_f64(),
            version
        ),
        None => println!("{} Index is up to date", style("✓").green()),
    }
    Ok(())
}
