//! Search the codebase index.

use super::{open_workspace, print_hits};
use anyhow::Result;
use console::style;

pub fn run(query: &str, limit: usize) -> Result<()> {
    let ws = open_workspace()?;
    let snapshot = ws.index().snapshot();
    let hits = snapshot.search(query, limit);

    println!(
        "{} results for {} (index version {})",
        hits.len(),
        style(query).bold(),
        snapshot.version()
    );
    print_hits(&hits);
    Ok(())
}
