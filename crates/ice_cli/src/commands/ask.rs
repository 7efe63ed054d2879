//! One-shot request against the saved session.

use super::{open_workspace, turn};
use anyhow::Result;

pub fn run(text: &str, yes: bool, json: bool) -> Result<()> {
    let ws = open_workspace()?;
    let mut orchestrator = ws.orchestrator(None)?;

    turn::run(&mut orchestrator, text, yes, json)?;

    // Edits made by the turn are folded in before the cache is written.
    orchestrator.wait_for_index()?;
    ws.save_index()?;
    Ok(())
}
