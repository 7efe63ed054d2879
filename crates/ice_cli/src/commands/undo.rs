//! Revert recent edits.

use super::{confirm, open_workspace};
use anyhow::Result;
use console::style;
use ice_core::IceError;

pub fn run(count: usize, yes: bool) -> Result<()> {
    let ws = open_workspace()?;
    let mut orchestrator = ws.orchestrator(None)?;

    let proposal = match orchestrator.session().propose_undo() {
        Ok(p) => p,
        Err(IceError::NothingToUndo) => {
            println!("{} Nothing to undo", style("ℹ").blue());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let prompt = if count > 1 {
        format!("Revert up to {} edits, starting with {}?", count, proposal.edit.path)
    } else {
        format!("Revert the change to {} (turn {})?", proposal.edit.path, proposal.edit.turn_id)
    };
    if !yes && !confirm(&prompt)? {
        println!("{} Undo cancelled.", style("✓").green());
        return Ok(());
    }

    let reverted = orchestrator.undo(count)?;
    for edit in &reverted {
        println!(
            "{} Reverted {} (turn {})",
            style("✓").green(),
            edit.path,
            edit.turn_id
        );
    }
    orchestrator.wait_for_index()?;
    ws.save_index()?;
    Ok(())
}
