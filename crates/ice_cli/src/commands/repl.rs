//! Interactive session.
//!
//! Lines starting with a known command word are run as commands; anything
//! else is a request and becomes a turn.

use super::{codebase, open_workspace, print_hits, status, turn};
use anyhow::Result;
use console::style;
use ice_core::{IceError, Orchestrator, Workspace};
use std::io::{self, BufRead, Write};

const COMMANDS: &str = "\
Commands:
  codebase        summary of the indexed codebase
  find <query>    search the index
  reindex         pick up changes made outside the session
  status          session and index status
  undo            revert the most recent edit
  help            this list
  exit            leave the session
Anything else is treated as a request.";

pub fn run() -> Result<()> {
    let ws = open_workspace()?;
    let mut orchestrator = ws.orchestrator(None)?;

    println!(
        "{} {} files indexed (version {}). Type 'help' for commands.",
        style("ICE").bold(),
        ws.index().snapshot().len(),
        ws.index().version()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", style("ice>").cyan());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let result: Result<()> = match word {
            "exit" | "quit" => break,
            "help" if rest.is_empty() => {
                println!("{}", COMMANDS);
                Ok(())
            }
            "codebase" if rest.is_empty() => {
                codebase::print_summary(&ws.index().snapshot(), 5);
                Ok(())
            }
            "find" if !rest.trim().is_empty() => {
                print_hits(&ws.index().snapshot().search(rest.trim(), 10));
                Ok(())
            }
            "status" if rest.is_empty() => {
                status::print_status(&ws, orchestrator.session());
                Ok(())
            }
            "reindex" if rest.is_empty() => reindex(&ws, &mut orchestrator),
            "undo" if rest.is_empty() => undo_one(&mut orchestrator),
            _ => turn::run(&mut orchestrator, line, false, false),
        };

        if let Err(e) = result {
            report(&e);
            // A failed turn must not block the next one.
            orchestrator.abandon();
        }
    }

    orchestrator.wait_for_index()?;
    ws.save_index()?;
    Ok(())
}

fn reindex(ws: &Workspace, orchestrator: &mut Orchestrator) -> Result<()> {
    orchestrator.wait_for_index()?;
    let report = ws.reindex(false)?;
    match report.version {
        Some(version) => println!(
            "{} {} file(s) changed (version {})",
            style("✓").green(),
            report.changed,
            version
        ),
        None => println!("{} Index is up to date", style("✓").green()),
    }
    Ok(())
}

fn undo_one(orchestrator: &mut Orchestrator) -> Result<()> {
    let proposal = match orchestrator.session().propose_undo() {
        Ok(p) => p,
        Err(IceError::NothingToUndo) => {
            println!("{} Nothing to undo", style("ℹ").blue());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let prompt = format!(
        "Revert the change to {} made in turn {}?",
        proposal.edit.path, proposal.edit.turn_id
    );
    if !super::confirm(&prompt)? {
        println!("{} Undo cancelled.", style("✓").green());
        return Ok(());
    }
    for edit in orchestrator.undo(1)? {
        println!("{} Reverted {} (turn {})", style("✓").green(), edit.path, edit.turn_id);
    }
    Ok(())
}

fn report(error: &anyhow::Error) {
    eprintln!("{} {}", style("error:").red().bold(), error);
    if let Some(hint) = error.downcast_ref::<IceError>().and_then(IceError::recovery_suggestion) {
        eprintln!("  {}", style(hint).dim());
    }
}
