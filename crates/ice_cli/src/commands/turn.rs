//! Runs one turn and carries out what the terminal host can do itself.
//!
//! Searching, status, explaining and deleting are done here. Generating,
//! editing and running code is left to an attached collaborator; without
//! one the turn reports the resolved intent and its context.

use super::{confirm, print_hits};
use anyhow::{Context, Result};
use console::style;
use ice_core::{IntentType, Orchestrator, ResolvedTurn, TurnOutcome, TurnResponse, UserChoice};

/// Runs `text` as a turn, prompting for confirmations unless `assume_yes`.
pub fn run(orchestrator: &mut Orchestrator, text: &str, assume_yes: bool, json: bool) -> Result<()> {
    let mut response = orchestrator.handle_input(text)?;
    loop {
        match response {
            TurnResponse::Proceed(turn) => {
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&turn.intent).context("Failed to serialize intent")?
                    );
                } else {
                    print_intent(&turn);
                }
                let outcome = match carry_out(orchestrator, &turn) {
                    Ok(outcome) => outcome,
                    Err(e) => TurnOutcome::failure(e.to_string()),
                };
                if !outcome.succeeded {
                    println!("{} {}", style("×").red(), outcome.summary);
                }
                orchestrator.complete_turn(turn.turn_id, outcome)?;
                return Ok(());
            }
            TurnResponse::Confirm { message, pending } => {
                let choice = if assume_yes || confirm(&message)? {
                    UserChoice::Confirm
                } else {
                    UserChoice::Decline
                };
                response = orchestrator.respond(pending.turn.turn_id, choice)?;
            }
            TurnResponse::Done { message, .. } => {
                println!("{} {}", style("✓").green(), message);
                return Ok(());
            }
            TurnResponse::Help { message, .. } => {
                println!("{}", message.trim_end());
                return Ok(());
            }
        }
    }
}

fn print_intent(turn: &ResolvedTurn) {
    let intent = &turn.intent;
    println!(
        "{} {} {} {}",
        style("→").cyan(),
        style(intent.intent_type()).bold(),
        intent.target_path().unwrap_or(""),
        style(format!("({:.2}, {:?})", intent.confidence(), intent.source())).dim()
    );
}

fn carry_out(orchestrator: &Orchestrator, turn: &ResolvedTurn) -> Result<TurnOutcome> {
    let intent = &turn.intent;
    let snapshot = orchestrator.index().snapshot();

    match intent.intent_type() {
        IntentType::SearchCode => {
            let query = intent
                .param("query")
                .or_else(|| intent.param("description"))
                .unwrap_or_default();
            let hits = snapshot.search(query, 10);
            print_hits(&hits);
            Ok(TurnOutcome::success(format!("{} results for {}", hits.len(), query)))
        }
        IntentType::Status => {
            let summary = orchestrator.session().summary();
            println!(
                "  turns {}, edits {} ({} reverted), active file {}, index version {}",
                summary.turns,
                summary.edits,
                summary.reverted,
                summary.active_file.as_deref().unwrap_or("-"),
                snapshot.version()
            );
            Ok(TurnOutcome::success("status shown"))
        }
        IntentType::DeleteFile => {
            let Some(path) = intent.target_path() else {
                return Ok(TurnOutcome::failure("no file named to delete"));
            };
            let outcome = orchestrator.files().delete(path)?;
            println!("{} Deleted {}", style("✓").green(), path);
            Ok(TurnOutcome::success(format!("deleted {}", path)).with_edit(path, outcome))
        }
        IntentType::ExplainCode | IntentType::AnalyzeCode => {
            let Some(context) = intent.target_path().and_then(|p| snapshot.context_for_file(p)) else {
                return Ok(TurnOutcome::failure("target is not in the index"));
            };
            let file = &context.file;
            println!(
                "  {} ({}, {} lines{})",
                file.path,
                file.language,
                file.line_count,
                if file.parse_degraded { ", not parsed" } else { "" }
            );
            for symbol in &file.symbols {
                println!(
                    "    {:>6}  {:<9} {}",
                    symbol.line_range.to_string(),
                    symbol.kind.as_str(),
                    symbol.signature
                );
                if let Some(doc) = &symbol.doc_summary {
                    println!("            {}", style(doc).dim());
                }
            }
            if !context.related.is_empty() {
                println!("  related: {}", context.related.join(", "));
            }
            Ok(TurnOutcome::success(format!("{} symbols in {}", file.symbols.len(), file.path)))
        }
        _ => {
            if !turn.context.files.is_empty() {
                let paths: Vec<&str> = turn.context.files.iter().map(|f| f.path.as_str()).collect();
                println!("  context: {}", paths.join(", "));
            }
            for (key, value) in intent.parameters() {
                println!("  {}: {}", style(key).dim(), value);
            }
            Ok(TurnOutcome::success("resolved; handed off"))
        }
    }
}
