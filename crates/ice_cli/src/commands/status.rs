//! Session and index status.

use super::open_workspace;
use anyhow::Result;
use chrono::DateTime;
use console::style;
use ice_core::{SessionContext, Workspace};

pub fn run() -> Result<()> {
    let ws = open_workspace()?;
    let session = ws.session()?;
    print_status(&ws, &session);
    Ok(())
}

pub fn print_status(ws: &Workspace, session: &SessionContext) {
    let summary = session.summary();
    let snapshot = ws.index().snapshot();
    let started = DateTime::from_timestamp(summary.created_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| summary.created_at.to_string());

    println!("{}", style("Session:").bold());
    println!("  ID:           {}", summary.session_id);
    println!("  Started:      {}", started);
    println!("  Duration:     {}", format_duration(summary.duration.as_secs()));
    println!("  Turns:        {}", summary.turns);
    println!(
        "  Edits:        {} ({} reverted)",
        summary.edits, summary.reverted
    );
    println!(
        "  Active file:  {}",
        summary.active_file.as_deref().unwrap_or("-")
    );
    if !summary.working_files.is_empty() {
        println!("  Working on:   {}", summary.working_files.join(", "));
    }

    println!();
    println!("{}", style("Index:").bold());
    println!("  Version:      {}", snapshot.version());
    println!("  Files:        {}", snapshot.len());
    println!("  Symbols:      {}", snapshot.total_symbols());

    let recent = session.recent_turns(ws.config().session.max_turns_in_context);
    if !recent.is_empty() {
        println!();
        println!("{}", style("Recent turns:").bold());
        for turn in recent {
            println!(
                "  #{:<4} {:<14} {}  {}",
                turn.id,
                turn.resolved_intent.intent_type().as_str(),
                turn.raw_input,
                style(&turn.result_summary).dim()
            );
        }
    }
}

/// Formats a duration in human-readable form.
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else if secs < 86400 {
        format!("{} hours", secs / 3600)
    } else {
        format!("{} days", secs / 86400)
    }
}
