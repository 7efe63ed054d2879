//! CLI commands.

pub mod ask;
pub mod codebase;
pub mod find;
pub mod init;
pub mod reindex;
pub mod repl;
pub mod status;
pub mod turn;
pub mod undo;

use anyhow::{Context, Result};
use console::style;
use ice_core::{LoadOutcome, SearchHit, Workspace};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

/// Opens the workspace in the current directory, with a spinner while the
/// index loads or builds.
pub fn open_workspace() -> Result<Workspace> {
    let pb = spinner("Loading index...");
    let ws = Workspace::open(".").context("Not an ICE workspace (run 'ice init' first)");
    pb.finish_and_clear();
    let ws = ws?;

    if let LoadOutcome::Rebuilt { reason } = ws.load_outcome() {
        println!(
            "{} Index rebuilt ({})",
            style("→").cyan(),
            style(reason).dim()
        );
    }
    Ok(ws)
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Asks a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = input.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

pub fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("{}", style("No matches.").dim());
        return;
    }
    for hit in hits {
        match &hit.symbol {
            Some(symbol) => println!(
                "  {:>9}  {}:{}  {} {}",
                style(hit.score).cyan(),
                hit.file.path,
                symbol.line_range,
                style(symbol.kind.as_str()).dim(),
                style(&symbol.name).bold()
            ),
            None => println!("  {:>9}  {}", style(hit.score).cyan(), hit.file.path),
        }
    }
}
