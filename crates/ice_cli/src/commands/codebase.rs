//! Codebase summary.

use super::open_workspace;
use anyhow::Result;
use chrono::DateTime;
use console::style;
use ice_core::CodebaseIndex;

pub fn run(largest: usize) -> Result<()> {
    let ws = open_workspace()?;
    print_summary(&ws.index().snapshot(), largest);
    Ok(())
}

pub fn print_summary(index: &CodebaseIndex, largest: usize) {
    let summary = index.summary();
    let built = DateTime::from_timestamp(summary.built_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| summary.built_at.to_string());

    println!("{}", style("Codebase:").bold());
    println!("  Files:    {}", style(summary.total_files).cyan());
    println!("  Lines:    {}", style(summary.total_lines).cyan());
    println!("  Symbols:  {}", style(summary.total_symbols).cyan());
    println!("  Version:  {} (built {})", summary.version, built);
    if summary.degraded_files > 0 {
        println!(
            "  {} {} file(s) could not be parsed; they are searchable but have no symbols",
            style("⚠").yellow(),
            summary.degraded_files
        );
    }

    if !summary.languages.is_empty() {
        println!();
        println!("{}", style("Languages:").bold());
        let mut languages: Vec<_> = summary.languages.iter().collect();
        languages.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (language, count) in languages {
            println!("  {:<12} {}", language.as_str(), count);
        }
    }

    if largest > 0 && !summary.largest_files.is_empty() {
        println!();
        println!("{}", style("Largest files:").bold());
        for (path, lines) in summary.largest_files.iter().take(largest) {
            println!("  {:>7}  {}", lines, path);
        }
    }
}
