//! `librarian query` — run a query through the Query Coordinator.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use console::style;
use librarian_core::{Librarian, QueryRequest};
use std::path::Path;

pub fn run(
    workspace: &Path,
    query: String,
    budget: usize,
    release_critical: bool,
    out: &OutputMode,
) -> CliResult<()> {
    let librarian = Librarian::open(workspace)?;
    let request = QueryRequest { query, token_budget: budget, release_critical };
    let timestamp = super::now_unix();
    let response = librarian.query(&request, timestamp)?;

    out.emit(&response, || {
        let pack = &response.pack;
        println!("{}", out.heading(&pack.summary));
        println!("  confidence: {:.2}", pack.confidence);
        println!("  depth reached: {:?}", response.depth_reached);
        if !pack.key_facts.is_empty() {
            println!("  key facts:");
            for fact in &pack.key_facts {
                println!("    - {}", fact);
            }
        }
        if !pack.code_snippets.is_empty() {
            println!("  snippets:");
            for snippet in &pack.code_snippets {
                println!("    {} ({}:{})", snippet.path, snippet.span.start_line, snippet.span.end_line);
            }
        }
        for warning in &response.warnings {
            let marker = match warning.severity {
                librarian_core::WarningSeverity::Critical => style("!").red(),
                librarian_core::WarningSeverity::CoverageGap => style("~").yellow(),
            };
            println!("  {} {}", marker, warning.message);
        }
    });

    Ok(())
}
