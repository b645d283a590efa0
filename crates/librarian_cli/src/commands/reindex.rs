//! `librarian reindex` — re-extract changed files and their dependents.

use crate::cli_error::CliResult;
use crate::commands::bootstrap::spinner_if_interactive;
use crate::output::OutputMode;
use console::style;
use librarian_core::{IndexMode, Librarian, ReindexScope};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ReindexOutput {
    files_indexed: usize,
    files_skipped: usize,
    symbols_written: usize,
    edges_written: usize,
    calls_resolved: usize,
    claims_invalidated: usize,
    failures: usize,
}

pub fn run(
    workspace: &Path,
    paths: Vec<String>,
    dependents: bool,
    full: bool,
    fast: bool,
    out: &OutputMode,
) -> CliResult<()> {
    let spinner = spinner_if_interactive(out, "Reindexing...");

    let mut librarian = Librarian::open(workspace)?;
    let scope = if full {
        ReindexScope::Full
    } else if dependents {
        ReindexScope::ChangedAndDependents
    } else {
        ReindexScope::ChangedOnly
    };
    let mode = if fast { IndexMode::Fast } else { IndexMode::Full };
    let timestamp = super::now_unix();
    let report = librarian.reindex(&paths, scope, mode, timestamp)?;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let output = ReindexOutput {
        files_indexed: report.files_indexed,
        files_skipped: report.files_skipped,
        symbols_written: report.symbols_written,
        edges_written: report.edges_written,
        calls_resolved: report.calls_resolved,
        claims_invalidated: report.claims_invalidated,
        failures: report.failures.len(),
    };
    out.emit(&output, || {
        println!("{}", out.heading("Reindex complete"));
        println!("  files indexed:       {}", style(output.files_indexed).cyan());
        println!("  files skipped:       {}", output.files_skipped);
        println!("  symbols written:     {}", output.symbols_written);
        println!("  edges written:       {}", output.edges_written);
        println!("  calls resolved:      {}", output.calls_resolved);
        println!("  claims invalidated:  {}", output.claims_invalidated);
    });

    Ok(())
}
