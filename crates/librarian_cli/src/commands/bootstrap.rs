//! `librarian bootstrap` — create a fresh workspace index.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use librarian_core::{IndexMode, IndexReport};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct BootstrapOutput {
    files_indexed: usize,
    files_skipped: usize,
    symbols_written: usize,
    edges_written: usize,
    calls_resolved: usize,
    failures: usize,
}

impl From<&IndexReport> for BootstrapOutput {
    fn from(r: &IndexReport) -> Self {
        Self {
            files_indexed: r.files_indexed,
            files_skipped: r.files_skipped,
            symbols_written: r.symbols_written,
            edges_written: r.edges_written,
            calls_resolved: r.calls_resolved,
            failures: r.failures.len(),
        }
    }
}

pub fn run(
    workspace: &Path,
    include: Vec<String>,
    exclude: Vec<String>,
    fast: bool,
    out: &OutputMode,
) -> CliResult<()> {
    let spinner = spinner_if_interactive(out, "Bootstrapping index...");

    let mode = if fast { IndexMode::Fast } else { IndexMode::Full };
    let timestamp = super::now_unix();
    let (_librarian, report) =
        librarian_core::Librarian::bootstrap(workspace, &include, &exclude, mode, timestamp)?;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let output = BootstrapOutput::from(&report);
    out.emit(&output, || {
        println!("{}", out.heading("Bootstrap complete"));
        println!("  files indexed:   {}", style(output.files_indexed).cyan());
        println!("  files skipped:   {}", output.files_skipped);
        println!("  symbols written: {}", output.symbols_written);
        println!("  edges written:   {}", output.edges_written);
        println!("  calls resolved:  {}", output.calls_resolved);
        if !report.failures.is_empty() {
            println!("  {} extraction failures:", style(report.failures.len()).yellow());
            for failure in &report.failures {
                println!("    {} {}: {}", style("×").red(), failure.path, failure.message);
            }
        }
    });

    Ok(())
}

pub(crate) fn spinner_if_interactive(out: &OutputMode, message: &str) -> Option<ProgressBar> {
    if out.json || out.quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Some(pb)
}
