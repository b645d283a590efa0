//! `librarian doctor` — check store health and reclaim quarantined files.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use console::style;
use librarian_core::Librarian;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct DoctorOutput {
    store_openable: bool,
    quarantined_files_found: Vec<PathBuf>,
    quarantined_files_purged: Vec<PathBuf>,
}

pub fn run(workspace: &Path, purge_quarantine: bool, out: &OutputMode) -> CliResult<()> {
    let librarian = Librarian::open(workspace)?;
    let report = librarian.doctor(purge_quarantine)?;

    let output = DoctorOutput {
        store_openable: report.store_openable,
        quarantined_files_found: report.quarantined_files_found,
        quarantined_files_purged: report.quarantined_files_purged,
    };

    out.emit(&output, || {
        println!("{}", out.heading("Doctor report"));
        let mark = if output.store_openable { style("✓").green() } else { style("×").red() };
        println!("  {} store opens cleanly", mark);
        if output.quarantined_files_found.is_empty() {
            println!("  no quarantined files");
        } else {
            println!("  {} quarantined file(s) found:", output.quarantined_files_found.len());
            for path in &output.quarantined_files_found {
                println!("    {}", path.display());
            }
            if purge_quarantine {
                println!("  {} purged", output.quarantined_files_purged.len());
            } else {
                println!("  run with --purge-quarantine to reclaim them");
            }
        }
    });

    Ok(())
}
