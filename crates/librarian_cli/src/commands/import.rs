//! `librarian import` — unpack an archive produced by `export` into a
//! target workspace.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ImportOutput {
    target_workspace: PathBuf,
    files_written: usize,
    total_bytes: u64,
}

pub fn run(archive_path: &Path, target_workspace: PathBuf, out: &OutputMode) -> CliResult<()> {
    let report = librarian_core::import_workspace(archive_path, &target_workspace)?;

    let output = ImportOutput {
        target_workspace: target_workspace.clone(),
        files_written: report.files_written,
        total_bytes: report.total_bytes,
    };
    out.emit(&output, || {
        println!("{}", out.heading("Import complete"));
        println!("  workspace:     {}", output.target_workspace.display());
        println!("  files written: {}", output.files_written);
        println!("  bytes:         {}", output.total_bytes);
    });

    Ok(())
}
