//! `librarian export` — bundle a workspace's `.librarian` directory
//! into a single portable archive.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use librarian_core::Librarian;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ExportOutput {
    output_path: PathBuf,
    entry_count: usize,
    total_bytes: u64,
}

pub fn run(workspace: &Path, output_path: PathBuf, out: &OutputMode) -> CliResult<()> {
    let librarian = Librarian::open(workspace)?;
    let timestamp = super::now_unix();
    let manifest = librarian.export(&output_path, timestamp)?;

    let output = ExportOutput {
        output_path: output_path.clone(),
        entry_count: manifest.entry_count,
        total_bytes: manifest.total_bytes,
    };
    out.emit(&output, || {
        println!("{}", out.heading("Export complete"));
        println!("  archive: {}", output.output_path.display());
        println!("  entries: {}", output.entry_count);
        println!("  bytes:   {}", output.total_bytes);
    });

    Ok(())
}
