//! `librarian status` — report index health and provider state.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use console::style;
use librarian_core::Librarian;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StatusOutput {
    index_version: u64,
    files_indexed: usize,
    symbols_indexed: usize,
    backend: String,
    offline: bool,
    provider: String,
}

pub fn run(workspace: &Path, out: &OutputMode) -> CliResult<()> {
    let librarian = Librarian::open(workspace)?;
    let status = librarian.status()?;

    let output = StatusOutput {
        index_version: status.index_version,
        files_indexed: status.files_indexed,
        symbols_indexed: status.symbols_indexed,
        backend: format!("{:?}", status.backend),
        offline: status.offline,
        provider: librarian.config().provider.name.clone(),
    };

    out.emit(&output, || {
        println!("{}", out.heading("Workspace status"));
        println!("  index version:    {}", output.index_version);
        println!("  files indexed:    {}", style(output.files_indexed).cyan());
        println!("  symbols indexed:  {}", output.symbols_indexed);
        println!("  extraction backend: {}", output.backend);
        println!("  provider:         {}", output.provider);
        if output.offline {
            println!("  {}", style("offline mode").yellow());
        }
    });

    Ok(())
}
