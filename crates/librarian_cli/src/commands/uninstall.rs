//! `librarian uninstall` — remove a workspace's `.librarian` directory.

use crate::cli_error::{CliError, CliResult};
use crate::output::OutputMode;
use std::path::Path;

pub fn run(workspace: &Path, yes: bool, out: &OutputMode) -> CliResult<()> {
    if !yes {
        return Err(CliError::Other(anyhow::anyhow!(
            "uninstall is destructive; pass --yes to confirm"
        )));
    }

    librarian_core::uninstall(workspace)?;

    out.emit(&serde_json::json!({ "uninstalled": true }), || {
        println!("{}", out.heading("Workspace uninstalled"));
    });

    Ok(())
}
