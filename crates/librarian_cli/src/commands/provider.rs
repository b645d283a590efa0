//! `librarian provider use|list|current` — inspect and switch the
//! embedding/LLM provider. The only provider this build ships is the
//! offline feature-hashing embedder; the subcommand still exists so
//! scripts written against the documented CLI surface work unchanged
//! if a networked provider is added later.

use crate::cli_error::{CliError, CliResult};
use crate::output::OutputMode;
use librarian_core::Librarian;
use serde::Serialize;
use std::path::Path;

const KNOWN_PROVIDERS: &[&str] = &["local-hashing"];

pub fn list(out: &OutputMode) {
    out.emit(KNOWN_PROVIDERS, || {
        println!("{}", out.heading("Known providers"));
        for name in KNOWN_PROVIDERS {
            println!("  {}", name);
        }
    });
}

#[derive(Serialize)]
struct CurrentOutput {
    name: String,
    offline: bool,
}

pub fn current(workspace: &Path, out: &OutputMode) -> CliResult<()> {
    let librarian = Librarian::open(workspace)?;
    let output = CurrentOutput {
        name: librarian.config().provider.name.clone(),
        offline: librarian.config().provider.offline,
    };
    out.emit(&output, || {
        println!("{}", out.heading("Current provider"));
        println!("  name:    {}", output.name);
        println!("  offline: {}", output.offline);
    });
    Ok(())
}

pub fn use_provider(workspace: &Path, name: String, out: &OutputMode) -> CliResult<()> {
    if !KNOWN_PROVIDERS.contains(&name.as_str()) {
        return Err(CliError::Librarian(librarian_core::LibrarianError::InvalidArgument(format!(
            "unknown provider '{name}'; known providers: {}",
            KNOWN_PROVIDERS.join(", ")
        ))));
    }

    let librarian = Librarian::open(workspace)?;
    let mut config = librarian.config().clone();
    config.provider.name = name.clone();
    config.save(librarian.librarian_dir())?;

    out.emit(&serde_json::json!({ "provider": name }), || {
        println!("{}", out.heading("Provider switched"));
        println!("  now using: {}", name);
    });
    Ok(())
}
