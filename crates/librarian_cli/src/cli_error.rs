//! Maps [`librarian_core::LibrarianError`] to the CLI's documented exit
//! code family. Errors that don't originate in `librarian_core` (clap
//! parse failures, I/O outside the workspace, etc.) fall back to the
//! generic-failure exit code.

use librarian_core::LibrarianError;
use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Librarian(LibrarianError),
    Other(anyhow::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Librarian(e) => write!(f, "{e}"),
            CliError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl From<LibrarianError> for CliError {
    fn from(e: LibrarianError) -> Self {
        CliError::Librarian(e)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Other(e)
    }
}

impl CliError {
    /// The documented exit-code family name (`INVALID_ARGUMENT`, etc.),
    /// or `GENERIC_FAILURE` for anything not raised by `librarian_core`.
    pub fn exit_code_name(&self) -> &'static str {
        match self {
            CliError::Librarian(e) => e.exit_code_name(),
            CliError::Other(_) => "GENERIC_FAILURE",
        }
    }

    /// Numeric process exit code for the family.
    pub fn exit_code(&self) -> i32 {
        match self.exit_code_name() {
            "INVALID_ARGUMENT" => 2,
            "NOT_BOOTSTRAPPED" => 3,
            "VALIDATION_FAILED" => 4,
            "PROVIDER_UNAVAILABLE" => 5,
            "STORAGE_CORRUPT" => 6,
            _ => 1,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Librarian(e) => e.recovery_suggestion(),
            CliError::Other(_) => None,
        }
    }
}

pub type CliResult<T> = std::result::Result<T, CliError>;
