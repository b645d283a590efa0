//! CLI commands.

pub mod benchmark;
pub mod bootstrap;
pub mod doctor;
pub mod export;
pub mod import;
pub mod provider;
pub mod query;
pub mod reindex;
pub mod status;
pub mod uninstall;

pub(crate) const DEFAULT_INCLUDE_GLOBS: &[&str] = &["**/*.rs"];
pub(crate) const DEFAULT_EXCLUDE_GLOBS: &[&str] = &["**/target/**", "**/.git/**"];

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
