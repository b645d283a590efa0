//! E2E test harness for the Librarian.

#![allow(dead_code)]

pub mod workspace;

pub use workspace::TestWorkspace;
