//! Shared output plumbing: in `--json` mode stdout carries exactly one
//! JSON document and nothing else; otherwise a human-readable rendering
//! goes to stdout via the closure the caller supplies.

use console::style;
use serde::Serialize;

pub struct OutputMode {
    pub json: bool,
    pub no_color: bool,
    pub quiet: bool,
}

impl OutputMode {
    /// Renders `value` as the sole JSON document on stdout, or runs
    /// `human` to print a human-readable rendering.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) {
        if self.json {
            match serde_json::to_string(value) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("failed to serialize output: {e}"),
            }
        } else if !self.quiet {
            human();
        }
    }

    pub fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            style(text).bold().to_string()
        }
    }
}
