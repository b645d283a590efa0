//! Fact Extraction: turns file contents into symbols and graph edges.
//!
//! Two backends implement [`FactExtractor`]: [`RustAnalyzerExtractor`]
//! (precise, LSP-backed) and [`HeuristicExtractor`] (coarse, always
//! available). Indexing prefers the former and falls back to the latter
//! when rust-analyzer cannot be started, recording which backend was used
//! on each [`crate::types::FileRecord`].

pub mod client;
mod heuristic;
pub mod protocol;
pub mod queries;
mod rust_analyzer;

pub use heuristic::HeuristicExtractor;
pub use rust_analyzer::RustAnalyzerExtractor;

use crate::error::Result;
use crate::object_id::ObjectId;
use crate::types::{GraphEdge, Symbol};

/// A call edge whose target could not be resolved locally (the callee
/// lives in another file). The Indexer resolves these after local facts
/// for every file in the batch have been written, using the store's
/// symbol-name table to find the callee's real id.
#[derive(Debug, Clone)]
pub struct UnresolvedCall {
    pub from: ObjectId,
    pub callee_path: String,
    pub callee_name: String,
}

/// Symbols and edges recovered from a single file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFacts {
    pub symbols: Vec<Symbol>,
    pub edges: Vec<GraphEdge>,
    pub unresolved_calls: Vec<UnresolvedCall>,
}

/// Something that can turn a file's content into facts about the code.
pub trait FactExtractor {
    /// Extracts symbols and edges from `content`, which is the contents
    /// of the file at `path` (workspace-relative).
    fn extract(&mut self, path: &str, content: &str) -> Result<ExtractedFacts>;
}
