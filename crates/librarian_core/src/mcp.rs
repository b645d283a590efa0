//! Minimal MCP-style tool surface: `semantic_search`, `get_context_pack`,
//! `status`, each taking a workspace path and returning the JSON
//! envelope `{tool, success, ..payload, isError?}` agents can consume
//! without depending on `librarian_core`'s Rust types directly.
//!
//! This sits outside the four core subsystems; it's a thin adapter over
//! [`crate::engine::Librarian`] and [`crate::retriever::retrieve`].

use crate::coordinator::QueryRequest;
use crate::engine::Librarian;
use crate::retriever::{self, MatchKind, RankedCandidate};
use serde::Serialize;
use serde_json::{json, Value};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_SEARCH_DEPTH: u32 = 1;

fn ok_envelope(tool: &str, payload: Value) -> Value {
    let mut envelope = json!({ "tool": tool, "success": true });
    if let Value::Object(map) = payload {
        envelope.as_object_mut().unwrap().extend(map);
    }
    envelope
}

fn error_envelope(tool: &str, message: impl std::fmt::Display) -> Value {
    json!({ "tool": tool, "success": false, "isError": true, "error": message.to_string() })
}

#[derive(Serialize)]
struct SearchHit {
    canonical_name: String,
    path: String,
    kind: String,
    score: f32,
    matched_by: &'static str,
}

impl From<&RankedCandidate> for SearchHit {
    fn from(c: &RankedCandidate) -> Self {
        Self {
            canonical_name: c.symbol.canonical_name.clone(),
            path: c.symbol.path.clone(),
            kind: format!("{:?}", c.symbol.kind),
            score: c.score,
            matched_by: match c.matched_by {
                MatchKind::ExactName => "exact_name",
                MatchKind::Structural => "structural",
                MatchKind::Semantic => "semantic",
                MatchKind::TermMatch => "term_match",
            },
        }
    }
}

/// Ranks symbols against `query` without assembling a full context pack.
/// Uses whatever embedder the workspace is configured with, falling back
/// to term matching when none is enabled, exactly as the Retriever does
/// for the `query` command.
pub fn semantic_search(workspace: &str, query: &str, limit: Option<usize>) -> Value {
    let tool = "semantic_search";
    let librarian = match Librarian::open(workspace) {
        Ok(l) => l,
        Err(e) => return error_envelope(tool, e),
    };
    let embedder = librarian.embedder();
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    match retriever::retrieve(librarian.store(), query, DEFAULT_SEARCH_DEPTH, limit, embedder.as_deref()) {
        Ok(ranked) => {
            let hits: Vec<SearchHit> = ranked.candidates.iter().map(SearchHit::from).collect();
            ok_envelope(tool, json!({ "hits": hits, "confidence": ranked.confidence }))
        }
        Err(e) => error_envelope(tool, e),
    }
}

/// Runs a query through the full Coordinator and returns the resulting
/// context pack, same as `librarian query` but as a JSON envelope.
pub fn get_context_pack(
    workspace: &str,
    query: &str,
    token_budget: Option<usize>,
    release_critical: bool,
    created_at: i64,
) -> Value {
    let tool = "get_context_pack";
    let librarian = match Librarian::open(workspace) {
        Ok(l) => l,
        Err(e) => return error_envelope(tool, e),
    };
    let request = QueryRequest {
        query: query.to_string(),
        token_budget: token_budget.unwrap_or(4000),
        release_critical,
    };
    match librarian.query(&request, created_at) {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(Value::Object(map)) => ok_envelope(tool, Value::Object(map)),
            Ok(other) => ok_envelope(tool, json!({ "response": other })),
            Err(e) => error_envelope(tool, e),
        },
        Err(e) => error_envelope(tool, e),
    }
}

/// Reports index health and provider state, same data as `librarian
/// status` but as a JSON envelope.
pub fn status(workspace: &str) -> Value {
    let tool = "status";
    let librarian = match Librarian::open(workspace) {
        Ok(l) => l,
        Err(e) => return error_envelope(tool, e),
    };
    match librarian.status() {
        Ok(report) => ok_envelope(
            tool,
            json!({
                "index_version": report.index_version,
                "files_indexed": report.files_indexed,
                "symbols_indexed": report.symbols_indexed,
                "backend": format!("{:?}", report.backend),
                "offline": report.offline,
            }),
        ),
        Err(e) => error_envelope(tool, e),
    }
}
