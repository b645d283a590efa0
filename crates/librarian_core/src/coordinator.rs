//! Query Coordinator: classifies query intent, drives Retriever
//! escalation across depths, applies policy gates, and hands the result
//! to the Pack Assembler.
//!
//! Intent classification follows a phrase-pattern-matching idiom:
//! check the most specific patterns first, default to the safest
//! catch-all when nothing matches.

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{LibrarianError, Result};
use crate::ledger;
use crate::object_id::ObjectId;
use crate::object_store::ObjectStore;
use crate::pack::{self, Candidate};
use crate::retriever::{self, RankedCandidate};
use crate::store::Store;
use crate::types::{CodeSnippet, ContextPack, PackType};
use serde::Serialize;
use tracing::debug;

/// Classification of a query's intent, driving both ranking strategy and
/// the resulting pack's [`PackType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryIntent {
    /// A specific, named symbol.
    Lookup,
    /// A broader "how/why does this work" question about a subsystem.
    Explain,
    /// Who calls, or what is called by, a given symbol.
    TraceCalls,
    /// An open-ended search with no single clear target.
    BroadSearch,
}

impl QueryIntent {
    pub fn to_pack_type(self) -> PackType {
        match self {
            Self::Lookup => PackType::SymbolLookup,
            Self::Explain => PackType::Explanation,
            Self::TraceCalls => PackType::CallTrace,
            Self::BroadSearch => PackType::BroadSearch,
        }
    }
}

/// Classifies a query's intent from phrasing. Checks the most specific
/// patterns first; falls back to `Lookup`, the narrowest and cheapest
/// strategy, when nothing matches.
pub fn classify_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();

    const TRACE_CALLS_PATTERNS: &[&str] = &[
        "who calls",
        "what calls",
        "callers of",
        "caller of",
        "call graph",
        "call chain",
        "trace calls",
        "what does this call",
        "calls into",
    ];
    for pattern in TRACE_CALLS_PATTERNS {
        if lower.contains(pattern) {
            return QueryIntent::TraceCalls;
        }
    }

    const EXPLAIN_PATTERNS: &[&str] = &[
        "explain",
        "how does",
        "why does",
        "what does",
        "describe",
        "walk me through",
        "how is",
    ];
    for pattern in EXPLAIN_PATTERNS {
        if lower.contains(pattern) {
            return QueryIntent::Explain;
        }
    }

    const BROAD_SEARCH_PATTERNS: &[&str] = &[
        "find all",
        "search for",
        "everywhere",
        "across the codebase",
        "anywhere",
        "list all",
    ];
    for pattern in BROAD_SEARCH_PATTERNS {
        if lower.contains(pattern) {
            return QueryIntent::BroadSearch;
        }
    }

    let word_count = query.split_whitespace().count();
    if word_count > 6 {
        return QueryIntent::BroadSearch;
    }

    QueryIntent::Lookup
}

/// Retrieval depth the Coordinator is permitted to escalate across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Depth {
    L0,
    L1,
    L2,
}

impl Depth {
    fn from_level(level: u32) -> Self {
        match level {
            0 => Depth::L0,
            1 => Depth::L1,
            _ => Depth::L2,
        }
    }

    fn graph_depth(self) -> u32 {
        match self {
            Depth::L0 => 0,
            Depth::L1 => 1,
            Depth::L2 => 2,
        }
    }

    /// Minimum confidence required to stop escalating at this depth.
    /// Shallower depths demand a higher bar, since escalation is cheap
    /// relative to returning an ambiguous answer from a narrow search.
    fn confidence_threshold(self, min_confidence: f32) -> f32 {
        match self {
            Depth::L0 => (min_confidence + 0.3).min(0.9),
            Depth::L1 => (min_confidence + 0.15).min(0.9),
            Depth::L2 => min_confidence,
        }
    }
}

/// Severity ordering for [`Warning`]s: critical conditions (degraded
/// storage, unavailable synthesis) must precede mere coverage gaps in
/// any user-facing rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WarningSeverity {
    Critical = 0,
    CoverageGap = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub severity: WarningSeverity,
    pub message: String,
}

/// A query submitted to the Coordinator.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub token_budget: usize,
    /// When true, the query is treated as release-critical: the best
    /// candidate must be backed by at least one non-stale ledger claim,
    /// or the query fails validation rather than returning an unverified
    /// answer.
    pub release_critical: bool,
}

/// Result of coordinating a query end to end.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub pack: ContextPack,
    pub intent: QueryIntent,
    pub depth_reached: Depth,
    /// Ordered so critical warnings precede coverage-gap warnings.
    pub warnings: Vec<Warning>,
}

/// Runs a query through classification, escalating retrieval, policy
/// gates, and pack assembly.
pub fn coordinate(
    store: &Store,
    object_store: &ObjectStore,
    config: &Config,
    request: &QueryRequest,
    embedder: Option<&dyn EmbeddingService>,
    created_at: i64,
) -> Result<QueryResponse> {
    if request.query.trim().is_empty() {
        return Err(LibrarianError::InvalidArgument("query must not be empty".to_string()));
    }

    let intent = classify_intent(&request.query);
    let mut warnings = Vec::new();

    if config.provider.offline {
        warnings.push(Warning {
            severity: WarningSeverity::Critical,
            message: "provider offline: synthesis unavailable, ranking limited to structural/term signals"
                .to_string(),
        });
    }

    let max_level = config.retrieval.max_depth.min(2);
    let mut ranked = retriever::retrieve(store, &request.query, 0, 20, embedder)?;
    let mut depth_reached = Depth::L0;

    for level in 1..=max_level {
        let depth = Depth::from_level(level - 1);
        let threshold = depth.confidence_threshold(config.retrieval.min_confidence);
        if ranked.confidence >= threshold {
            break;
        }
        debug!(level, confidence = ranked.confidence, "escalating retrieval depth");
        let next_depth = Depth::from_level(level);
        ranked = retriever::retrieve(store, &request.query, next_depth.graph_depth(), 20, embedder)?;
        depth_reached = next_depth;
    }

    let final_threshold = depth_reached.confidence_threshold(config.retrieval.min_confidence);
    if ranked.confidence < final_threshold {
        warnings.push(Warning {
            severity: WarningSeverity::CoverageGap,
            message: format!(
                "retrieval confidence {:.2} below target at max depth; results may be incomplete",
                ranked.confidence
            ),
        });
    }

    if request.release_critical {
        if let Some(best) = ranked.candidates.first() {
            if !has_fresh_claim(store, best.symbol.id, config.ledger.min_staleness_confidence)? {
                return Err(LibrarianError::ValidationFailed(format!(
                    "release-critical query requires a non-stale evidence claim for `{}`, none found",
                    best.symbol.canonical_name
                )));
            }
        }
    }

    warnings.sort_by_key(|w| w.severity);

    let target_id = ranked.candidates.first().map(|c| c.symbol.id).unwrap_or_else(|| ObjectId::from_bytes([0; 32]));
    let candidates = build_pack_candidates(store, object_store, &ranked.candidates)?;
    let fingerprint = compute_fingerprint(intent, &ranked.candidates, store.current_version()?, request.token_budget);
    let summary = format!("{} result(s) for \"{}\"", ranked.candidates.len(), request.query);

    let pack = pack::assemble_pack(
        store,
        &fingerprint,
        intent.to_pack_type(),
        target_id,
        summary,
        candidates,
        request.token_budget,
        created_at,
    )?;

    Ok(QueryResponse { pack, intent, depth_reached, warnings })
}

fn has_fresh_claim(store: &Store, subject: ObjectId, min_staleness_confidence: f32) -> Result<bool> {
    for entry_id in store.ledger_entries_for_subject(&subject)? {
        if let Some(claim) = ledger::get_claim(store, subject, entry_id, min_staleness_confidence)? {
            if !claim.is_stale() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn build_pack_candidates(
    store: &Store,
    object_store: &ObjectStore,
    ranked: &[RankedCandidate],
) -> Result<Vec<Candidate>> {
    let mut out = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        let fact = format!(
            "`{}` ({:?}) in {}, matched via {:?}",
            candidate.symbol.canonical_name, candidate.symbol.kind, candidate.symbol.path, candidate.matched_by
        );
        let snippet = read_snippet(store, object_store, candidate)?;
        out.push(Candidate {
            path: candidate.symbol.path.clone(),
            fact,
            snippet,
            evidence_ids: store.ledger_entries_for_subject(&candidate.symbol.id)?,
            score: candidate.score,
        });
    }
    Ok(out)
}

fn read_snippet(store: &Store, object_store: &ObjectStore, candidate: &RankedCandidate) -> Result<Option<CodeSnippet>> {
    let Some(file) = store.get_file(&candidate.symbol.path)? else {
        return Ok(None);
    };
    let Ok(content) = object_store.get_blob(file.content_id) else {
        return Ok(None);
    };
    let span = &candidate.symbol.span;
    let start = span.start_byte as usize;
    let end = (span.end_byte as usize).min(content.len());
    if start >= end {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&content[start..end]).into_owned();
    Ok(Some(CodeSnippet { path: candidate.symbol.path.clone(), text, span: span.clone() }))
}

fn compute_fingerprint(
    intent: QueryIntent,
    candidates: &[RankedCandidate],
    index_version: u64,
    token_budget: usize,
) -> ObjectId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[intent.to_pack_type() as u8]);
    for candidate in candidates {
        hasher.update(candidate.symbol.id.as_bytes());
    }
    hasher.update(&index_version.to_le_bytes());
    hasher.update(&(token_budget as u64).to_le_bytes());
    ObjectId::from_bytes(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_trace_calls_takes_priority_over_explain() {
        assert_eq!(classify_intent("who calls process_request and why does it exist"), QueryIntent::TraceCalls);
    }

    #[test]
    fn classify_explain_for_how_does_questions() {
        assert_eq!(classify_intent("how does the retriever rank candidates"), QueryIntent::Explain);
    }

    #[test]
    fn classify_broad_search_for_find_all() {
        assert_eq!(classify_intent("find all usages of EdgeKind"), QueryIntent::BroadSearch);
    }

    #[test]
    fn classify_lookup_is_default_for_short_named_query() {
        assert_eq!(classify_intent("process_request"), QueryIntent::Lookup);
    }

    #[test]
    fn empty_query_is_rejected_before_touching_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let object_store = ObjectStore::new(tmp.path().join("objects"));
        let config = Config::default();
        let request = QueryRequest { query: "   ".to_string(), token_budget: 1000, release_critical: false };

        let result = coordinate(&store, &object_store, &config, &request, None, 0);
        assert!(matches!(result, Err(LibrarianError::InvalidArgument(_))));
    }

    #[test]
    fn warnings_are_ordered_critical_before_coverage_gap() {
        let mut warnings = vec![
            Warning { severity: WarningSeverity::CoverageGap, message: "gap".to_string() },
            Warning { severity: WarningSeverity::Critical, message: "critical".to_string() },
        ];
        warnings.sort_by_key(|w| w.severity);
        assert_eq!(warnings[0].severity, WarningSeverity::Critical);
    }

    #[test]
    fn release_critical_query_fails_without_fresh_evidence() {
        use crate::types::{Span, Symbol, SymbolKind};

        let tmp = tempfile::tempdir().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let object_store = ObjectStore::new(tmp.path().join("objects"));
        let config = Config::default();

        let symbol = Symbol {
            id: Symbol::compute_id("src/lib.rs", "critical_symbol", "fn()"),
            path: "src/lib.rs".to_string(),
            canonical_name: "critical_symbol".to_string(),
            kind: SymbolKind::Function,
            signature_shape: "fn()".to_string(),
            span: Span { start_byte: 0, end_byte: 1, start_line: 0, start_col: 0, end_line: 0, end_col: 1 },
            last_seen_version: 1,
        };

        let txn = store.begin().unwrap();
        txn.put_symbol(&symbol).unwrap();
        txn.commit().unwrap();

        let request = QueryRequest {
            query: "critical_symbol".to_string(),
            token_budget: 1000,
            release_critical: true,
        };

        let result = coordinate(&store, &object_store, &config, &request, None, 0);
        assert!(matches!(result, Err(LibrarianError::ValidationFailed(_))));
    }
}
