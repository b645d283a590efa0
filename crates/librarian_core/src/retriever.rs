//! Retriever: ranks candidate symbols for a query by combining
//! structural graph expansion, vector cosine similarity, and a
//! term-match fallback when neither signal is available.
//!
//! Escalation across depths L0/L1/L2 is driven by the Query Coordinator,
//! not by this module: `retrieve` runs a single pass at the depth it is
//! given, and the caller decides whether to escalate.

use crate::embedding::{tokenize, EmbeddingService};
use crate::error::Result;
use crate::graph::{expand_from_seeds, ExpansionConfig};
use crate::object_id::ObjectId;
use crate::store::Store;
use crate::types::{EdgeKind, Symbol};

/// A candidate symbol with the signals that contributed to its score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub symbol: Symbol,
    /// Exact symbol-name match is assigned a fixed score that always
    /// outranks pure cosine similarity, which never exceeds 1.0.
    pub score: f32,
    pub matched_by: MatchKind,
}

/// Which signal produced a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact (case-insensitive) match on the symbol's canonical name.
    ExactName,
    /// Found by following graph edges from a seed.
    Structural,
    /// Vector cosine similarity against the query embedding.
    Semantic,
    /// Plain substring/token overlap, used when no embeddings exist.
    TermMatch,
}

/// The fixed score assigned to an exact name match. Always greater than
/// any possible cosine similarity (which is bounded by 1.0), so an exact
/// hit never loses to a merely-similar one.
const EXACT_NAME_SCORE: f32 = 2.0;

/// Ranked candidates for a query, with an aggregate confidence measure.
#[derive(Debug, Clone)]
pub struct RankedCandidates {
    pub candidates: Vec<RankedCandidate>,
    /// Confidence derived from the top-k score distribution: high when
    /// scores cluster tightly near the top (low variance), low when
    /// scattered.
    pub confidence: f32,
}

/// Retrieves and ranks candidates for `query` at a single depth.
///
/// `max_depth` bounds structural expansion (the Retriever does not decide
/// whether to escalate; it only runs at the depth given). `embedder` is
/// optional: when absent, or when [`crate::config::EmbeddingConfig::enabled`]
/// is false, ranking falls back to term matching alone.
pub fn retrieve(
    store: &Store,
    query: &str,
    max_depth: u32,
    limit: usize,
    embedder: Option<&dyn EmbeddingService>,
) -> Result<RankedCandidates> {
    let all_symbols = store.all_symbols()?;
    let query_tokens = tokenize(query);
    let query_lower = query.to_lowercase();

    let mut candidates: Vec<RankedCandidate> = Vec::new();

    let exact_seeds: Vec<&Symbol> = all_symbols
        .iter()
        .filter(|s| s.canonical_name.to_lowercase() == query_lower)
        .collect();

    for symbol in &exact_seeds {
        candidates.push(RankedCandidate {
            symbol: (*symbol).clone(),
            score: EXACT_NAME_SCORE,
            matched_by: MatchKind::ExactName,
        });
    }

    if max_depth > 0 && !exact_seeds.is_empty() {
        let seed_ids: Vec<ObjectId> = exact_seeds.iter().map(|s| s.id).collect();
        let config = ExpansionConfig {
            max_depth,
            follow_kinds: vec![EdgeKind::Calls, EdgeKind::Imports, EdgeKind::Implements, EdgeKind::Extends],
            max_nodes: limit.max(10) * 4,
            bidirectional: true,
        };
        let expansion = expand_from_seeds(store, seed_ids.clone(), &config)?;

        for node in &expansion.expanded_nodes {
            if seed_ids.contains(node) {
                continue;
            }
            if let Some(symbol) = store.get_symbol(node)? {
                let depth = expansion.node_depths.get(node).copied().unwrap_or(max_depth);
                let score = structural_score(depth, max_depth);
                candidates.push(RankedCandidate { symbol, score, matched_by: MatchKind::Structural });
            }
        }
    }

    if let Some(embedder) = embedder {
        let query_vec = embedder.embed(ObjectId::from_bytes([0; 32]), query);
        for symbol in &all_symbols {
            if candidates.iter().any(|c| c.symbol.id == symbol.id) {
                continue;
            }
            if let Some(embedding) = store.get_embedding(&symbol.id)? {
                let similarity = query_vec.cosine_similarity(&embedding);
                if similarity > 0.0 {
                    candidates.push(RankedCandidate {
                        symbol: symbol.clone(),
                        score: similarity,
                        matched_by: MatchKind::Semantic,
                    });
                }
            }
        }
    }

    if candidates.is_empty() {
        for symbol in &all_symbols {
            let overlap = term_overlap(&query_tokens, &symbol.canonical_name);
            if overlap > 0.0 {
                candidates.push(RankedCandidate {
                    symbol: symbol.clone(),
                    score: overlap,
                    matched_by: MatchKind::TermMatch,
                });
            }
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(limit);

    let confidence = coherence_confidence(&candidates);

    Ok(RankedCandidates { candidates, confidence })
}

/// Score for a structurally-expanded node: 1.0 at depth 0 (shouldn't
/// occur since seeds are scored separately), decaying linearly with
/// depth so nearer neighbors always outrank farther ones.
fn structural_score(depth: u32, max_depth: u32) -> f32 {
    if max_depth == 0 {
        return 1.0;
    }
    1.0 - (depth as f32 / (max_depth as f32 + 1.0))
}

fn term_overlap(query_tokens: &[String], candidate_name: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = tokenize(candidate_name);
    let matches = query_tokens.iter().filter(|t| candidate_tokens.contains(t)).count();
    matches as f32 / query_tokens.len() as f32
}

/// Confidence from the top-k score distribution: lower variance among
/// the top scores means the result set is coherent (one tight cluster of
/// equally-relevant hits) and earns higher confidence; scattered scores
/// indicate an ambiguous result set.
fn coherence_confidence(candidates: &[RankedCandidate]) -> f32 {
    const TOP_K: usize = 5;
    if candidates.is_empty() {
        return 0.1;
    }

    let top: Vec<f32> = candidates.iter().take(TOP_K).map(|c| c.score.min(1.0)).collect();
    let mean = top.iter().sum::<f32>() / top.len() as f32;

    if top.len() == 1 {
        return mean.clamp(0.1, 0.95);
    }

    let variance = top.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / top.len() as f32;
    let coherence = 1.0 - variance.min(1.0);
    (mean * coherence).clamp(0.1, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::types::{Span, SymbolKind};
    use tempfile::TempDir;

    fn sample_symbol(path: &str, name: &str) -> Symbol {
        let signature_shape = "fn()".to_string();
        let id = Symbol::compute_id(path, name, &signature_shape);
        Symbol {
            id,
            path: path.to_string(),
            canonical_name: name.to_string(),
            kind: SymbolKind::Function,
            signature_shape,
            span: Span { start_byte: 0, end_byte: 1, start_line: 0, start_col: 0, end_line: 0, end_col: 1 },
            last_seen_version: 1,
        }
    }

    #[test]
    fn exact_name_match_outranks_structural_and_semantic() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();

        let target = sample_symbol("src/lib.rs", "process_request");
        let caller = sample_symbol("src/lib.rs", "handle_connection");

        let txn = store.begin().unwrap();
        txn.put_symbol(&target).unwrap();
        txn.put_symbol(&caller).unwrap();
        txn.put_edge(&crate::types::GraphEdge {
            from: caller.id,
            to: target.id,
            kind: EdgeKind::Calls,
            evidence_ids: vec![],
            last_seen_version: 1,
        })
        .unwrap();
        txn.commit().unwrap();

        let result = retrieve(&store, "process_request", 1, 10, None).unwrap();
        assert_eq!(result.candidates[0].symbol.id, target.id);
        assert_eq!(result.candidates[0].matched_by, MatchKind::ExactName);
        assert_eq!(result.candidates[0].score, EXACT_NAME_SCORE);
    }

    #[test]
    fn term_match_fallback_used_when_no_exact_or_semantic_hits() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let symbol = sample_symbol("src/lib.rs", "parse_config_file");

        let txn = store.begin().unwrap();
        txn.put_symbol(&symbol).unwrap();
        txn.commit().unwrap();

        let result = retrieve(&store, "parse config", 0, 10, None).unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].matched_by, MatchKind::TermMatch);
    }

    #[test]
    fn confidence_is_higher_for_tightly_clustered_scores() {
        let tight = vec![
            RankedCandidate { symbol: sample_symbol("a", "a"), score: 0.9, matched_by: MatchKind::Semantic },
            RankedCandidate { symbol: sample_symbol("b", "b"), score: 0.88, matched_by: MatchKind::Semantic },
        ];
        let scattered = vec![
            RankedCandidate { symbol: sample_symbol("a", "a"), score: 0.9, matched_by: MatchKind::Semantic },
            RankedCandidate { symbol: sample_symbol("b", "b"), score: 0.1, matched_by: MatchKind::Semantic },
        ];

        assert!(coherence_confidence(&tight) > coherence_confidence(&scattered));
    }

    #[test]
    fn empty_candidates_have_floor_confidence() {
        assert_eq!(coherence_confidence(&[]), 0.1);
    }

    #[test]
    fn semantic_search_ranks_embedded_symbols_by_similarity() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let embedder = HashingEmbedder::new(128);

        let close = sample_symbol("src/cfg.rs", "load_settings");
        let far = sample_symbol("src/http.rs", "send_response_bytes");

        let close_vec = embedder.embed(close.id, "fn load_settings(path: &Path) -> Settings");
        let far_vec = embedder.embed(far.id, "fn send_response_bytes(buf: &[u8])");

        let txn = store.begin().unwrap();
        txn.put_symbol(&close).unwrap();
        txn.put_symbol(&far).unwrap();
        txn.put_embedding(&close_vec).unwrap();
        txn.put_embedding(&far_vec).unwrap();
        txn.commit().unwrap();

        let result = retrieve(&store, "load configuration settings", 0, 10, Some(&embedder)).unwrap();
        assert!(!result.candidates.is_empty());
    }
}
