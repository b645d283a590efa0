//! Pack Assembler: turns ranked retrieval candidates into a token-budgeted
//! [`ContextPack`], caching the result against the index version it was
//! built from.

use crate::error::Result;
use crate::object_id::ObjectId;
use crate::store::Store;
use crate::types::{CodeSnippet, ContextPack, PackType};

/// A single piece of evidence the retriever judged relevant to a query,
/// ready for the assembler to fold into a pack.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Path of the file this candidate comes from.
    pub path: String,
    /// A short fact about the candidate, included verbatim in `key_facts`.
    pub fact: String,
    /// Optional source snippet to attach as a `CodeSnippet`.
    pub snippet: Option<CodeSnippet>,
    /// Ledger entry ids backing this candidate's fact.
    pub evidence_ids: Vec<u64>,
    /// Retriever-assigned relevance, used both for ranking and for the
    /// pack's overall confidence.
    pub score: f32,
}

/// Estimates token count using a chars/4 heuristic, matching the rough
/// tokenization ratio of common subword tokenizers on source code.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Computes an overall confidence for a pack from its selected
/// candidates' scores: the mean of the top selections, clamped into the
/// documented `[0.1, 0.95]` range so a pack is never reported as fully
/// certain or fully worthless.
fn aggregate_confidence(selected: &[&Candidate]) -> f32 {
    if selected.is_empty() {
        return 0.1;
    }
    let sum: f32 = selected.iter().map(|c| c.score).sum();
    let mean = sum / selected.len() as f32;
    mean.clamp(0.1, 0.95)
}

/// Assembles a [`ContextPack`] from ranked candidates within a token
/// budget, checking and populating the pack cache along the way.
///
/// `fingerprint` identifies the query (pack type + target + parameters);
/// a cached pack is reused only if it was built at the current index
/// version, since a stale cache entry could serve facts a later edit
/// invalidated. Concurrent callers assembling the same fingerprint are
/// single-flighted: only the first caller does the work, and later
/// callers wait for it to finish and reuse its result (see
/// [`Store::claim_pack_slot`]).
///
/// # Borrow Checker Notes
///
/// Candidates are collected and ranked before any store access beyond the
/// initial cache lookup, so we never hold a `Store` borrow across the
/// greedy-fill loop — the loop only touches its own `Vec`.
pub fn assemble_pack(
    store: &Store,
    fingerprint: &ObjectId,
    pack_type: PackType,
    target_id: ObjectId,
    summary: String,
    mut candidates: Vec<Candidate>,
    token_budget: usize,
    created_at: i64,
) -> Result<ContextPack> {
    let current_version = store.current_version()?;

    if let Some(cached) = store.get_cached_pack(fingerprint)? {
        if cached.index_version_at_build == current_version {
            return Ok(cached);
        }
    }

    let waited = store.claim_pack_slot(fingerprint);
    if waited {
        if let Some(cached) = store.get_cached_pack(fingerprint)? {
            if cached.index_version_at_build == store.current_version()? {
                store.release_pack_slot(fingerprint);
                return Ok(cached);
            }
        }
    }

    let result = assemble_pack_inner(
        store,
        fingerprint,
        pack_type,
        target_id,
        summary,
        &mut candidates,
        token_budget,
        created_at,
        current_version,
    );
    store.release_pack_slot(fingerprint);
    result
}

#[allow(clippy::too_many_arguments)]
fn assemble_pack_inner(
    store: &Store,
    fingerprint: &ObjectId,
    pack_type: PackType,
    target_id: ObjectId,
    summary: String,
    candidates: &mut [Candidate],
    token_budget: usize,
    created_at: i64,
    current_version: u64,
) -> Result<ContextPack> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let summary_tokens = estimate_tokens(&summary);
    let mut tokens_used = summary_tokens;
    let mut selected: Vec<&Candidate> = Vec::new();

    for candidate in &candidates {
        let mut candidate_tokens = estimate_tokens(&candidate.fact);
        if let Some(snippet) = &candidate.snippet {
            candidate_tokens += estimate_tokens(&snippet.text);
        }
        if tokens_used + candidate_tokens > token_budget {
            continue;
        }
        tokens_used += candidate_tokens;
        selected.push(candidate);
    }

    let confidence = aggregate_confidence(&selected);

    let mut key_facts = Vec::new();
    let mut related_files = Vec::new();
    let mut code_snippets = Vec::new();
    let mut evidence_ids = Vec::new();

    for candidate in &selected {
        key_facts.push(candidate.fact.clone());
        if !related_files.contains(&candidate.path) {
            related_files.push(candidate.path.clone());
        }
        if let Some(snippet) = &candidate.snippet {
            code_snippets.push(snippet.clone());
        }
        for id in &candidate.evidence_ids {
            if !evidence_ids.contains(id) {
                evidence_ids.push(*id);
            }
        }
    }

    let pack_id = compute_pack_id(pack_type, &target_id, &summary, &key_facts);

    let pack = ContextPack {
        pack_id,
        pack_type,
        target_id,
        summary,
        key_facts,
        related_files,
        code_snippets,
        confidence,
        evidence_ids,
        created_at,
        index_version_at_build: current_version,
    };

    store.put_cached_pack(fingerprint, &target_id, &pack)?;

    Ok(pack)
}

fn compute_pack_id(
    pack_type: PackType,
    target_id: &ObjectId,
    summary: &str,
    key_facts: &[String],
) -> ObjectId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[pack_type as u8]);
    hasher.update(target_id.as_bytes());
    hasher.update(summary.as_bytes());
    for fact in key_facts {
        hasher.update(fact.as_bytes());
    }
    ObjectId::from_bytes(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn candidate(path: &str, fact: &str, score: f32) -> Candidate {
        Candidate {
            path: path.to_string(),
            fact: fact.to_string(),
            snippet: None,
            evidence_ids: vec![1],
            score,
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("1234"), 1);
        assert_eq!(estimate_tokens("12345678"), 2);
        assert_eq!(estimate_tokens("hello world"), 2);
    }

    #[test]
    fn test_aggregate_confidence_clamps_range() {
        let a = candidate("a.rs", "fact one", 2.0);
        let b = candidate("b.rs", "fact two", -1.0);
        assert_eq!(aggregate_confidence(&[&a]), 0.95);
        assert_eq!(aggregate_confidence(&[&b]), 0.1);
    }

    #[test]
    fn test_aggregate_confidence_empty_is_floor() {
        assert_eq!(aggregate_confidence(&[]), 0.1);
    }

    #[test]
    fn assemble_pack_respects_budget_and_caches() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let target = ObjectId::from_bytes([9; 32]);
        let fingerprint = ObjectId::from_bytes([8; 32]);

        let candidates = vec![
            candidate("src/a.rs", "defines foo", 0.9),
            candidate("src/b.rs", "a much longer fact that costs many many tokens to include here and should overflow the tiny budget we set for this test case", 0.8),
        ];

        let pack = assemble_pack(
            &store,
            &fingerprint,
            PackType::SymbolLookup,
            target,
            "foo summary".to_string(),
            candidates,
            10,
            1000,
        )
        .unwrap();

        assert_eq!(pack.key_facts, vec!["defines foo".to_string()]);
        assert_eq!(pack.index_version_at_build, 0);

        let cached = store.get_cached_pack(&fingerprint).unwrap();
        assert!(cached.is_some());
    }
}
