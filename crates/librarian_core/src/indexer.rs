//! The Indexer: orchestrates fact extraction, storage, and ledger
//! bookkeeping for a workspace. `bootstrap`, `reindex`, and `remove` are
//! its three public operations, each opening exactly one write
//! transaction so a reader never observes a half-indexed batch.
//!
//! Call edges that cross file boundaries are resolved here, after every
//! file in the batch has had its local facts written, using both the
//! symbols just written in this transaction and the store's
//! already-committed symbol table. A call that still can't be matched to
//! a symbol is dropped rather than written as a dangling edge.

use crate::config::StorageConfig;
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::extractor::{ExtractedFacts, FactExtractor, UnresolvedCall};
use crate::graph::EdgeLookup;
use crate::object_id::ObjectId;
use crate::object_store::ObjectStore;
use crate::store::{validate_payload, PayloadKind, Store, Transaction};
use crate::types::{ChangeType, EdgeKind, EvidenceEntry, EvidenceKind, FileRecord, GraphEdge, Symbol};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// How thoroughly `bootstrap`/`reindex` re-extract a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Skip files whose size and mtime match the last indexed record.
    Fast,
    /// Re-extract every named file regardless of its recorded mtime/size.
    Full,
}

/// How far a `reindex` call propagates beyond the paths it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexScope {
    /// Only the named paths.
    ChangedOnly,
    /// The named paths, plus anything that calls, imports, extends, or
    /// implements a symbol defined in one of them (via reverse-edge
    /// lookup), so their view of the named paths stays consistent.
    ChangedAndDependents,
    /// The named paths are already the full set to re-extract; no
    /// further expansion is performed.
    Full,
}

/// Why a single file's extraction was skipped or failed.
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub path: String,
    pub message: String,
}

/// Summary of one `bootstrap`/`reindex`/`remove` call.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub symbols_written: usize,
    pub edges_written: usize,
    pub calls_resolved: usize,
    pub claims_invalidated: usize,
    /// Per-file extraction failures. A failure here does not abort the
    /// batch; only a transactional failure (returned as `Err`) does.
    pub failures: Vec<ExtractionFailure>,
}

/// Orchestrates fact extraction and storage for a
/// workspace, borrowing the store, object store, and optional embedder
/// it writes through.
pub struct Indexer<'a> {
    store: &'a Store,
    object_store: &'a ObjectStore,
    embedder: Option<&'a dyn EmbeddingService>,
    storage: StorageConfig,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a Store,
        object_store: &'a ObjectStore,
        embedder: Option<&'a dyn EmbeddingService>,
    ) -> Self {
        Self { store, object_store, embedder, storage: StorageConfig::default() }
    }

    /// Builds an indexer that validates ledger payloads against
    /// `storage`'s limits rather than the defaults.
    pub fn with_storage_config(
        store: &'a Store,
        object_store: &'a ObjectStore,
        embedder: Option<&'a dyn EmbeddingService>,
        storage: StorageConfig,
    ) -> Self {
        Self { store, object_store, embedder, storage }
    }

    /// Scans `workspace_root` for files matching `include_globs` and not
    /// matching `exclude_globs`, extracts facts from each, and writes the
    /// result in one transaction. Idempotent: re-running against an
    /// unchanged tree in [`IndexMode::Fast`] produces no new writes.
    pub fn bootstrap(
        &self,
        workspace_root: &Path,
        include_globs: &[String],
        exclude_globs: &[String],
        extractor: &mut dyn FactExtractor,
        mode: IndexMode,
        timestamp: i64,
    ) -> Result<IndexReport> {
        let paths = discover_files(workspace_root, include_globs, exclude_globs)?;
        self.index_paths(workspace_root, &paths, extractor, mode, timestamp)
    }

    /// Re-extracts `changed_paths`, optionally expanding to their
    /// dependents, and writes the result in one transaction.
    pub fn reindex(
        &self,
        workspace_root: &Path,
        changed_paths: &[String],
        scope: ReindexScope,
        extractor: &mut dyn FactExtractor,
        mode: IndexMode,
        timestamp: i64,
    ) -> Result<IndexReport> {
        let paths = match scope {
            ReindexScope::ChangedOnly | ReindexScope::Full => changed_paths.to_vec(),
            ReindexScope::ChangedAndDependents => {
                let mut paths = changed_paths.to_vec();
                for dependent in self.find_dependents(changed_paths)? {
                    if !paths.contains(&dependent) {
                        paths.push(dependent);
                    }
                }
                paths
            }
        };
        self.index_paths(workspace_root, &paths, extractor, mode, timestamp)
    }

    /// Removes every record (file, symbols, edges, embeddings) for
    /// `paths`, invalidating any ledger claims about the removed symbols
    /// in the same transaction.
    pub fn remove(&self, paths: &[String], timestamp: i64) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let txn = self.store.begin()?;
        let mut changes = Vec::new();

        for path in paths {
            if self.store.get_file(path)?.is_none() {
                continue;
            }
            let removed_ids = txn.clear_symbols_for_path(path)?;
            for id in &removed_ids {
                report.claims_invalidated += self.invalidate_claims(&txn, id, timestamp, "indexer:remove")?;
                txn.remove_edges_touching(id)?;
                txn.remove_embedding(id)?;
                txn.prune_packs_for(id)?;
            }
            txn.remove_file(path)?;
            changes.push((path.clone(), ChangeType::Removed));
            report.files_indexed += 1;
        }

        if changes.is_empty() {
            return Ok(report);
        }
        txn.record_changes(&changes)?;
        txn.commit()?;
        Ok(report)
    }

    /// Finds files that depend on symbols defined in `changed_paths`, via
    /// reverse edge lookup (who calls/imports/extends/implements a symbol
    /// this path defines).
    fn find_dependents(&self, changed_paths: &[String]) -> Result<Vec<String>> {
        const KINDS: [EdgeKind; 4] =
            [EdgeKind::Calls, EdgeKind::Imports, EdgeKind::Extends, EdgeKind::Implements];
        let mut out = Vec::new();
        for path in changed_paths {
            for symbol_id in self.store.symbols_for_path(path)? {
                for kind in KINDS {
                    for caller_id in self.store.edges_to(&symbol_id, kind)? {
                        if let Some(caller) = self.store.get_symbol(&caller_id)? {
                            if !changed_paths.contains(&caller.path) && !out.contains(&caller.path) {
                                out.push(caller.path);
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// The shared implementation behind `bootstrap` and `reindex`: one
    /// write transaction covering every path in `paths`.
    fn index_paths(
        &self,
        workspace_root: &Path,
        paths: &[String],
        extractor: &mut dyn FactExtractor,
        mode: IndexMode,
        timestamp: i64,
    ) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let txn = self.store.begin()?;

        let mut changes: Vec<(String, ChangeType)> = Vec::new();
        let mut pending_files: Vec<(String, FileRecord)> = Vec::new();
        let mut pending_symbols: Vec<(String, Vec<Symbol>)> = Vec::new();
        let mut pending_edges: Vec<GraphEdge> = Vec::new();
        let mut pending_calls: Vec<UnresolvedCall> = Vec::new();

        for path in paths {
            let abs_path = workspace_root.join(path);
            let existing = self.store.get_file(path)?;

            let content = match fs::read(&abs_path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if existing.is_some() {
                        let removed_ids = txn.clear_symbols_for_path(path)?;
                        for id in &removed_ids {
                            report.claims_invalidated +=
                                self.invalidate_claims(&txn, id, timestamp, "indexer:reindex")?;
                            txn.remove_edges_touching(id)?;
                            txn.remove_embedding(id)?;
                            txn.prune_packs_for(id)?;
                        }
                        txn.remove_file(path)?;
                        changes.push((path.clone(), ChangeType::Removed));
                    }
                    continue;
                }
                Err(e) => {
                    report.failures.push(ExtractionFailure { path: path.clone(), message: e.to_string() });
                    continue;
                }
            };

            let mtime = fs::metadata(&abs_path).map(|m| mtime_unix(&m)).unwrap_or(timestamp);

            if mode == IndexMode::Fast {
                if let Some(existing) = &existing {
                    if existing.mtime_unix == mtime && existing.size_bytes == content.len() as u64 {
                        report.files_skipped += 1;
                        continue;
                    }
                }
            }

            let text = match std::str::from_utf8(&content) {
                Ok(s) => s,
                Err(_) => {
                    report.failures.push(ExtractionFailure {
                        path: path.clone(),
                        message: "file is not valid UTF-8".to_string(),
                    });
                    continue;
                }
            };

            let facts: ExtractedFacts = match extractor.extract(path, text) {
                Ok(facts) => facts,
                Err(e) => {
                    warn!(path, error = %e, "extraction failed for file, leaving prior facts in place");
                    report.failures.push(ExtractionFailure { path: path.clone(), message: e.to_string() });
                    continue;
                }
            };

            let removed_ids = txn.clear_symbols_for_path(path)?;
            for id in &removed_ids {
                report.claims_invalidated += self.invalidate_claims(&txn, id, timestamp, "indexer:reindex")?;
                txn.remove_edges_touching(id)?;
                txn.remove_embedding(id)?;
                txn.prune_packs_for(id)?;
            }

            let content_id = self.object_store.put_blob(&content)?;
            let change_type = if existing.is_some() { ChangeType::Modified } else { ChangeType::Created };

            changes.push((path.clone(), change_type));
            pending_files.push((
                path.clone(),
                FileRecord {
                    path: path.clone(),
                    content_id,
                    size_bytes: content.len() as u64,
                    mtime_unix: mtime,
                    last_indexed_version: 0,
                    extraction_backend: existing
                        .map(|e| e.extraction_backend)
                        .unwrap_or(crate::types::ExtractionBackend::Heuristic),
                },
            ));
            pending_edges.extend(facts.edges);
            pending_calls.extend(facts.unresolved_calls);
            report.files_indexed += 1;
            pending_symbols.push((path.clone(), facts.symbols));
        }

        if changes.is_empty() {
            return Ok(report);
        }

        let next_version = txn.record_changes(&changes)?;

        let mut batch_symbols_by_path: HashMap<String, Vec<Symbol>> = HashMap::new();
        for (path, symbols) in pending_symbols {
            let mut stamped = Vec::with_capacity(symbols.len());
            for mut symbol in symbols {
                symbol.last_seen_version = next_version;
                txn.put_symbol(&symbol)?;
                if let Some(embedder) = self.embedder {
                    let text = format!("{} {}", symbol.canonical_name, symbol.signature_shape);
                    let vector = embedder.embed(symbol.id, &text);
                    txn.put_embedding(&vector)?;
                }
                report.symbols_written += 1;
                stamped.push(symbol);
            }
            batch_symbols_by_path.insert(path, stamped);
        }

        for mut edge in pending_edges {
            edge.last_seen_version = next_version;
            txn.put_edge(&edge)?;
            report.edges_written += 1;
        }

        for call in pending_calls {
            if let Some(target_id) = self.resolve_call(&call, &batch_symbols_by_path)? {
                txn.put_edge(&GraphEdge {
                    from: call.from,
                    to: target_id,
                    kind: EdgeKind::Calls,
                    evidence_ids: vec![],
                    last_seen_version: next_version,
                })?;
                report.edges_written += 1;
                report.calls_resolved += 1;
            } else {
                debug!(
                    callee_path = %call.callee_path,
                    callee_name = %call.callee_name,
                    "could not resolve cross-file call; dropping rather than writing a dangling edge"
                );
            }
        }

        for (path, mut record) in pending_files {
            record.last_indexed_version = next_version;
            txn.put_file(&path, &record)?;
        }

        txn.commit()?;
        Ok(report)
    }

    /// Resolves a call's target symbol id, preferring symbols written
    /// earlier in this same batch (which the store's committed read
    /// tables cannot see yet) and falling back to already-committed
    /// symbols at the callee's path.
    fn resolve_call(
        &self,
        call: &UnresolvedCall,
        batch_symbols_by_path: &HashMap<String, Vec<Symbol>>,
    ) -> Result<Option<ObjectId>> {
        if let Some(symbols) = batch_symbols_by_path.get(&call.callee_path) {
            if let Some(found) = symbols.iter().find(|s| symbol_matches(s, &call.callee_name)) {
                return Ok(Some(found.id));
            }
        }
        for id in self.store.symbols_for_path(&call.callee_path)? {
            if let Some(symbol) = self.store.get_symbol(&id)? {
                if symbol_matches(&symbol, &call.callee_name) {
                    return Ok(Some(symbol.id));
                }
            }
        }
        Ok(None)
    }

    /// Writes a Contradiction entry against every outstanding Claim filed
    /// for `subject`, so a symbol removed or replaced during indexing can
    /// never leave a stale claim looking current. Returns how many claims
    /// were invalidated.
    ///
    /// Confidence is fixed at 1.0: the subject's facts are known to have
    /// changed (it was just re-extracted or removed), not merely
    /// suspected to have changed, so this defeater always clears the
    /// staleness threshold regardless of configuration.
    fn invalidate_claims(
        &self,
        txn: &Transaction,
        subject: &ObjectId,
        timestamp: i64,
        provenance: &str,
    ) -> Result<usize> {
        let reason = serde_json::json!({ "reason": "subject changed during reindex", "confidence": 1.0 });
        let validated = validate_payload(
            &reason,
            self.storage.max_payload_depth,
            self.storage.max_blob_size,
            PayloadKind::Evidence,
        )?;
        let payload_bytes = serde_json::to_vec(&validated)
            .map_err(|e| crate::error::LibrarianError::Serialization(e.to_string()))?;

        let mut count = 0;
        for entry_id in self.store.ledger_entries_for_subject(subject)? {
            let Some(entry) = self.store.get_ledger_entry(entry_id)? else { continue };
            if entry.kind != EvidenceKind::Claim {
                continue;
            }
            let mut defeater = EvidenceEntry {
                entry_id: 0,
                kind: EvidenceKind::Contradiction,
                payload: payload_bytes.clone(),
                provenance: provenance.to_string(),
                timestamp,
                related_entry_ids: vec![entry_id],
                content_hash: ObjectId::from_bytes([0; 32]),
            };
            let defeater_id = txn.append_ledger_entry(&mut defeater)?;
            txn.index_ledger_subject(subject, defeater_id)?;
            count += 1;
        }
        Ok(count)
    }
}

fn symbol_matches(symbol: &Symbol, callee_name: &str) -> bool {
    symbol.canonical_name == callee_name || symbol.canonical_name.ends_with(&format!("::{}", callee_name))
}

fn mtime_unix(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Walks `root` for files matching `include` and not matching `exclude`.
/// An empty `include` list matches everything. Always skips `.librarian`,
/// `.git`, and `target` directories regardless of the glob patterns given,
/// since nothing under them is ever source the Librarian should extract.
fn discover_files(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    walk(root, root, include, exclude, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Path, dir: &Path, include: &[String], exclude: &[String], out: &mut Vec<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if matches!(name, ".librarian" | ".git" | "target") {
                continue;
            }
            walk(root, &path, include, exclude, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if matches_any(&rel, exclude) {
                continue;
            }
            if include.is_empty() || matches_any(&rel, include) {
                out.push(rel);
            }
        }
    }
    Ok(())
}

fn matches_any(path: &str, patterns: &[String]) -> bool {
    let path_segs: Vec<&str> = path.split('/').collect();
    patterns
        .iter()
        .any(|pattern| glob_match(&pattern.split('/').collect::<Vec<_>>(), &path_segs))
}

/// Minimal glob matcher: `**` matches zero or more path segments, `*`
/// matches within a single segment. No dependency is pulled in for this;
/// the patterns the CLI accepts (`**/*.rs`, `target/**`, ...) don't need
/// more than this.
fn glob_match(pattern: &[&str], path: &[&str]) -> bool {
    match (pattern.first(), path.first()) {
        (None, None) => true,
        (Some(&"**"), _) => {
            glob_match(&pattern[1..], path) || (!path.is_empty() && glob_match(pattern, &path[1..]))
        }
        (Some(p), Some(s)) if segment_match(p, s) => glob_match(&pattern[1..], &path[1..]),
        _ => false,
    }
}

fn segment_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut match_from = 0usize;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            match_from = ti;
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(star_idx) = star {
            pi = star_idx + 1;
            match_from += 1;
            ti = match_from;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
