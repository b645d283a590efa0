//! Core data types for the Librarian's knowledge store.

use crate::ObjectId;
use serde::{Deserialize, Serialize};

/// Source location within a file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Byte offset where the span starts.
    pub start_byte: u32,
    /// Byte offset where the span ends (exclusive).
    pub end_byte: u32,
    /// Line number where the span starts (0-indexed).
    pub start_line: u32,
    /// Column number where the span starts (0-indexed).
    pub start_col: u32,
    /// Line number where the span ends (0-indexed).
    pub end_line: u32,
    /// Column number where the span ends (0-indexed).
    pub end_col: u32,
}

/// A tracked source file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Workspace-relative path.
    pub path: String,
    /// Content-addressed id of the file's current contents.
    pub content_id: ObjectId,
    /// Size of the file in bytes.
    pub size_bytes: u64,
    /// Modification time (Unix seconds), as observed at last index.
    pub mtime_unix: i64,
    /// Index version at which this file was last (re)indexed.
    pub last_indexed_version: u64,
    /// Whether fact extraction used the LSP backend or the heuristic
    /// fallback for this file.
    pub extraction_backend: ExtractionBackend,
}

/// Which backend produced the facts for a file.
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionBackend {
    /// rust-analyzer via the Language Server Protocol.
    RustAnalyzer = 1,
    /// Regex/text-scanning fallback used when rust-analyzer is unavailable.
    Heuristic = 2,
}

/// A named code symbol (function, struct, trait, impl, module, ...).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Stable identifier, a hash of path + canonical name + signature shape.
    /// Unlike [`ObjectId`] (content hash of a blob), this id is stable
    /// across edits that don't change the symbol's shape.
    pub id: ObjectId,
    /// Path of the file defining this symbol.
    pub path: String,
    /// Fully-qualified canonical name (e.g. `crate::module::Type::method`).
    pub canonical_name: String,
    /// Coarse classification of the symbol.
    pub kind: SymbolKind,
    /// Normalized signature shape used as part of the id's hash input.
    pub signature_shape: String,
    /// Location of the symbol's definition.
    pub span: Span,
    /// Index version at which this symbol was last observed.
    pub last_seen_version: u64,
}

impl Symbol {
    /// Computes the stable symbol id from its identity-defining fields.
    ///
    /// The id intentionally excludes `span` and `last_seen_version`: moving
    /// a symbol within a file, or re-indexing without changes, must not
    /// change its identity.
    pub fn compute_id(path: &str, canonical_name: &str, signature_shape: &str) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(canonical_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(signature_shape.as_bytes());
        ObjectId::from_bytes(*hasher.finalize().as_bytes())
    }
}

/// Coarse classification of a [`Symbol`].
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A free function or method.
    Function = 1,
    /// A struct or enum definition.
    Type = 2,
    /// A trait definition.
    Trait = 3,
    /// An `impl` block.
    Impl = 4,
    /// A module.
    Module = 5,
    /// A constant or static.
    Const = 6,
}

/// Kind of relationship a [`GraphEdge`] asserts between two symbols.
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeKind {
    /// Function/method call.
    Calls = 1,
    /// Import/use statement.
    Imports = 2,
    /// Struct/trait extension (supertraits).
    Extends = 3,
    /// Trait implementation.
    Implements = 4,
}

/// A directed edge in the code knowledge graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    /// Source symbol id.
    pub from: ObjectId,
    /// Target symbol id.
    pub to: ObjectId,
    /// Relationship type.
    pub kind: EdgeKind,
    /// Evidence entry ids in the ledger supporting this edge.
    pub evidence_ids: Vec<u64>,
    /// Index version at which this edge was last observed.
    pub last_seen_version: u64,
}

/// A fixed-dimension, L2-normalized embedding vector for a symbol or chunk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    /// Id of the symbol or file chunk this embedding represents.
    pub target_id: ObjectId,
    /// L2-normalized components. Length must equal the configured dimension.
    pub components: Vec<f32>,
}

impl EmbeddingVector {
    /// Returns the dot product with another vector of the same dimension.
    ///
    /// Since both vectors are L2-normalized, the dot product equals their
    /// cosine similarity.
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> f32 {
        if self.components.len() != other.components.len() || self.components.is_empty() {
            return 0.0;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// Kind of a [`ContextPack`].
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackType {
    /// Answer to a lookup query about a single symbol.
    SymbolLookup = 1,
    /// Explanation of a broader subsystem or file.
    Explanation = 2,
    /// Call-graph trace starting from a symbol.
    CallTrace = 3,
    /// Broad search across the workspace.
    BroadSearch = 4,
}

/// A snippet of source code included as direct evidence in a pack.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CodeSnippet {
    /// Path of the file the snippet was taken from.
    pub path: String,
    /// Snippet text.
    pub text: String,
    /// Location within the file.
    pub span: Span,
}

/// An assembled context pack returned to a caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContextPack {
    /// Id of this pack (content hash of its own fields, excluding this id).
    pub pack_id: ObjectId,
    /// What kind of pack this is.
    pub pack_type: PackType,
    /// The symbol or file this pack answers a query about.
    pub target_id: ObjectId,
    /// Human-readable summary.
    pub summary: String,
    /// Bullet-style key facts extracted for the target.
    pub key_facts: Vec<String>,
    /// Paths of files judged relevant to the target.
    pub related_files: Vec<String>,
    /// Direct code evidence included in the pack.
    pub code_snippets: Vec<CodeSnippet>,
    /// Confidence in this pack's relevance and correctness, in `[0.1, 0.95]`.
    pub confidence: f32,
    /// Ledger entry ids backing every claim in this pack.
    pub evidence_ids: Vec<u64>,
    /// Creation timestamp (Unix seconds).
    pub created_at: i64,
    /// Index version the store was at when this pack was built.
    pub index_version_at_build: u64,
}

/// Kind of an [`EvidenceEntry`] in the evidence ledger.
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    /// An assertion derived from fact extraction or retrieval.
    Claim = 1,
    /// A record of an external tool invocation (e.g. rust-analyzer query).
    ToolCall = 2,
    /// A record that two prior entries conflict.
    Contradiction = 3,
    /// A human explicitly overrode an automated claim.
    HumanOverride = 4,
    /// A raw observation (file read, watcher event) with no claim attached.
    Observation = 5,
}

/// An append-only, content-addressed entry in the evidence ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EvidenceEntry {
    /// Monotonically increasing id, assigned by the ledger on append.
    pub entry_id: u64,
    /// What kind of entry this is.
    pub kind: EvidenceKind,
    /// Opaque, kind-specific payload (e.g. serialized claim or tool output).
    pub payload: Vec<u8>,
    /// Where this entry came from (tool name, extractor, or "human").
    pub provenance: String,
    /// Creation timestamp (Unix seconds).
    pub timestamp: i64,
    /// Ids of entries this one relates to. Must strictly increase in
    /// value relative to this entry (no forward or self references) so
    /// the relation graph can never contain a cycle.
    pub related_entry_ids: Vec<u64>,
    /// BLAKE3 hash over every other field's canonical encoding.
    pub content_hash: ObjectId,
}

/// A claim about the codebase, backed by evidence and subject to staleness.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claim {
    /// Ledger entry id of the claim itself.
    pub entry_id: u64,
    /// The asserted statement.
    pub assertion: String,
    /// What the claim is about (a symbol or file id, as an `ObjectId`).
    pub subject: ObjectId,
    /// Ledger entry ids of evidence supporting the claim.
    pub supporting_evidence: Vec<u64>,
    /// Ledger entry ids of evidence that would invalidate the claim
    /// (contradictions or human overrides) if present and unresolved.
    pub defeaters: Vec<u64>,
    /// Confidence in the claim, independent of staleness.
    pub confidence: f32,
}

impl Claim {
    /// A claim is stale iff a sufficient defeater is present among its
    /// recorded defeaters. Never based on elapsed time alone.
    pub fn is_stale(&self) -> bool {
        !self.defeaters.is_empty()
    }
}

/// The kind of filesystem change a [`ChangeEvent`] reports.
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// A new file was created.
    Created = 1,
    /// An existing file's contents changed.
    Modified = 2,
    /// A file was removed.
    Removed = 3,
}

/// A single coordination event, written atomically with the index
/// version bump that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Index version this event is associated with.
    pub version: u64,
    /// Path of the affected file.
    pub path: String,
    /// What kind of change occurred.
    pub change_type: ChangeType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_is_stable_across_span_changes() {
        let id_a = Symbol::compute_id("src/lib.rs", "crate::foo", "fn foo()");
        let id_b = Symbol::compute_id("src/lib.rs", "crate::foo", "fn foo()");
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn symbol_id_differs_on_signature_change() {
        let id_a = Symbol::compute_id("src/lib.rs", "crate::foo", "fn foo()");
        let id_b = Symbol::compute_id("src/lib.rs", "crate::foo", "fn foo(x: i32)");
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = EmbeddingVector {
            target_id: ObjectId::from_bytes([1; 32]),
            components: vec![0.6, 0.8],
        };
        let sim = v.cosine_similarity(&v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_dimension_is_zero() {
        let a = EmbeddingVector {
            target_id: ObjectId::from_bytes([1; 32]),
            components: vec![1.0, 0.0],
        };
        let b = EmbeddingVector {
            target_id: ObjectId::from_bytes([2; 32]),
            components: vec![1.0, 0.0, 0.0],
        };
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn claim_without_defeaters_is_not_stale() {
        let claim = Claim {
            entry_id: 1,
            assertion: "foo calls bar".to_string(),
            subject: ObjectId::from_bytes([0; 32]),
            supporting_evidence: vec![1],
            defeaters: vec![],
            confidence: 0.9,
        };
        assert!(!claim.is_stale());
    }

    #[test]
    fn claim_with_defeater_is_stale() {
        let claim = Claim {
            entry_id: 1,
            assertion: "foo calls bar".to_string(),
            subject: ObjectId::from_bytes([0; 32]),
            supporting_evidence: vec![1],
            defeaters: vec![2],
            confidence: 0.9,
        };
        assert!(claim.is_stale());
    }
}
