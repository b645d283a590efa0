//! Librarian Core
//!
//! A local code-knowledge engine for coding agents, providing:
//! - Content-addressed object storage
//! - A symbol/edge graph extracted from the workspace
//! - An append-only evidence ledger with recomputed-not-stored staleness
//! - Token-budgeted context packs assembled from ranked retrieval
//!
//! # Quick Start
//!
//! ```
//! use librarian_core::ObjectStore;
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = ObjectStore::new(tmp.path().join("objects"));
//!
//! // Store a blob
//! let id = store.put_blob(b"hello world").unwrap();
//!
//! // Retrieve it
//! let data = store.get_blob(id).unwrap();
//! assert_eq!(data, b"hello world");
//! ```
//!
//! # Features
//!
//! ## Content-Addressed Storage
//!
//! Objects are stored using BLAKE3 content hashing with zstd compression:
//!
//! ```
//! use librarian_core::ObjectStore;
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = ObjectStore::new(tmp.path().join("objects"));
//!
//! // Same content = same ID (deduplication)
//! let id1 = store.put_blob(b"content").unwrap();
//! let id2 = store.put_blob(b"content").unwrap();
//! assert_eq!(id1, id2);
//! ```
//!
//! ## Typed Objects
//!
//! Store and retrieve structured data with deterministic serialization:
//!
//! ```
//! use librarian_core::ObjectStore;
//! use serde::{Serialize, Deserialize};
//! use tempfile::TempDir;
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Config {
//!     name: String,
//!     value: i32,
//! }
//!
//! let tmp = TempDir::new().unwrap();
//! let store = ObjectStore::new(tmp.path().join("objects"));
//!
//! let config = Config { name: "test".into(), value: 42 };
//! let id = store.put_typed(&config).unwrap();
//!
//! let loaded: Config = store.get_typed(id).unwrap();
//! assert_eq!(loaded, config);
//! ```

mod config;
mod coordinator;
mod embedding;
mod engine;
mod error;
pub mod extractor;
mod graph;
mod indexer;
mod ledger;
mod lock;
pub mod mcp;
mod object_id;
mod object_store;
mod pack;
mod retriever;
mod store;
mod types;
mod watcher;

pub use config::{Config, EmbeddingConfig, ProviderConfig, RetrievalConfig, StorageConfig, WatcherConfig};
pub use coordinator::{
    classify_intent, coordinate, Depth, QueryIntent, QueryRequest, QueryResponse, Warning,
    WarningSeverity,
};
pub use embedding::{tokenize, EmbeddingService, HashingEmbedder};
pub use engine::{uninstall, DoctorReport, ExportManifest, ImportReport, Librarian, StatusReport};
pub use engine::import as import_workspace;
pub use error::{LibrarianError, Result};
pub use extractor::{
    ExtractedFacts, FactExtractor, HeuristicExtractor, RustAnalyzerExtractor, UnresolvedCall,
};
pub use graph::{expand_from_seeds, AdjacencyList, EdgeLookup, ExpansionConfig, ExpansionResult};
pub use indexer::{ExtractionFailure, IndexMode, IndexReport, Indexer, ReindexScope};
pub use ledger::{
    append_claim, append_defeater, append_observation, entries_for_subject, find_defeaters,
    get_claim,
};
pub use lock::WorkspaceLock;
pub use object_id::ObjectId;
pub use object_store::ObjectStore;
pub use pack::{assemble_pack, estimate_tokens, Candidate};
pub use retriever::{retrieve, MatchKind, RankedCandidate, RankedCandidates};
pub use store::{recover_corrupt_store, RecoveryReport, Store, Transaction, STORE_SCHEMA_VERSION};
pub use types::*;
pub use watcher::{PathChange, Watcher};
