//! Error types for librarian_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for librarian_core operations.
///
/// Variants are grouped by the error kinds the CLI maps to exit codes
/// (invalid argument, not bootstrapped, provider unavailable, storage
/// corrupt / lock contention, validation failed, cancelled/timed out,
/// ledger tamper), plus the lower-level storage and fact-extraction
/// primitives those kinds are built from.
#[derive(Error, Debug)]
pub enum LibrarianError {
    // --- top-level error kinds -------------------------------------------
    /// User-input validation failure. Must never touch storage.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation that requires an index found none present.
    #[error("workspace is not bootstrapped; run `librarian bootstrap` first")]
    NotBootstrapped,

    /// An external embedding/LLM provider is absent or failing.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The store is corrupt and could not be (fully) recovered.
    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    /// Another process holds the workspace lock.
    #[error("workspace lock held by another process (pid {pid})")]
    LockContention {
        /// Process ID holding the lock.
        pid: u32,
    },

    /// Integration-suite or strict-mode gate failure.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The operation was cancelled or exceeded its deadline.
    #[error("cancelled or timed out: {0}")]
    Cancelled(String),

    /// A ledger entry's content hash does not match its recomputed hash.
    #[error("ledger tamper detected: entry {entry_id} content hash mismatch")]
    LedgerTamper {
        /// The offending entry id.
        entry_id: u64,
    },

    // --- storage primitives ----------------------------------------------
    /// Object with the given ID was not found in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Hash verification failed during object read.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The expected object id.
        expected: String,
        /// The actual computed hash.
        actual: String,
    },

    /// The object file is corrupted or has invalid format.
    #[error("corrupted object at {}: {}", path.display(), reason)]
    CorruptedObject {
        /// Path to the corrupted object.
        path: PathBuf,
        /// Description of the corruption.
        reason: String,
    },

    /// Invalid hex string for ObjectId parsing.
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Blob exceeds maximum allowed size.
    #[error("blob too large: {size} bytes exceeds limit of {limit} bytes")]
    BlobTooLarge {
        /// Actual size of the blob.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// A payload failed the depth/size/forbidden-key/finite-number checks.
    #[error("payload rejected: {0}")]
    PayloadRejected(String),

    /// An embedding vector's dimension does not match the store's active
    /// dimension, signaling a provider/config change that requires a
    /// migration (re-embedding everything) before writes can resume.
    #[error("embedding dimension mismatch: store is active at {active}, got {actual}")]
    EmbeddingDimensionMismatch {
        /// The dimension already recorded for this store.
        active: usize,
        /// The dimension of the vector that was rejected.
        actual: usize,
    },

    /// The underlying redb database returned an error.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Catch-all for internal invariant violations that don't map to a
    /// more specific kind (garbage collection bookkeeping, object-store
    /// housekeeping, and similar low-level failures).
    #[error("internal error: {0}")]
    Internal(String),

    // --- fact extraction ---------------------------------------------------
    /// rust-analyzer is not installed or not found on PATH.
    #[error("rust-analyzer not found; falling back to heuristic extraction")]
    RustAnalyzerNotFound,

    /// rust-analyzer process failed to start.
    #[error("failed to start rust-analyzer: {0}")]
    RustAnalyzerStartFailed(String),

    /// LSP request timed out.
    #[error("LSP request timed out after {timeout_ms}ms: {method}")]
    LspTimeout {
        /// Method name that timed out.
        method: String,
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// LSP protocol error.
    #[error("LSP protocol error: {0}")]
    LspProtocolError(String),

    /// rust-analyzer crashed or exited unexpectedly.
    #[error("rust-analyzer exited unexpectedly: {0}")]
    RustAnalyzerCrashed(String),

    // --- watcher ------------------------------------------------------------
    /// The filesystem watcher failed to subscribe to a path.
    #[error("watcher error: {0}")]
    WatcherError(String),
}

impl LibrarianError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::CorruptedObject { .. } | Self::StorageCorrupt(_) | Self::Database(_) => {
                Some("Run 'librarian doctor' to attempt recovery, then 'librarian reindex --full'.")
            }
            Self::NotBootstrapped => Some("Run 'librarian bootstrap' to create the index."),
            Self::LockContention { .. } => {
                Some("Wait for the other process to finish, or remove the lock if it is stale.")
            }
            Self::ProviderUnavailable(_) => {
                Some("Check provider configuration with 'librarian provider list', or pass --offline.")
            }
            Self::LedgerTamper { .. } => {
                Some("The evidence ledger is no longer trustworthy; restore from a known-good export.")
            }
            Self::ObjectNotFound(_) => {
                Some("The workspace might be corrupted. Run 'librarian doctor' to check.")
            }
            Self::EmbeddingDimensionMismatch { .. } => {
                Some("Embedding dimension changed; run 'librarian reindex --full' to re-embed the whole workspace.")
            }
            Self::RustAnalyzerNotFound => {
                Some("Install with: rustup component add rust-analyzer. Indexing will continue with heuristic extraction.")
            }
            _ => None,
        }
    }

    /// Maps this error to the documented CLI exit-code family.
    pub fn exit_code_name(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotBootstrapped => "NOT_BOOTSTRAPPED",
            Self::ValidationFailed(_) | Self::EmbeddingDimensionMismatch { .. } => "VALIDATION_FAILED",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::StorageCorrupt(_) | Self::CorruptedObject { .. } | Self::Database(_) => {
                "STORAGE_CORRUPT"
            }
            _ => "GENERIC_FAILURE",
        }
    }
}

/// Convenience Result type for librarian_core operations.
pub type Result<T> = std::result::Result<T, LibrarianError>;
