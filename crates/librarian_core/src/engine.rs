//! The Librarian's top-level handle: opens a workspace, holds the
//! workspace lock for the duration of mutating operations, and wires
//! the Storage Engine, Indexer, Retriever, and Query Coordinator into
//! the operations the CLI surface exposes.

use crate::config::Config;
use crate::embedding::{EmbeddingService, HashingEmbedder};
use crate::error::{LibrarianError, Result};
use crate::extractor::{FactExtractor, HeuristicExtractor, RustAnalyzerExtractor};
use crate::indexer::{IndexMode, IndexReport, Indexer, ReindexScope};
use crate::ledger;
use crate::lock::WorkspaceLock;
use crate::object_id::ObjectId;
use crate::object_store::ObjectStore;
use crate::store::{recover_corrupt_store, RecoveryReport, Store};
use crate::types::{EvidenceKind, ExtractionBackend};
use crate::watcher::{PathChange, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

mod export;

pub use export::{ExportManifest, ImportReport};

/// Everything known about an indexed workspace: file/symbol counts, the
/// current index version, and which extraction backend is in use.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub index_version: u64,
    pub files_indexed: usize,
    pub symbols_indexed: usize,
    pub backend: ExtractionBackend,
    pub offline: bool,
}

/// Result of `librarian doctor`: what was wrong and what was done about
/// it.
#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub store_openable: bool,
    pub recovery: Option<RecoveryReport>,
    pub quarantined_files_found: Vec<PathBuf>,
    pub quarantined_files_purged: Vec<PathBuf>,
}

/// A workspace handle: the open store, object store, config, and the
/// held workspace lock. Dropping it releases the lock.
pub struct Librarian {
    workspace: PathBuf,
    librarian_dir: PathBuf,
    config: Config,
    store: Arc<Store>,
    object_store: ObjectStore,
    _lock: WorkspaceLock,
}

impl Librarian {
    fn librarian_dir_for(workspace: &Path) -> PathBuf {
        workspace.join(".librarian")
    }

    /// Opens an already-bootstrapped workspace. Returns
    /// [`LibrarianError::NotBootstrapped`] if no store exists yet.
    pub fn open(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref().to_path_buf();
        let librarian_dir = Self::librarian_dir_for(&workspace);
        let store_path = librarian_dir.join("store.redb");

        let store = match Store::open(&store_path)? {
            Some(store) => Arc::new(store),
            None => return Err(LibrarianError::NotBootstrapped),
        };

        let lock = WorkspaceLock::acquire(&librarian_dir)?;
        let mut config = Config::load(&librarian_dir)?;
        config.apply_env_overrides();
        let object_store = ObjectStore::new(librarian_dir.join("objects"));

        Ok(Self { workspace, librarian_dir, config, store, object_store, _lock: lock })
    }

    /// Opens a workspace, recovering once from a corrupt store file if
    /// opening fails: storage corruption triggers recovery and a single
    /// retry, never an unbounded loop.
    pub fn open_with_recovery(workspace: impl AsRef<Path>, timestamp: i64) -> Result<(Self, Option<RecoveryReport>)> {
        let workspace = workspace.as_ref().to_path_buf();
        match Self::open(&workspace) {
            Ok(librarian) => Ok((librarian, None)),
            Err(LibrarianError::StorageCorrupt(reason)) | Err(LibrarianError::Database(reason)) => {
                warn!(reason, "store is corrupt, attempting recovery");
                let librarian_dir = Self::librarian_dir_for(&workspace);
                let store_path = librarian_dir.join("store.redb");
                let (_, report) = recover_corrupt_store(&store_path, timestamp)?;
                let librarian = Self::open(&workspace)?;
                Ok((librarian, Some(report)))
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a fresh workspace and runs the initial index.
    pub fn bootstrap(
        workspace: impl AsRef<Path>,
        include_globs: &[String],
        exclude_globs: &[String],
        mode: IndexMode,
        timestamp: i64,
    ) -> Result<(Self, IndexReport)> {
        let workspace = workspace.as_ref().to_path_buf();
        let librarian_dir = Self::librarian_dir_for(&workspace);
        std::fs::create_dir_all(&librarian_dir)?;

        let lock = WorkspaceLock::acquire(&librarian_dir)?;
        let mut config = Config::load(&librarian_dir)?;
        config.apply_env_overrides();
        config.save(&librarian_dir)?;

        let store = Arc::new(Store::create(librarian_dir.join("store.redb"))?);
        let object_store = ObjectStore::new(librarian_dir.join("objects"));

        let librarian = Self { workspace, librarian_dir, config, store, object_store, _lock: lock };
        let embedder = librarian.embedder();
        let indexer = Indexer::with_storage_config(
            &librarian.store,
            &librarian.object_store,
            embedder.as_deref(),
            librarian.config.storage.clone(),
        );
        let mut extractor = librarian.pick_extractor();
        let report = indexer.bootstrap(
            &librarian.workspace,
            include_globs,
            exclude_globs,
            extractor.as_mut(),
            mode,
            timestamp,
        )?;

        Ok((librarian, report))
    }

    /// Re-extracts `changed_paths` (and, per `scope`, their dependents).
    pub fn reindex(
        &mut self,
        changed_paths: &[String],
        scope: ReindexScope,
        mode: IndexMode,
        timestamp: i64,
    ) -> Result<IndexReport> {
        let embedder = self.embedder();
        let indexer = Indexer::with_storage_config(
            &self.store,
            &self.object_store,
            embedder.as_deref(),
            self.config.storage.clone(),
        );
        let mut extractor = self.pick_extractor();
        let workspace = self.workspace.clone();
        indexer.reindex(&workspace, changed_paths, scope, extractor.as_mut(), mode, timestamp)
    }

    /// Removes `paths` from the index entirely (deleted files).
    pub fn remove(&mut self, paths: &[String], timestamp: i64) -> Result<IndexReport> {
        let embedder = self.embedder();
        let indexer = Indexer::with_storage_config(
            &self.store,
            &self.object_store,
            embedder.as_deref(),
            self.config.storage.clone(),
        );
        indexer.remove(paths, timestamp)
    }

    /// Runs a query through the Query Coordinator.
    pub fn query(&self, request: &crate::coordinator::QueryRequest, created_at: i64) -> Result<crate::coordinator::QueryResponse> {
        let embedder = self.embedder();
        crate::coordinator::coordinate(
            &self.store,
            &self.object_store,
            &self.config,
            request,
            embedder.as_deref(),
            created_at,
        )
    }

    pub fn status(&self) -> Result<StatusReport> {
        let index_version = self.store.current_version()?;
        let files_indexed = self.store.all_files()?.len();
        let symbols_indexed = self.store.all_symbols()?.len();
        let backend = if RustAnalyzerExtractor::is_available() {
            ExtractionBackend::RustAnalyzer
        } else {
            ExtractionBackend::Heuristic
        };
        Ok(StatusReport {
            index_version,
            files_indexed,
            symbols_indexed,
            backend,
            offline: self.config.provider.offline,
        })
    }

    /// Checks store health and, if asked, reclaims quarantined files left
    /// behind by a prior recovery.
    pub fn doctor(&self, purge_quarantine: bool) -> Result<DoctorReport> {
        let mut report = DoctorReport { store_openable: true, ..Default::default() };

        let quarantine_prefix = self.librarian_dir.join("store.corrupt.");
        if let Some(parent) = quarantine_prefix.parent() {
            if let Ok(entries) = std::fs::read_dir(parent) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.to_string_lossy().starts_with(quarantine_prefix.to_string_lossy().as_ref()) {
                        report.quarantined_files_found.push(path);
                    }
                }
            }
        }

        if purge_quarantine {
            for path in &report.quarantined_files_found {
                if std::fs::remove_file(path).is_ok() {
                    report.quarantined_files_purged.push(path.clone());
                }
            }
        }

        Ok(report)
    }

    /// Bundles this workspace's `.librarian` directory into a single
    /// portable archive.
    pub fn export(&self, output_path: &Path, created_at: i64) -> Result<ExportManifest> {
        export::export(&self.librarian_dir, output_path, created_at)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn librarian_dir(&self) -> &Path {
        &self.librarian_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn object_store(&self) -> &ObjectStore {
        &self.object_store
    }

    /// Starts watching the workspace for filesystem changes, appending a
    /// ledger [`EvidenceKind::Observation`] for each debounced change
    /// instead of acting on it directly — reindexing on a raw watcher
    /// event is the caller's decision, not this method's.
    ///
    /// The subject of each observation is the path's content-independent
    /// hash rather than a symbol id, since a `Removed` change has no file
    /// content left to derive one from.
    pub fn start_watcher(&self) -> Result<Watcher> {
        let store = Arc::clone(&self.store);
        let storage = self.config.storage.clone();

        let handler: Box<dyn Fn(&PathChange) + Send + 'static> = Box::new(move |change: &PathChange| {
            let path = change.path.to_string_lossy().into_owned();
            let subject = ObjectId::hash_blob(path.as_bytes());
            let payload = serde_json::json!({
                "path": path,
                "change_type": format!("{:?}", change.change_type),
            });
            let timestamp = watcher_timestamp();
            if let Err(e) = ledger::append_observation(
                &store,
                &storage,
                EvidenceKind::Observation,
                subject,
                payload,
                "watcher",
                timestamp,
            ) {
                warn!(error = %e, path = %change.path.display(), "failed to record filesystem observation");
            }
        });

        Watcher::start(&self.workspace, &self.config.watcher, handler)
    }

    pub(crate) fn embedder(&self) -> Option<Box<dyn EmbeddingService>> {
        if self.config.embedding.enabled {
            Some(Box::new(HashingEmbedder::new(self.config.embedding.dimension)))
        } else {
            None
        }
    }

    /// Picks rust-analyzer when available, falling back to the heuristic
    /// backend. The chosen backend is recorded per file via
    /// `FileRecord.extraction_backend`, not tracked here.
    fn pick_extractor(&self) -> Box<dyn FactExtractor> {
        if RustAnalyzerExtractor::is_available() {
            match RustAnalyzerExtractor::start(&self.workspace) {
                Ok(extractor) => return Box::new(extractor),
                Err(e) => warn!(error = %e, "rust-analyzer failed to start, falling back to heuristic extraction"),
            }
        }
        Box::new(HeuristicExtractor::new())
    }
}

fn watcher_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Deletes a workspace's `.librarian` directory entirely.
pub fn uninstall(workspace: impl AsRef<Path>) -> Result<()> {
    let librarian_dir = Librarian::librarian_dir_for(workspace.as_ref());
    if librarian_dir.exists() {
        std::fs::remove_dir_all(&librarian_dir)?;
    }
    Ok(())
}

/// Unpacks an archive produced by [`Librarian::export`] into
/// `target_workspace`'s `.librarian` directory, which must not already
/// exist there.
pub fn import(archive_path: impl AsRef<Path>, target_workspace: impl AsRef<Path>) -> Result<ImportReport> {
    let librarian_dir = Librarian::librarian_dir_for(target_workspace.as_ref());
    export::import(archive_path.as_ref(), &librarian_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_without_bootstrap_is_not_bootstrapped() {
        let tmp = TempDir::new().unwrap();
        let result = Librarian::open(tmp.path());
        assert!(matches!(result, Err(LibrarianError::NotBootstrapped)));
    }

    #[test]
    fn bootstrap_then_open_round_trips() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "pub fn foo() {}\n").unwrap();

        let (librarian, report) =
            Librarian::bootstrap(tmp.path(), &["**/*.rs".to_string()], &[], IndexMode::Full, 1000).unwrap();
        assert_eq!(report.files_indexed, 1);
        drop(librarian);

        let librarian = Librarian::open(tmp.path()).unwrap();
        let status = librarian.status().unwrap();
        assert_eq!(status.files_indexed, 1);
        assert!(status.symbols_indexed >= 1);
    }

    #[test]
    fn start_watcher_appends_observation_for_a_file_change() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "pub fn foo() {}\n").unwrap();
        let (librarian, _) =
            Librarian::bootstrap(tmp.path(), &["**/*.rs".to_string()], &[], IndexMode::Full, 1000).unwrap();

        let watcher = librarian.start_watcher().unwrap();

        std::fs::write(tmp.path().join("new_file.rs"), "pub fn bar() {}\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
        watcher.stop();

        let new_file_path = tmp.path().join("new_file.rs").to_string_lossy().into_owned();
        let subject = ObjectId::hash_blob(new_file_path.as_bytes());
        let entries = librarian.store().ledger_entries_for_subject(&subject).unwrap();
        assert!(!entries.is_empty());
    }

    #[test]
    fn uninstall_removes_librarian_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "pub fn foo() {}\n").unwrap();
        let (librarian, _) =
            Librarian::bootstrap(tmp.path(), &["**/*.rs".to_string()], &[], IndexMode::Full, 1000).unwrap();
        drop(librarian);

        assert!(tmp.path().join(".librarian").exists());
        uninstall(tmp.path()).unwrap();
        assert!(!tmp.path().join(".librarian").exists());
    }

    #[test]
    fn export_then_import_into_new_workspace() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "pub fn foo() {}\n").unwrap();
        let (librarian, _) =
            Librarian::bootstrap(tmp.path(), &["**/*.rs".to_string()], &[], IndexMode::Full, 1000).unwrap();

        let archive_path = tmp.path().join("archive.bin");
        librarian.export(&archive_path, 1700).unwrap();
        drop(librarian);

        let other = TempDir::new().unwrap();
        import(&archive_path, other.path()).unwrap();

        let restored = Librarian::open(other.path()).unwrap();
        let status = restored.status().unwrap();
        assert_eq!(status.files_indexed, 1);
    }

    #[test]
    fn open_with_recovery_rebuilds_corrupt_store() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "pub fn foo() {}\n").unwrap();
        let (librarian, _) =
            Librarian::bootstrap(tmp.path(), &["**/*.rs".to_string()], &[], IndexMode::Full, 1000).unwrap();
        drop(librarian);

        std::fs::write(tmp.path().join(".librarian/store.redb"), b"not a real database").unwrap();

        let (librarian, recovery) = Librarian::open_with_recovery(tmp.path(), 1700).unwrap();
        assert!(recovery.is_some());
        assert_eq!(librarian.status().unwrap().index_version, 0);
    }

    #[test]
    fn doctor_reports_quarantined_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("lib.rs"), "pub fn foo() {}\n").unwrap();
        let (librarian, _) =
            Librarian::bootstrap(tmp.path(), &["**/*.rs".to_string()], &[], IndexMode::Full, 1000).unwrap();

        std::fs::write(tmp.path().join(".librarian/store.corrupt.1700"), b"junk").unwrap();

        let report = librarian.doctor(false).unwrap();
        assert_eq!(report.quarantined_files_found.len(), 1);

        let report = librarian.doctor(true).unwrap();
        assert_eq!(report.quarantined_files_purged.len(), 1);
        assert!(!tmp.path().join(".librarian/store.corrupt.1700").exists());
    }
}
