//! End-to-end coverage for index state transitions: reindex scopes
//! (changed-only vs. changed-and-dependents vs. full) and the
//! export/import round trip into a fresh workspace.

use crate::harness::TestWorkspace;
use librarian_core::Librarian;

#[test]
fn reindex_changed_and_dependents_reextracts_the_caller_too() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file("src/auth.rs", b"pub fn login(user: &str) -> bool { !user.is_empty() }")
        .unwrap();
    workspace
        .write_file(
            "src/handler.rs",
            b"use crate::auth::login;\npub fn handle() -> bool { login(\"x\") }",
        )
        .unwrap();
    let (mut librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();

    workspace
        .write_file(
            "src/auth.rs",
            b"pub fn login(user: &str, pass: &str) -> bool { !user.is_empty() && !pass.is_empty() }",
        )
        .unwrap();

    let report = librarian
        .reindex(
            &["src/auth.rs".to_string()],
            librarian_core::ReindexScope::ChangedAndDependents,
            librarian_core::IndexMode::Full,
            1_700_000_100,
        )
        .unwrap();

    assert!(report.files_indexed >= 1);
}

#[test]
fn reindex_full_scope_reextracts_every_named_path_without_expansion() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace.write_file("src/a.rs", b"pub fn a() {}").unwrap();
    workspace.write_file("src/b.rs", b"pub fn b() {}").unwrap();
    let (mut librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();

    let report = librarian
        .reindex(
            &["src/a.rs".to_string(), "src/b.rs".to_string()],
            librarian_core::ReindexScope::Full,
            librarian_core::IndexMode::Full,
            1_700_000_100,
        )
        .unwrap();

    assert_eq!(report.files_indexed, 2);
}

#[test]
fn export_then_import_preserves_index_version_and_symbol_count() {
    let source = TestWorkspace::empty().unwrap();
    source
        .write_file("src/lib.rs", b"pub fn tripled(x: i32) -> i32 { x * 3 }")
        .unwrap();
    let (librarian, _) = source.bootstrap(1_700_000_000).unwrap();
    let source_status = librarian.status().unwrap();

    let archive_path = source.path().join("export.bin");
    librarian.export(&archive_path, 1_700_000_200).unwrap();
    drop(librarian);

    let target = TestWorkspace::empty().unwrap();
    librarian_core::import_workspace(&archive_path, target.path()).unwrap();

    let imported = Librarian::open(target.path()).unwrap();
    let imported_status = imported.status().unwrap();
    assert_eq!(imported_status.index_version, source_status.index_version);
    assert_eq!(imported_status.symbols_indexed, source_status.symbols_indexed);
}
