//! End-to-end coverage for scenario 1 ("Coordination") and scenario 4
//! ("Pack evidence binding"): bootstrap a workspace, confirm the index
//! version and change events land correctly, then ask a question and
//! confirm the pack that comes back is fully evidence-backed.

use crate::harness::TestWorkspace;
use librarian_core::QueryRequest;

#[test]
fn bootstrap_indexes_every_rust_file_and_advances_index_version() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file(
            "src/auth/middleware.rs",
            b"pub fn auth_middleware(token: &str) -> bool { !token.is_empty() }",
        )
        .unwrap();
    workspace
        .write_file("src/main.rs", b"fn main() { let _ = 1 + 1; }")
        .unwrap();

    let (librarian, report) = workspace.bootstrap(1_700_000_000).unwrap();

    assert_eq!(report.files_indexed, 2);
    assert!(report.symbols_written >= 2);
    assert!(report.failures.is_empty());

    let status = librarian.status().unwrap();
    assert_eq!(status.index_version, 1);
    assert_eq!(status.files_indexed, 2);
}

#[test]
fn reindex_of_unchanged_workspace_leaves_symbol_count_stable() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file("src/lib.rs", b"pub fn double(x: i32) -> i32 { x * 2 }")
        .unwrap();

    let (mut librarian, first) = workspace.bootstrap(1_700_000_000).unwrap();
    assert_eq!(first.files_indexed, 1);

    let second = librarian
        .reindex(
            &["src/lib.rs".to_string()],
            librarian_core::ReindexScope::ChangedOnly,
            librarian_core::IndexMode::Full,
            1_700_000_100,
        )
        .unwrap();

    assert_eq!(second.files_indexed, 1);
    let status = librarian.status().unwrap();
    assert_eq!(status.index_version, 2);
    assert_eq!(status.symbols_indexed, first.symbols_written);
}

#[test]
fn query_returns_a_pack_with_evidence_and_resolvable_snippets() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file(
            "src/auth.rs",
            b"pub fn validate_permissions(role: &str) -> bool { role == \"admin\" }",
        )
        .unwrap();
    let (librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();

    let request = QueryRequest {
        query: "where is auth validated?".to_string(),
        token_budget: 4000,
        release_critical: false,
    };
    let response = librarian.query(&request, 1_700_000_200).unwrap();

    assert!(!response.pack.evidence_ids.is_empty());
    assert!(response.pack.confidence >= 0.1 && response.pack.confidence <= 0.95);
    for snippet in &response.pack.code_snippets {
        assert!(workspace.file_exists(&snippet.path));
    }
    let estimated_tokens: usize = response
        .pack
        .code_snippets
        .iter()
        .map(|s| s.text.len() / 4)
        .sum();
    assert!(estimated_tokens < request.token_budget);
}
