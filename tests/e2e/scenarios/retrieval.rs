//! End-to-end coverage for the Retriever/Coordinator path: exact-name
//! lookups rank the matching symbol first, and `trace_calls`-flavored
//! queries escalate into structural expansion.

use crate::harness::TestWorkspace;
use librarian_core::QueryRequest;

#[test]
fn lookup_query_ranks_the_exact_name_match_first() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file("src/auth.rs", b"pub fn login(user: &str) -> bool { !user.is_empty() }")
        .unwrap();
    workspace
        .write_file("src/db.rs", b"pub fn connect(url: &str) -> bool { !url.is_empty() }")
        .unwrap();
    let (librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();

    let request = QueryRequest { query: "login".to_string(), token_budget: 4000, release_critical: false };
    let response = librarian.query(&request, 1_700_000_100).unwrap();

    assert!(response.pack.related_files.iter().any(|p| p == "src/auth.rs"));
}

#[test]
fn trace_calls_query_escalates_to_a_deeper_depth_than_a_plain_lookup() {
    let workspace = TestWorkspace::empty().unwrap();
    workspace
        .write_file(
            "src/handler.rs",
            b"use crate::auth::login;\npub fn handle() -> bool { login(\"x\") }",
        )
        .unwrap();
    workspace
        .write_file("src/auth.rs", b"pub fn login(user: &str) -> bool { !user.is_empty() }")
        .unwrap();
    let (librarian, _) = workspace.bootstrap(1_700_000_000).unwrap();

    let request =
        QueryRequest { query: "who calls login".to_string(), token_budget: 4000, release_critical: false };
    let response = librarian.query(&request, 1_700_000_200).unwrap();

    assert_eq!(response.intent, librarian_core::QueryIntent::TraceCalls);
}
