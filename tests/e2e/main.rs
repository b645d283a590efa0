//! End-to-end scenario suite covering coordination, recovery,
//! retrieval, and index state transitions: real workspaces on disk,
//! driven entirely through `librarian_core`'s public API.

mod harness;

mod scenarios {
    mod crash_recovery;
    mod happy_path;
    mod retrieval;
    mod state_transitions;
}
