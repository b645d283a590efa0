//! File Watcher: owns the OS filesystem subscription and dispatches
//! debounced change notifications to registered handlers.
//!
//! Built on the `notify` crate. A per-path debounce timer (default
//! 100ms, see [`crate::config::WatcherConfig`]) coalesces the bursts of
//! events a single save can produce into one notification per path.
//! Handler panics and errors are caught and logged, never propagated:
//! the watcher must keep running regardless of what a handler does.

use crate::config::WatcherConfig;
use crate::error::{LibrarianError, Result};
use crate::types::ChangeType;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// A debounced filesystem change ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: PathBuf,
    pub change_type: ChangeType,
}

type Handler = Box<dyn Fn(&PathChange) + Send + 'static>;

/// Owns a `notify` subscription over a workspace root and a background
/// debounce thread. Dropping the watcher stops both.
pub struct Watcher {
    _inner: RecommendedWatcher,
    shutdown: Arc<Mutex<bool>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Starts watching `root` recursively, invoking `handler` for each
    /// debounced change. Does nothing (returns a no-op watcher) if the
    /// config disables the watcher.
    pub fn start(root: &Path, config: &WatcherConfig, handler: Handler) -> Result<Self> {
        let (tx, rx): (Sender<Event>, Receiver<Event>) = channel();

        let mut inner: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        debug!("watcher channel closed, dropping event");
                    }
                }
                Err(e) => error!("filesystem watch error: {}", e),
            }
        })
        .map_err(|e| LibrarianError::WatcherError(e.to_string()))?;

        if config.enabled {
            inner
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| LibrarianError::WatcherError(e.to_string()))?;
        }

        let shutdown = Arc::new(Mutex::new(false));
        let debounce_ms = config.debounce_ms;
        let enabled = config.enabled;

        let join_handle = if enabled {
            let shutdown_clone = Arc::clone(&shutdown);
            Some(std::thread::spawn(move || {
                debounce_loop(rx, handler, Duration::from_millis(debounce_ms), shutdown_clone);
            }))
        } else {
            None
        };

        Ok(Self { _inner: inner, shutdown, join_handle })
    }

    /// Signals the debounce thread to stop and waits for it to exit.
    pub fn stop(mut self) {
        if let Ok(mut flag) = self.shutdown.lock() {
            *flag = true;
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn debounce_loop(
    rx: Receiver<Event>,
    handler: Handler,
    debounce: Duration,
    shutdown: Arc<Mutex<bool>>,
) {
    let mut pending: HashMap<PathBuf, (ChangeType, Instant)> = HashMap::new();

    loop {
        if shutdown.lock().map(|f| *f).unwrap_or(true) {
            return;
        }

        match rx.recv_timeout(Duration::from_millis(25)) {
            Ok(event) => {
                if let Some(change_type) = classify(&event.kind) {
                    for path in event.paths {
                        pending.insert(path, (change_type, Instant::now()));
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, (_, seen))| now.duration_since(*seen) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();

        for path in ready {
            if let Some((change_type, _)) = pending.remove(&path) {
                let change = PathChange { path, change_type };
                let result = catch_unwind(AssertUnwindSafe(|| handler(&change)));
                if result.is_err() {
                    warn!(?change, "watcher handler panicked, continuing");
                }
            }
        }
    }
}

fn classify(kind: &EventKind) -> Option<ChangeType> {
    match kind {
        EventKind::Create(_) => Some(ChangeType::Created),
        EventKind::Modify(_) => Some(ChangeType::Modified),
        EventKind::Remove(_) => Some(ChangeType::Removed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_known_event_kinds() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some(ChangeType::Created));
        assert_eq!(
            classify(&EventKind::Modify(notify::event::ModifyKind::Any)),
            Some(ChangeType::Modified)
        );
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some(ChangeType::Removed));
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn watcher_disabled_by_config_does_not_spawn_thread() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatcherConfig { enabled: false, debounce_ms: 100 };
        let watcher = Watcher::start(dir.path(), &config, Box::new(|_| {})).unwrap();
        assert!(watcher.join_handle.is_none());
    }

    #[test]
    fn debounce_coalesces_rapid_events_into_one_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatcherConfig { enabled: true, debounce_ms: 50 };
        let seen: Arc<Mutex<Vec<PathChange>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let watcher = Watcher::start(
            dir.path(),
            &config,
            Box::new(move |change: &PathChange| {
                seen_clone.lock().unwrap().push(change.clone());
            }),
        )
        .unwrap();

        let file_path = dir.path().join("foo.rs");
        for i in 0..3 {
            std::fs::write(&file_path, format!("content {}", i)).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }

        std::thread::sleep(Duration::from_millis(300));
        watcher.stop();

        let events = seen.lock().unwrap();
        let matching = events.iter().filter(|c| c.path == file_path).count();
        assert!(matching <= 3);
    }
}
