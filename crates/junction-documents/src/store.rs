//! Versioned, per-path document storage.
//!
//! The store maps normalised absolute paths to their current text and
//! version. Each path owns its own lock, so writers to different files never
//! contend; readers take cheap snapshots and never observe a partially
//! applied batch. Versions are monotonic per path for the lifetime of the
//! process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::debug;

use junction_config::IndexBase;

use crate::changes::{ChangeRecord, apply_change_set};
use crate::errors::StoreError;

/// Tracing target for store operations.
const STORE_TARGET: &str = "junction_documents::store";

/// Point-in-time view of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    /// Text at the time of the snapshot.
    pub text: String,
    /// Version the text corresponds to.
    pub version: u64,
    /// Project claiming the path, when any does.
    pub project: Option<String>,
    /// Whether a client currently holds the document open.
    pub open: bool,
}

/// Mutable state of one tracked document.
#[derive(Debug)]
struct DocumentState {
    text: String,
    version: u64,
    project: Option<String>,
    open: bool,
}

/// Authoritative in-memory text store, shareable via `Arc`.
#[derive(Debug)]
pub struct DocumentStore {
    index_base: IndexBase,
    entries: RwLock<HashMap<PathBuf, Arc<Mutex<DocumentState>>>>,
}

impl DocumentStore {
    /// Creates an empty store using the given indexing convention.
    #[must_use]
    pub fn new(index_base: IndexBase) -> Self {
        Self {
            index_base,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide indexing convention the store applies.
    #[must_use]
    pub fn index_base(&self) -> IndexBase {
        self.index_base
    }

    /// Takes a snapshot of the document at `path`, when tracked.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<DocumentSnapshot> {
        let key = normalise_path(path);
        let entry = {
            let entries = read_guard(&self.entries);
            entries.get(&key).cloned()
        }?;
        let state = lock_entry(&entry);
        Some(DocumentSnapshot {
            text: state.text.clone(),
            version: state.version,
            project: state.project.clone(),
            open: state.open,
        })
    }

    /// Replaces the full text of `path`, creating the document when absent.
    ///
    /// Returns the new version.
    pub fn put_full(&self, path: &Path, text: impl Into<String>) -> u64 {
        let entry = self.entry_or_insert(path);
        let mut state = lock_entry(&entry);
        state.text = text.into();
        state.version += 1;
        debug!(
            target: STORE_TARGET,
            path = %path.display(),
            version = state.version,
            "full buffer replacement"
        );
        state.version
    }

    /// Applies an ordered change set to the document at `path`.
    ///
    /// Records are resolved sequentially against the evolving text. The
    /// batch is atomic: on any failure the stored text and version are
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for untracked paths and
    /// [`StoreError::InvalidRange`] when any record addresses coordinates
    /// outside the evolving text.
    pub fn apply_changes(&self, path: &Path, changes: &[ChangeRecord]) -> Result<u64, StoreError> {
        let key = normalise_path(path);
        let entry = {
            let entries = read_guard(&self.entries);
            entries.get(&key).cloned()
        }
        .ok_or_else(|| StoreError::NotFound {
            path: path.to_path_buf(),
        })?;

        let mut state = lock_entry(&entry);
        let updated = apply_change_set(&state.text, changes, self.index_base).map_err(|source| {
            StoreError::InvalidRange {
                path: path.to_path_buf(),
                source,
            }
        })?;
        state.text = updated;
        state.version += 1;
        debug!(
            target: STORE_TARGET,
            path = %path.display(),
            version = state.version,
            change_count = changes.len(),
            "incremental buffer update"
        );
        Ok(state.version)
    }

    /// Stops tracking `path`. Returns whether a document was removed.
    pub fn remove(&self, path: &Path) -> bool {
        let key = normalise_path(path);
        let mut entries = write_guard(&self.entries);
        entries.remove(&key).is_some()
    }

    /// Sets the open flag on an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for untracked paths.
    pub fn mark_open(&self, path: &Path, open: bool) -> Result<(), StoreError> {
        let entry = self.existing_entry(path)?;
        lock_entry(&entry).open = open;
        Ok(())
    }

    /// Records which project claims an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for untracked paths.
    pub fn assign_project(&self, path: &Path, project: Option<String>) -> Result<(), StoreError> {
        let entry = self.existing_entry(path)?;
        lock_entry(&entry).project = project;
        Ok(())
    }

    /// Drops every closed document claimed by `project`.
    ///
    /// Open documents survive a project unload: a client still holds them,
    /// and they fall back to orphan ownership.
    pub fn evict_project(&self, project: &str) {
        let mut entries = write_guard(&self.entries);
        entries.retain(|path, entry| {
            let mut state = lock_entry(entry);
            if state.project.as_deref() != Some(project) {
                return true;
            }
            if state.open {
                state.project = None;
                return true;
            }
            debug!(
                target: STORE_TARGET,
                path = %path.display(),
                project,
                "document dropped with its project"
            );
            false
        });
    }

    /// Paths currently tracked, in no particular order.
    #[must_use]
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        read_guard(&self.entries).keys().cloned().collect()
    }

    /// Number of tracked documents.
    #[must_use]
    pub fn len(&self) -> usize {
        read_guard(&self.entries).len()
    }

    /// Returns `true` when no documents are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read_guard(&self.entries).is_empty()
    }

    fn entry_or_insert(&self, path: &Path) -> Arc<Mutex<DocumentState>> {
        let key = normalise_path(path);
        let mut entries = write_guard(&self.entries);
        entries
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(DocumentState {
                    text: String::new(),
                    version: 0,
                    project: None,
                    open: false,
                }))
            })
            .clone()
    }

    fn existing_entry(&self, path: &Path) -> Result<Arc<Mutex<DocumentState>>, StoreError> {
        let key = normalise_path(path);
        let entries = read_guard(&self.entries);
        entries
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_path_buf(),
            })
    }
}

/// Locks a document entry, recovering from poisoning.
///
/// A panicking writer leaves the last fully committed text in place, so
/// continuing after poison cannot expose a torn write.
fn lock_entry(entry: &Arc<Mutex<DocumentState>>) -> MutexGuard<'_, DocumentState> {
    entry.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn read_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poison| poison.into_inner())
}

fn write_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poison| poison.into_inner())
}

/// Normalises a path for use as a store key.
///
/// Separators are unified so the same file addressed with mixed separators
/// resolves to one document; on case-insensitive platforms the key is also
/// lowercased.
fn normalise_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    #[cfg(windows)]
    {
        PathBuf::from(text.replace('\\', "/").to_lowercase())
    }
    #[cfg(not(windows))]
    {
        PathBuf::from(text.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::new(IndexBase::Zero)
    }

    #[test]
    fn put_full_creates_and_versions() {
        let store = store();
        let path = Path::new("/ws/a.rs");

        assert_eq!(store.put_full(path, "fn a() {}"), 1);
        assert_eq!(store.put_full(path, "fn b() {}"), 2);

        let snapshot = store.get(path).expect("document tracked");
        assert_eq!(snapshot.text, "fn b() {}");
        assert_eq!(snapshot.version, 2);
    }

    #[test]
    fn apply_changes_extends_a_declaration() {
        let store = store();
        let path = Path::new("/ws/a.cs");
        store.put_full(path, "class A{}");

        let change = ChangeRecord::insertion(0, 7, " : B");
        let version = store
            .apply_changes(path, &[change])
            .expect("change applies");

        assert_eq!(version, 2);
        assert_eq!(store.get(path).expect("tracked").text, "class A : B{}");
    }

    #[test]
    fn apply_changes_requires_a_tracked_document() {
        let store = store();
        let path = Path::new("/ws/missing.cs");

        let error = store
            .apply_changes(path, &[ChangeRecord::insertion(0, 0, "x")])
            .expect_err("untracked path is rejected");
        assert!(matches!(error, StoreError::NotFound { .. }));

        // A full write on the same unknown path succeeds and creates it.
        assert_eq!(store.put_full(path, "x"), 1);
        assert_eq!(store.get(path).expect("tracked").text, "x");
    }

    #[test]
    fn failed_batch_leaves_text_and_version_untouched() {
        let store = store();
        let path = Path::new("/ws/a.rs");
        store.put_full(path, "abc");

        let batch = vec![
            ChangeRecord::insertion(0, 0, "x"),
            ChangeRecord::insertion(9, 0, "y"),
        ];
        let error = store
            .apply_changes(path, &batch)
            .expect_err("second record is out of bounds");
        assert!(matches!(error, StoreError::InvalidRange { .. }));

        let snapshot = store.get(path).expect("tracked");
        assert_eq!(snapshot.text, "abc");
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn remove_untracks() {
        let store = store();
        let path = Path::new("/ws/a.rs");
        store.put_full(path, "x");

        assert!(store.remove(path));
        assert!(!store.remove(path));
        assert!(store.get(path).is_none());
    }

    #[test]
    fn open_flag_round_trips() {
        let store = store();
        let path = Path::new("/ws/a.rs");
        store.put_full(path, "x");

        store.mark_open(path, true).expect("mark open");
        assert!(store.get(path).expect("tracked").open);
        store.mark_open(path, false).expect("mark closed");
        assert!(!store.get(path).expect("tracked").open);

        let error = store
            .mark_open(Path::new("/ws/other.rs"), true)
            .expect_err("unknown path");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[test]
    fn evict_project_spares_open_documents() {
        let store = store();
        let closed = Path::new("/ws/closed.rs");
        let open = Path::new("/ws/open.rs");
        store.put_full(closed, "a");
        store.put_full(open, "b");
        store
            .assign_project(closed, Some("app".to_owned()))
            .expect("assign");
        store
            .assign_project(open, Some("app".to_owned()))
            .expect("assign");
        store.mark_open(open, true).expect("open");

        store.evict_project("app");

        assert!(store.get(closed).is_none());
        let survivor = store.get(open).expect("open document survives");
        assert!(survivor.project.is_none());
    }

    #[test]
    fn writers_to_the_same_path_serialise() {
        let store = Arc::new(store());
        let path = PathBuf::from("/ws/contended.rs");
        store.put_full(&path, String::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let path = path.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let change = ChangeRecord::insertion(0, 0, "x");
                    store
                        .apply_changes(&path, &[change])
                        .expect("contended change applies");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let snapshot = store.get(&path).expect("tracked");
        assert_eq!(snapshot.text.len(), 8 * 50);
        assert_eq!(snapshot.version, 8 * 50 + 1);
    }

    #[test]
    fn versions_are_monotonic_under_mixed_writes() {
        let store = store();
        let path = Path::new("/ws/a.rs");
        let mut last = store.put_full(path, "0");
        for i in 0..10 {
            let version = if i % 2 == 0 {
                store.put_full(path, "full")
            } else {
                store
                    .apply_changes(path, &[ChangeRecord::insertion(0, 0, "i")])
                    .expect("change applies")
            };
            assert!(version > last, "version must strictly increase");
            last = version;
        }
    }
}
