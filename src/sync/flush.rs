//! Debounced journal flushing.
//!
//! Mutations mark the controller dirty; a background worker waits out the
//! debounce window (re-armed on every mark) and then rewrites the journal
//! from the dirty set. Bursts of mutations collapse into a single write.
//!
//! Locking contract: the flush-state mutex guards only the small state
//! struct and is never held across store calls or file I/O; the store-open
//! flag is checked immediately before and immediately after acquiring the
//! store, so no in-flight database call can race with close. The two locks
//! are never held in crossing order.

use crate::error::Result;
use crate::storage::SqliteStorage;
use crate::sync::{
    collect_all_for_export, ensure_no_conflict_markers, read_journal_map, write_journal_atomic,
    METADATA_LAST_IMPORT_HASH,
};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default debounce window between a mutation and its journal write.
pub const FLUSH_DEBOUNCE: Duration = Duration::from_secs(5);

/// Consecutive failures before the prominent warning.
const FAILURE_WARNING_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct FlushState {
    dirty: bool,
    full_export: bool,
    /// Pending debounce deadline; re-armed on every mark.
    deadline: Option<Instant>,
    failures: u32,
    last_error: Option<String>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<FlushState>,
    cv: Condvar,
    store: Arc<Mutex<SqliteStorage>>,
    store_open: Mutex<bool>,
    journal_path: PathBuf,
}

/// Long-lived owner of the auto-flush state.
///
/// Owned by the process entry point and injected into every mutation path
/// via [`SyncController::mark_dirty`]. Dropping the controller shuts it
/// down: a final synchronous flush if dirty, then the store-open flag is
/// cleared so the store can be closed safely.
pub struct SyncController {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    enabled: bool,
    debounce: Duration,
}

impl SyncController {
    /// Spawn the flush worker.
    ///
    /// `enabled` is false under `--no-auto-flush`: marks become no-ops and
    /// nothing is written automatically (dirty rows still accumulate in
    /// the store for a later explicit export).
    #[must_use]
    pub fn new(
        store: Arc<Mutex<SqliteStorage>>,
        journal_path: PathBuf,
        debounce: Duration,
        enabled: bool,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(FlushState::default()),
            cv: Condvar::new(),
            store,
            store_open: Mutex::new(true),
            journal_path,
        });

        let worker = if enabled {
            let shared = Arc::clone(&shared);
            Some(std::thread::spawn(move || worker_loop(&shared)))
        } else {
            None
        };

        Self {
            shared,
            worker,
            enabled,
            debounce,
        }
    }

    /// Mark the store dirty and (re-)arm the debounce timer.
    ///
    /// Every call cancels the pending deadline and starts a fresh one, so
    /// a burst of mutations produces exactly one write.
    pub fn mark_dirty(&self) {
        self.arm(false);
    }

    /// Mark dirty and request a full re-serialization instead of the
    /// incremental merge (for ID-reshaping operations).
    pub fn mark_dirty_full(&self) {
        self.arm(true);
    }

    fn arm(&self, full: bool) {
        if !self.enabled {
            return;
        }
        let mut state = self.shared.state.lock().expect("flush state poisoned");
        state.dirty = true;
        state.full_export = state.full_export || full;
        state.deadline = Some(Instant::now() + self.debounce);
        drop(state);
        self.shared.cv.notify_all();
    }

    /// Flush synchronously if dirty, bypassing the debounce.
    ///
    /// Returns whether a flush was attempted.
    pub fn flush_now(&self) -> bool {
        let (dirty, full) = {
            let mut state = self.shared.state.lock().expect("flush state poisoned");
            let snapshot = (state.dirty, state.full_export);
            state.dirty = false;
            state.full_export = false;
            state.deadline = None;
            snapshot
        };
        if dirty {
            flush_once(&self.shared, full);
        }
        dirty
    }

    /// A manual export succeeded: cancel the pending flush and reset the
    /// failure counter.
    pub fn note_manual_export(&self) {
        let mut state = self.shared.state.lock().expect("flush state poisoned");
        state.dirty = false;
        state.full_export = false;
        state.deadline = None;
        state.failures = 0;
        state.last_error = None;
    }

    /// Consecutive flush failures so far.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.shared
            .state
            .lock()
            .expect("flush state poisoned")
            .failures
    }

    /// Stop the worker, run a final synchronous flush if dirty, and clear
    /// the store-open flag so the caller can close the store.
    ///
    /// Idempotent; also invoked on drop.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("flush state poisoned");
            state.shutdown = true;
        }
        self.shared.cv.notify_all();

        // Waits for any in-flight flush to finish.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        if self.enabled {
            self.flush_now();
        }

        *self
            .shared
            .store_open
            .lock()
            .expect("store-open flag poisoned") = false;
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.state.lock().expect("flush state poisoned");
    loop {
        if state.shutdown {
            return;
        }

        match state.deadline {
            None => {
                state = shared.cv.wait(state).expect("flush state poisoned");
            }
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    let (guard, _) = shared
                        .cv
                        .wait_timeout(state, deadline - now)
                        .expect("flush state poisoned");
                    state = guard;
                } else if state.dirty {
                    state.dirty = false;
                    let full = state.full_export;
                    state.full_export = false;
                    state.deadline = None;
                    drop(state);

                    flush_once(shared, full);

                    state = shared.state.lock().expect("flush state poisoned");
                } else {
                    state.deadline = None;
                }
            }
        }
    }
}

fn flush_once(shared: &Shared, full: bool) {
    if !*shared
        .store_open
        .lock()
        .expect("store-open flag poisoned")
    {
        return;
    }

    match run_flush(shared, full) {
        Ok(_) => record_success(shared),
        Err(e) => record_failure(shared, &e.to_string()),
    }
}

/// One flush pass. The dirty set is snapshotted before the write and only
/// the snapshotted IDs are cleared afterwards, so mutations landing during
/// the write keep their flush ticket.
fn run_flush(shared: &Shared, full: bool) -> Result<usize> {
    let mut store = shared.store.lock().expect("store mutex poisoned");

    if !*shared
        .store_open
        .lock()
        .expect("store-open flag poisoned")
    {
        return Ok(0);
    }

    let dirty_ids = store.get_dirty_issues()?;
    if dirty_ids.is_empty() {
        return Ok(0);
    }

    let issues = if full {
        collect_all_for_export(&store)?
    } else {
        // Merging consumes the on-disk journal; unresolved merge markers
        // abort the flush rather than being dropped by the lenient reader.
        if let Ok(text) = std::fs::read_to_string(&shared.journal_path) {
            ensure_no_conflict_markers(&shared.journal_path, &text)?;
        }
        let mut map = read_journal_map(&shared.journal_path);
        for id in &dirty_ids {
            match store.get_issue_for_export(id)? {
                // Deleted since it was marked: drop its journal line.
                None => {
                    map.remove(id);
                }
                Some(issue) => {
                    map.insert(id.clone(), issue);
                }
            }
        }
        map.into_values().collect()
    };

    let hash = write_journal_atomic(&shared.journal_path, &issues)?;

    store.clear_dirty_issues(&dirty_ids)?;
    store.set_metadata(METADATA_LAST_IMPORT_HASH, &hash)?;

    tracing::debug!(
        flushed = dirty_ids.len(),
        full,
        path = %shared.journal_path.display(),
        "Journal flush complete"
    );

    Ok(dirty_ids.len())
}

fn record_success(shared: &Shared) {
    let mut state = shared.state.lock().expect("flush state poisoned");
    state.failures = 0;
    state.last_error = None;
}

fn record_failure(shared: &Shared, error: &str) {
    let failures = {
        let mut state = shared.state.lock().expect("flush state poisoned");
        state.failures += 1;
        state.dirty = true; // dirty set is preserved; retry next time
        state.last_error = Some(error.to_string());
        state.failures
    };

    eprintln!("Warning: auto-flush failed: {error}");

    if failures >= FAILURE_WARNING_THRESHOLD {
        eprintln!("\nCRITICAL: auto-flush has failed {failures} times consecutively.");
        eprintln!("Your journal may be out of sync with the database.");
        eprintln!("Run 'bd export' manually to fix.\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Issue;
    use crate::sync::parse_journal;
    use std::fs;
    use tempfile::TempDir;

    const TEST_DEBOUNCE: Duration = Duration::from_millis(60);

    fn setup(journal: PathBuf) -> (Arc<Mutex<SqliteStorage>>, SyncController) {
        let store = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
        let controller =
            SyncController::new(Arc::clone(&store), journal, TEST_DEBOUNCE, true);
        (store, controller)
    }

    fn create(store: &Arc<Mutex<SqliteStorage>>, title: &str) -> String {
        let mut issue = Issue {
            title: title.to_string(),
            ..Issue::default()
        };
        store
            .lock()
            .unwrap()
            .create_issue(&mut issue, "bd", "tester")
            .unwrap();
        issue.id
    }

    #[test]
    fn debounce_coalesces_mutations_into_one_write() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        let (store, controller) = setup(journal.clone());

        for n in 0..5 {
            create(&store, &format!("Issue {n}"));
            controller.mark_dirty();
        }

        // Inside the debounce window nothing has been written yet.
        assert!(!journal.exists());

        std::thread::sleep(TEST_DEBOUNCE * 4);

        let content = fs::read_to_string(&journal).unwrap();
        let issues = parse_journal(&content).unwrap();
        assert_eq!(issues.len(), 5);
        assert!(store.lock().unwrap().get_dirty_issues().unwrap().is_empty());
        assert_eq!(controller.failure_count(), 0);
    }

    #[test]
    fn flush_records_journal_hash() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        let (store, controller) = setup(journal.clone());

        create(&store, "Hashed");
        controller.mark_dirty();
        std::thread::sleep(TEST_DEBOUNCE * 4);

        let expected = crate::util::hash::hash_file(&journal).unwrap();
        let recorded = store
            .lock()
            .unwrap()
            .get_metadata(METADATA_LAST_IMPORT_HASH)
            .unwrap();
        assert_eq!(recorded.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn incremental_flush_merges_with_existing_journal() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");

        // A line from a previous run that the store never touched.
        let stranger = Issue {
            id: "zz-1".to_string(),
            title: "From another run".to_string(),
            ..Issue::default()
        };
        fs::write(
            &journal,
            format!("{}\n", serde_json::to_string(&stranger).unwrap()),
        )
        .unwrap();

        let (store, controller) = setup(journal.clone());
        create(&store, "Fresh");
        controller.mark_dirty();
        std::thread::sleep(TEST_DEBOUNCE * 4);

        let issues = parse_journal(&fs::read_to_string(&journal).unwrap()).unwrap();
        let ids: Vec<&str> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["bd-1", "zz-1"]);
    }

    #[test]
    fn incremental_flush_drops_deleted_issues() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        let (store, controller) = setup(journal.clone());

        let id = create(&store, "Doomed");
        let keeper = create(&store, "Keeper");
        controller.mark_dirty();
        controller.flush_now();
        assert_eq!(
            parse_journal(&fs::read_to_string(&journal).unwrap())
                .unwrap()
                .len(),
            2
        );

        store.lock().unwrap().delete_issue(&id, "tester").unwrap();
        controller.mark_dirty();
        controller.flush_now();

        let issues = parse_journal(&fs::read_to_string(&journal).unwrap()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, keeper);
        assert!(store.lock().unwrap().get_dirty_issues().unwrap().is_empty());
    }

    #[test]
    fn full_flush_ignores_stale_journal_lines() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");

        let stranger = Issue {
            id: "zz-1".to_string(),
            title: "Stale".to_string(),
            ..Issue::default()
        };
        fs::write(
            &journal,
            format!("{}\n", serde_json::to_string(&stranger).unwrap()),
        )
        .unwrap();

        let (store, controller) = setup(journal.clone());
        create(&store, "Only real issue");
        controller.mark_dirty_full();
        controller.flush_now();

        let issues = parse_journal(&fs::read_to_string(&journal).unwrap()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, "bd-1");
    }

    #[test]
    fn failed_flush_preserves_dirty_set_and_counts() {
        let temp = TempDir::new().unwrap();
        // Parent "directory" is a file: temp creation fails every time.
        let blocker = temp.path().join("blocked");
        fs::write(&blocker, b"not a directory").unwrap();
        let journal = blocker.join("issues.jsonl");

        let (store, mut controller) = setup(journal);
        create(&store, "Stuck");

        for expected in 1..=3 {
            controller.mark_dirty();
            controller.flush_now();
            assert_eq!(controller.failure_count(), expected);
        }

        assert_eq!(store.lock().unwrap().get_dirty_issues().unwrap().len(), 1);
        assert!(store
            .lock()
            .unwrap()
            .get_metadata(METADATA_LAST_IMPORT_HASH)
            .unwrap()
            .is_none());

        // Keep drop from attempting one more failing flush report.
        controller.note_manual_export();
        controller.shutdown();
    }

    #[test]
    fn failure_counter_resets_on_success() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocked");
        fs::write(&blocker, b"not a directory").unwrap();
        let bad_journal = blocker.join("issues.jsonl");

        let store = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
        let controller = SyncController::new(
            Arc::clone(&store),
            bad_journal,
            TEST_DEBOUNCE,
            true,
        );
        create(&store, "Retry me");
        controller.mark_dirty();
        controller.flush_now();
        assert_eq!(controller.failure_count(), 1);

        controller.note_manual_export();
        assert_eq!(controller.failure_count(), 0);
    }

    #[test]
    fn conflicted_journal_blocks_incremental_flush() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        fs::write(&journal, "<<<<<<< HEAD\n{\"id\":\"bd-9\"}\n>>>>>>> theirs\n").unwrap();
        let before = fs::read(&journal).unwrap();

        let (store, mut controller) = setup(journal.clone());
        create(&store, "Waiting on merge");
        controller.mark_dirty();
        controller.flush_now();

        assert_eq!(controller.failure_count(), 1);
        assert_eq!(fs::read(&journal).unwrap(), before);
        assert_eq!(store.lock().unwrap().get_dirty_issues().unwrap().len(), 1);

        controller.note_manual_export();
        controller.shutdown();
    }

    #[test]
    fn shutdown_runs_final_flush() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        let (store, mut controller) = setup(journal.clone());

        create(&store, "Last minute");
        controller.mark_dirty();
        // Shutdown before the debounce elapses; the final flush must run.
        controller.shutdown();

        let issues = parse_journal(&fs::read_to_string(&journal).unwrap()).unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn disabled_controller_never_writes() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        let store = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
        let mut controller =
            SyncController::new(Arc::clone(&store), journal.clone(), TEST_DEBOUNCE, false);

        create(&store, "Silent");
        controller.mark_dirty();
        std::thread::sleep(TEST_DEBOUNCE * 3);
        controller.shutdown();

        assert!(!journal.exists());
        // The dirty row stays for a later explicit export.
        assert_eq!(store.lock().unwrap().get_dirty_issues().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_mark_keeps_flush_ticket() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("issues.jsonl");
        let (store, controller) = setup(journal);

        create(&store, "First");
        controller.mark_dirty();
        controller.flush_now();

        // Marked after the snapshot-and-clear: still has its ticket.
        let second = create(&store, "Second");
        controller.mark_dirty();
        assert_eq!(
            store.lock().unwrap().get_dirty_issues().unwrap(),
            vec![second]
        );
    }
}
