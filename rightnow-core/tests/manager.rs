//! Integration tests for the document manager
//!
//! These drive a real `DocumentManager` against files in a temp directory.
//! File watching is replaced by `ManualWatcher`, which lets each test decide
//! exactly when a change notification fires.

use rightnow_core::watcher::ChangeCallback;
use rightnow_core::{
    ChangeWatcher, DocumentManager, Error, ManagerOptions, ManualClock, RecentProjectsFile,
    Snapshot, Task, WatchHandle, WorkState,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

// ============================================
// Helpers
// ============================================

/// Watcher that records callbacks instead of watching anything
#[derive(Default)]
struct ManualWatcher {
    callbacks: Mutex<Vec<ChangeCallback>>,
    cleaned_up: Arc<AtomicUsize>,
}

struct ManualHandle {
    cleaned_up: Arc<AtomicUsize>,
}

impl WatchHandle for ManualHandle {
    fn cleanup(self: Box<Self>) {
        self.cleaned_up.fetch_add(1, Ordering::SeqCst);
    }
}

impl ChangeWatcher for ManualWatcher {
    fn watch(
        &self,
        _path: &Path,
        on_change: ChangeCallback,
    ) -> rightnow_core::Result<Box<dyn WatchHandle>> {
        self.callbacks.lock().unwrap().push(on_change);
        Ok(Box::new(ManualHandle {
            cleaned_up: self.cleaned_up.clone(),
        }))
    }
}

impl ManualWatcher {
    /// Fire the callback registered by the `index`th watch
    fn fire(&self, index: usize) {
        let callback = self.callbacks.lock().unwrap()[index].clone();
        callback();
    }
}

struct FailingWatcher;

impl ChangeWatcher for FailingWatcher {
    fn watch(
        &self,
        _path: &Path,
        _on_change: ChangeCallback,
    ) -> rightnow_core::Result<Box<dyn WatchHandle>> {
        Err(Error::Watch("no watches left".to_string()))
    }
}

fn options(watcher: Option<Arc<dyn ChangeWatcher>>) -> ManagerOptions {
    rightnow_core::logging::init_test();
    ManagerOptions {
        clock: Arc::new(ManualClock::new(1_700_000_000_000)),
        watcher,
        recent: None,
    }
}

fn write_doc(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Subscribe and forward every published raw text to a channel
fn record_texts(manager: &DocumentManager) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.subscribe(move |snapshot: Snapshot| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(snapshot.raw_text.clone());
        }
    });
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("channel closed")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<String>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected notification: {:?}", extra);
}

// ============================================
// Round trip and writes
// ============================================

#[tokio::test]
async fn test_noop_update_round_trips_tokens() {
    let dir = TempDir::new().unwrap();
    let text = "- [ ] X [abc.x-task] [Running](todos://session/1)\n";
    let path = write_doc(&dir, "todo.md", text);
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();

    assert!(!manager.update(|_| {}).await.unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    assert_eq!(manager.snapshot().unwrap().raw_text, text);
}

#[tokio::test]
async fn test_write_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "# Today\n- [ ] one\n");
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();

    manager.set_active_task(Some("abc.one")).await.unwrap();
    manager.add_task("two").await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["todo.md"]);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(manager.snapshot().unwrap().raw_text, text);
    assert!(text.starts_with("---\nright_now:\n  active_task_id: abc.one\n---\n# Today\n"));
}

#[tokio::test]
async fn test_failed_write_reaches_caller() {
    let dir = TempDir::new().unwrap();
    let notes = dir.path().join("notes");
    std::fs::create_dir(&notes).unwrap();
    let path = notes.join("todo.md");
    std::fs::write(&path, "- [ ] one\n").unwrap();
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();
    let before = manager.snapshot().unwrap();

    // The directory disappears between the re-read and the write.
    let err = manager
        .update(|doc| {
            std::fs::remove_dir_all(&notes).unwrap();
            doc.push_task(Task::new("two"));
        })
        .await
        .unwrap_err();

    match err {
        Error::Write { path: failed, .. } => assert_eq!(failed, path),
        other => panic!("expected a write error, got {other:?}"),
    }
    let after = manager.snapshot().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.raw_text, "- [ ] one\n");
}

#[tokio::test]
async fn test_mutation_rereads_hand_edits() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();

    std::fs::write(&path, "- [ ] one\n- [ ] typed in an editor\n").unwrap();
    manager.add_task("from the app").await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("- [ ] typed in an editor\n"));
    assert!(text.contains("- [ ] from the app ["));
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let manager = DocumentManager::new(options(None));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = manager.subscribe(move |snapshot: Snapshot| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(snapshot.raw_text.clone());
        }
    });

    manager.load(&path).await.unwrap();
    assert_eq!(next(&mut rx).await, "- [ ] one\n");

    subscription.unsubscribe();
    manager.add_task("two").await.unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_subscribers_run_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let manager = DocumentManager::new(options(None));

    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        manager.subscribe(move |_| {
            let order = order.clone();
            async move {
                tokio::task::yield_now().await;
                order.lock().unwrap().push(name);
            }
        });
    }

    manager.load(&path).await.unwrap();
    assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
}

#[tokio::test]
async fn test_subscriber_may_call_back_into_manager() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n- [ ] two\n");
    let manager = DocumentManager::new(options(None));

    let handle = manager.clone();
    manager.subscribe(move |snapshot: Snapshot| {
        let handle = handle.clone();
        async move {
            if snapshot.document.tasks().any(|t| t.task_id.is_none()) {
                handle.assign_missing_task_ids().await.unwrap();
            }
        }
    });

    tokio::time::timeout(Duration::from_secs(5), manager.load(&path))
        .await
        .expect("subscriber deadlocked the manager")
        .unwrap();

    let state = manager.snapshot().unwrap();
    assert!(state.document.tasks().all(|t| t.task_id.is_some()));
}

#[tokio::test]
async fn test_slow_subscriber_does_not_leave_others_stale() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] a\n");
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();

    manager.subscribe(|snapshot: Snapshot| async move {
        if snapshot.raw_text.contains("one") && !snapshot.raw_text.contains("two") {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });
    let last_seen = Arc::new(Mutex::new(String::new()));
    let recorder = last_seen.clone();
    manager.subscribe(move |snapshot: Snapshot| {
        let recorder = recorder.clone();
        async move {
            *recorder.lock().unwrap() = snapshot.raw_text.clone();
        }
    });

    let (one, two) = tokio::join!(
        manager.update(|doc| doc.push_task(Task::new("one"))),
        manager.update(|doc| doc.push_task(Task::new("two"))),
    );
    assert!(one.unwrap());
    assert!(two.unwrap());

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, "- [ ] a\n- [ ] one\n- [ ] two\n");
    assert_eq!(*last_seen.lock().unwrap(), on_disk);
    assert_eq!(manager.snapshot().unwrap().raw_text, on_disk);
}

#[tokio::test]
async fn test_work_state_is_published_before_it_is_saved() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let watched = path.clone();
    manager.subscribe(move |snapshot: Snapshot| {
        let on_disk = std::fs::read_to_string(&watched).unwrap();
        recorder.lock().unwrap().push((snapshot.work_state, on_disk));
        async {}
    });

    assert!(manager.set_work_state(WorkState::Working).await.unwrap());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (Some(WorkState::Working), "- [ ] one\n".to_string()));
    assert_eq!(seen[1].0, Some(WorkState::Working));
    assert!(seen[1].1.contains("work_state: working"));
}

#[tokio::test]
async fn test_load_records_recent_document() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let recent = Arc::new(RecentProjectsFile::new(dir.path().join("data/recent.json")));
    let manager = DocumentManager::new(ManagerOptions {
        recent: Some(recent.clone()),
        ..options(None)
    });

    manager.load(&path).await.unwrap();

    let entries = recent.list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, path);
}

// ============================================
// Loads and staleness
// ============================================

#[tokio::test]
async fn test_later_load_wins() {
    let dir = TempDir::new().unwrap();
    let a = write_doc(&dir, "a.md", "- [ ] from a\n");
    let b = write_doc(&dir, "b.md", "- [ ] from b\n");
    let manager = DocumentManager::new(options(None));
    let mut rx = record_texts(&manager);

    let (first, second) = tokio::join!(manager.load(&a), manager.load(&b));
    first.unwrap();
    second.unwrap();

    let state = manager.snapshot().unwrap();
    assert_eq!(state.full_path, b);
    assert_eq!(state.raw_text, "- [ ] from b\n");

    let mut published = Vec::new();
    while let Ok(text) = rx.try_recv() {
        published.push(text);
    }
    assert_eq!(published.last().map(String::as_str), Some("- [ ] from b\n"));
}

#[tokio::test]
async fn test_watch_failure_keeps_document_usable() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let manager = DocumentManager::new(options(Some(Arc::new(FailingWatcher))));

    manager.load(&path).await.unwrap();
    assert!(manager.toggle_task("abc.none").await.is_ok());
    assert_eq!(manager.phase(), rightnow_core::Phase::Ready);
}

// ============================================
// External changes
// ============================================

#[tokio::test]
async fn test_watcher_change_reloads() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let watcher = Arc::new(ManualWatcher::default());
    let manager = DocumentManager::new(options(Some(watcher.clone())));
    manager.load(&path).await.unwrap();
    let mut rx = record_texts(&manager);

    std::fs::write(&path, "- [x] one\n").unwrap();
    watcher.fire(0);
    assert_eq!(next(&mut rx).await, "- [x] one\n");
    assert!(manager.snapshot().unwrap().document.tasks().all(|t| t.is_complete()));
}

#[tokio::test]
async fn test_own_writes_do_not_trigger_reload() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let watcher = Arc::new(ManualWatcher::default());
    let manager = DocumentManager::new(options(Some(watcher.clone())));
    manager.load(&path).await.unwrap();
    let mut rx = record_texts(&manager);

    manager.add_task("two").await.unwrap();
    let written = next(&mut rx).await;

    watcher.fire(0);
    assert_quiet(&mut rx).await;
    assert_eq!(manager.snapshot().unwrap().raw_text, written);
}

#[tokio::test]
async fn test_unparseable_reload_keeps_last_good_state() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "- [ ] one\n");
    let watcher = Arc::new(ManualWatcher::default());
    let manager = DocumentManager::new(options(Some(watcher.clone())));
    manager.load(&path).await.unwrap();
    let mut rx = record_texts(&manager);

    std::fs::write(&path, "---\nhalf: [written\n---\n").unwrap();
    watcher.fire(0);
    assert_quiet(&mut rx).await;
    assert_eq!(manager.snapshot().unwrap().raw_text, "- [ ] one\n");

    std::fs::write(&path, "- [ ] one\n- [ ] fixed\n").unwrap();
    watcher.fire(0);
    assert_eq!(next(&mut rx).await, "- [ ] one\n- [ ] fixed\n");
}

#[tokio::test]
async fn test_triggers_during_reload_coalesce() {
    let dir = TempDir::new().unwrap();
    let path = write_doc(&dir, "todo.md", "v0\n");
    let manager = DocumentManager::new(options(None));
    manager.load(&path).await.unwrap();

    let gate = Arc::new(Semaphore::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let held = gate.clone();
    manager.subscribe(move |snapshot: Snapshot| {
        let tx = tx.clone();
        let held = held.clone();
        async move {
            let text = snapshot.raw_text.clone();
            let _ = tx.send(text.clone());
            if text == "v1\n" {
                held.acquire().await.unwrap().forget();
            }
        }
    });

    std::fs::write(&path, "v1\n").unwrap();
    manager.notify_external_change();
    assert_eq!(next(&mut rx).await, "v1\n");

    // The first reload is now parked in its subscriber.
    std::fs::write(&path, "v2\n").unwrap();
    manager.notify_external_change();
    std::fs::write(&path, "v3\n").unwrap();
    manager.notify_external_change();

    gate.add_permits(1);
    assert_eq!(next(&mut rx).await, "v3\n");
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_new_load_replaces_watch() {
    let dir = TempDir::new().unwrap();
    let a = write_doc(&dir, "a.md", "- [ ] a\n");
    let b = write_doc(&dir, "b.md", "- [ ] b\n");
    let watcher = Arc::new(ManualWatcher::default());
    let manager = DocumentManager::new(options(Some(watcher.clone())));

    manager.load(&a).await.unwrap();
    manager.load(&b).await.unwrap();
    assert_eq!(watcher.cleaned_up.load(Ordering::SeqCst), 1);

    let mut rx = record_texts(&manager);
    std::fs::write(&a, "- [x] a\n").unwrap();
    watcher.fire(0);
    assert_quiet(&mut rx).await;
    assert_eq!(manager.snapshot().unwrap().full_path, b);

    manager.shutdown();
    assert_eq!(watcher.cleaned_up.load(Ordering::SeqCst), 2);
    assert!(manager.snapshot().is_none());
}
