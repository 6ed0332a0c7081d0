//! Document manager
//!
//! Owns the one loaded document and is the only thing that writes it.
//!
//! ## Ordering
//!
//! Every mutation and every watcher-driven reload runs through a single FIFO
//! queue (a fair `tokio::sync::Mutex`). Each mutation re-reads the file
//! before transforming it, so edits made by hand between two operations are
//! never overwritten with stale content. The queue is released before
//! subscribers run, so a subscriber may call back into the manager.
//!
//! Subscribers are only handed the latest snapshot. When a newer one is
//! published while a notification is still running, the older one is not
//! delivered to the subscribers that have not seen it yet; the newer
//! notification reaches them instead.
//!
//! ## Staleness
//!
//! A load token is bumped by every [`DocumentManager::load`] and by
//! [`DocumentManager::shutdown`]. Operations capture the token when they are
//! submitted. One that was submitted under an older token does nothing once
//! it reaches the front of the queue, and I/O already in flight under an old
//! token does not touch the current state.
//!
//! ## External edits
//!
//! The [`ChangeWatcher`] fires on every relevant file event. Bursts are
//! coalesced (see [`ReloadState`]) and a reload that reads back exactly the
//! current text is a no-op, which also absorbs the manager's own writes.

mod coalesce;
pub mod fs;

pub use coalesce::ReloadState;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::document::{parse, serialize};
use crate::error::{Error, Result};
use crate::recent::{RecentProjects, RecentProjectsFile};
use crate::reorder::{self, Direction};
use crate::task_id;
use crate::types::{
    Document, SessionStatus, StateTransitions, StateTransitionsPatch, Task, WorkState,
};
use crate::watcher::{ChangeCallback, ChangeWatcher, NotifyWatcher, WatchHandle};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use tokio::runtime::Handle;

/// Everything known about the loaded document at one point in time
#[derive(Debug, Clone)]
pub struct LoadedDocumentState {
    pub full_path: PathBuf,
    pub document: Document,
    /// Exactly what was last read from or written to disk
    pub raw_text: String,
    /// May run ahead of the header while a timer change is being saved
    pub work_state: Option<WorkState>,
    pub state_transitions: StateTransitions,
}

impl LoadedDocumentState {
    pub fn new(full_path: PathBuf, raw_text: String, document: Document) -> Self {
        Self {
            work_state: document.header.work_state(),
            state_transitions: document.header.state_transitions(),
            full_path,
            document,
            raw_text,
        }
    }
}

/// Immutable view handed to subscribers
pub type Snapshot = Arc<LoadedDocumentState>;

pub type SubscriberFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Subscriber = Arc<dyn Fn(Snapshot) -> SubscriberFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unloaded,
    Loading,
    Ready,
}

/// Collaborators the manager talks to
#[derive(Clone)]
pub struct ManagerOptions {
    pub clock: Arc<dyn Clock>,
    /// `None` disables picking up external edits
    pub watcher: Option<Arc<dyn ChangeWatcher>>,
    pub recent: Option<Arc<dyn RecentProjects>>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            watcher: Some(Arc::new(NotifyWatcher)),
            recent: None,
        }
    }
}

impl ManagerOptions {
    /// Watcher per `[watcher] enabled`, recent projects in the data dir
    pub fn from_config(config: &Config) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            watcher: config
                .watcher
                .enabled
                .then(|| Arc::new(NotifyWatcher) as Arc<dyn ChangeWatcher>),
            recent: Some(Arc::new(RecentProjectsFile::default_location())),
        }
    }
}

struct Current {
    phase: Phase,
    snapshot: Option<Snapshot>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    watcher: Option<Arc<dyn ChangeWatcher>>,
    recent: Option<Arc<dyn RecentProjects>>,
    load_token: AtomicU64,
    queue: tokio::sync::Mutex<()>,
    current: StdMutex<Current>,
    subscribers: StdMutex<Vec<(u64, Subscriber)>>,
    next_subscriber: AtomicU64,
    watch_handle: StdMutex<Option<Box<dyn WatchHandle>>>,
    reload: StdMutex<ReloadState>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn token(&self) -> u64 {
        self.load_token.load(Ordering::SeqCst)
    }

    fn is_current(&self, token: u64) -> bool {
        self.token() == token
    }

    /// Invalidate in-flight work and forget the current document
    fn invalidate(&self, phase: Phase) -> u64 {
        let token = self.load_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_watching();
        let mut current = lock(&self.current);
        current.phase = phase;
        current.snapshot = None;
        token
    }

    fn snapshot(&self) -> Option<Snapshot> {
        lock(&self.current).snapshot.clone()
    }

    /// Publish `snapshot` unless `token` has been superseded
    fn publish(&self, token: u64, snapshot: Snapshot) -> bool {
        let mut current = lock(&self.current);
        if !self.is_current(token) {
            return false;
        }
        current.phase = Phase::Ready;
        current.snapshot = Some(snapshot);
        true
    }

    fn is_latest(&self, snapshot: &Snapshot) -> bool {
        lock(&self.current)
            .snapshot
            .as_ref()
            .is_some_and(|latest| Arc::ptr_eq(latest, snapshot))
    }

    fn stop_watching(&self) {
        let handle = lock(&self.watch_handle).take();
        if let Some(handle) = handle {
            handle.cleanup();
        }
    }
}

/// Cancels a [`DocumentManager::subscribe`] registration. Dropping it
/// leaves the subscriber registered.
pub struct Subscription {
    inner: Weak<Inner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            lock(&inner.subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}

/// Handle to the manager; clones share the same document.
#[derive(Clone)]
pub struct DocumentManager {
    inner: Arc<Inner>,
}

impl Default for DocumentManager {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

impl DocumentManager {
    pub fn new(options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock: options.clock,
                watcher: options.watcher,
                recent: options.recent,
                load_token: AtomicU64::new(0),
                queue: tokio::sync::Mutex::new(()),
                current: StdMutex::new(Current {
                    phase: Phase::Unloaded,
                    snapshot: None,
                }),
                subscribers: StdMutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                watch_handle: StdMutex::new(None),
                reload: StdMutex::new(ReloadState::Idle),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        lock(&self.inner.current).phase
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.snapshot()
    }

    /// Register a callback run after every state change, in subscription
    /// order, each awaited before the next.
    pub fn subscribe<F, Fut>(&self, callback: F) -> Subscription
    where
        F: Fn(Snapshot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let subscriber: Subscriber =
            Arc::new(move |snapshot: Snapshot| -> SubscriberFuture { Box::pin(callback(snapshot)) });
        lock(&self.inner.subscribers).push((id, subscriber));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    async fn notify(&self, snapshot: Snapshot) {
        let subscribers: Vec<Subscriber> = lock(&self.inner.subscribers)
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            if !self.inner.is_latest(&snapshot) {
                tracing::debug!("Snapshot superseded, skipping remaining subscribers");
                return;
            }
            subscriber(snapshot.clone()).await;
        }
    }

    // ----- lifecycle -----

    /// Load `path`, replacing whatever was loaded before.
    ///
    /// Read and parse failures are returned and leave the manager unloaded.
    /// A load overtaken by a later one returns `Ok` without touching state.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let token = self.inner.invalidate(Phase::Loading);
        let result = self.load_with_token(token, path.as_ref()).await;
        if let Err(e) = &result {
            if self.inner.is_current(token) {
                tracing::warn!(path = %path.as_ref().display(), error = %e, "Load failed");
                let mut current = lock(&self.inner.current);
                current.phase = Phase::Unloaded;
            }
        }
        result
    }

    async fn load_with_token(&self, token: u64, path: &Path) -> Result<()> {
        let inner = &self.inner;
        let full_path = fs::absolute(path)?;
        tracing::info!(path = %full_path.display(), token, "Loading document");

        let raw_text = fs::read_text(&full_path).await?;
        let document = parse(&raw_text)?;
        let snapshot = Arc::new(LoadedDocumentState::new(
            full_path.clone(),
            raw_text,
            document,
        ));
        if !inner.publish(token, snapshot.clone()) {
            tracing::debug!(path = %full_path.display(), token, "Discarding superseded load");
            return Ok(());
        }

        if let Some(recent) = &inner.recent {
            if let Err(e) = recent.add_recent(&full_path) {
                tracing::warn!(error = %e, "Failed to record recent document");
            }
        }

        self.start_watching(token, &full_path);

        tracing::info!(
            path = %full_path.display(),
            tasks = snapshot.document.tasks().count(),
            "Document loaded"
        );
        self.notify(snapshot).await;
        Ok(())
    }

    /// Drop the document, stop watching, and invalidate in-flight work
    pub fn shutdown(&self) {
        self.inner.invalidate(Phase::Unloaded);
        tracing::info!("Document manager shut down");
    }

    // ----- external changes -----

    fn start_watching(&self, token: u64, path: &Path) {
        let Some(watcher) = &self.inner.watcher else {
            return;
        };
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "No async runtime, external edits will not be picked up");
                return;
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let on_change: ChangeCallback = Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.is_current(token) {
                DocumentManager { inner }.schedule_reload(&runtime);
            }
        });

        match watcher.watch(path, on_change) {
            Ok(handle) => {
                if self.inner.is_current(token) {
                    let previous = lock(&self.inner.watch_handle).replace(handle);
                    if let Some(previous) = previous {
                        previous.cleanup();
                    }
                } else {
                    handle.cleanup();
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "File watching unavailable, external edits will not be picked up"
                );
            }
        }
    }

    /// Treat the document as changed on disk, as if the watcher fired.
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify_external_change(&self) {
        match Handle::try_current() {
            Ok(runtime) => self.schedule_reload(&runtime),
            Err(e) => tracing::warn!(error = %e, "External change reported outside a runtime"),
        }
    }

    fn schedule_reload(&self, runtime: &Handle) {
        let start = lock(&self.inner.reload).trigger();
        if !start {
            tracing::debug!("Reload in flight, coalescing change");
            return;
        }
        let manager = self.clone();
        runtime.spawn(async move { manager.run_reloads().await });
    }

    async fn run_reloads(&self) {
        loop {
            self.reload().await;
            let rerun = lock(&self.inner.reload).finish();
            if !rerun {
                break;
            }
        }
    }

    async fn reload(&self) {
        let inner = &self.inner;
        let queued = inner.queue.lock().await;
        let token = inner.token();
        let Some(current) = inner.snapshot() else {
            return;
        };

        let text = match fs::read_text(&current.full_path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Reload could not read document");
                return;
            }
        };
        if text == current.raw_text {
            tracing::debug!("Document unchanged on disk");
            return;
        }

        let document = match parse(&text) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "Document unreadable, keeping last good state");
                return;
            }
        };
        let snapshot = Arc::new(LoadedDocumentState::new(
            current.full_path.clone(),
            text,
            document,
        ));
        if !inner.publish(token, snapshot.clone()) {
            tracing::debug!(token, "Discarding reload for superseded document");
            return;
        }
        drop(queued);

        tracing::info!("Reloaded document after external change");
        self.notify(snapshot).await;
    }

    // ----- mutations -----

    /// Re-read, transform, and write the document.
    ///
    /// Returns `Ok(true)` when the file was written, `Ok(false)` when the
    /// transform changed nothing, the file on disk did not parse, or another
    /// document was loaded after the operation was submitted.
    pub async fn update<F>(&self, transform: F) -> Result<bool>
    where
        F: FnOnce(&mut Document) + Send,
    {
        self.mutate("update", self.inner.token(), transform).await
    }

    /// Run `transform` in queue order on behalf of an operation submitted
    /// under `token`
    async fn mutate<F>(&self, op: &'static str, token: u64, transform: F) -> Result<bool>
    where
        F: FnOnce(&mut Document) + Send,
    {
        let inner = &self.inner;
        let queued = inner.queue.lock().await;
        if !inner.is_current(token) {
            tracing::debug!(op, token, "Document replaced before operation ran");
            return Ok(false);
        }
        let current = inner.snapshot().ok_or(Error::NotLoaded)?;
        let path = current.full_path.clone();

        let fresh = fs::read_text(&path).await?;
        let parsed = match parse(&fresh) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(op, error = %e, "Document unreadable, skipping write");
                return Ok(false);
            }
        };

        let mut next = parsed.clone();
        transform(&mut next);
        let output = serialize(&next);

        if output == fresh {
            tracing::debug!(op, "No change, skipping write");
            if current.raw_text != fresh {
                let snapshot = Arc::new(LoadedDocumentState::new(path, fresh, parsed));
                if inner.publish(token, snapshot.clone()) {
                    drop(queued);
                    self.notify(snapshot).await;
                }
            }
            return Ok(false);
        }

        fs::write_atomic(&path, &output, inner.clock.now_ms()).await?;

        let document = parse(&output).unwrap_or(next);
        let snapshot = Arc::new(LoadedDocumentState::new(path, output, document));
        if !inner.publish(token, snapshot.clone()) {
            tracing::debug!(op, token, "Document replaced during write");
            return Ok(true);
        }
        drop(queued);

        tracing::info!(op, "Document saved");
        self.notify(snapshot).await;
        Ok(true)
    }

    /// Switch the timer state, starting a new interval now.
    ///
    /// Subscribers see the new state before it is saved.
    pub async fn set_work_state(&self, state: WorkState) -> Result<bool> {
        let token = self.inner.token();
        let current = self.inner.snapshot().ok_or(Error::NotLoaded)?;
        if current.work_state == Some(state) {
            tracing::debug!(state = %state, "Work state unchanged");
            return Ok(false);
        }

        let now = self.inner.clock.now_ms();
        let transitions = StateTransitions {
            started_at: Some(now),
            ends_at: current
                .document
                .header
                .duration_for(state)
                .map(|minutes| now + minutes as i64 * 60_000),
        };

        let optimistic = Arc::new(LoadedDocumentState {
            work_state: Some(state),
            state_transitions: transitions,
            ..(*current).clone()
        });
        if !self.inner.publish(token, optimistic.clone()) {
            tracing::debug!(token, "Document replaced before work state changed");
            return Ok(false);
        }
        tracing::info!(state = %state, started_at = now, "Work state changed");
        self.notify(optimistic).await;

        self.mutate("set_work_state", token, move |doc| {
            doc.header.set_work_state(Some(state));
            doc.header.set_state_transitions(transitions);
        })
        .await
    }

    pub async fn set_state_transitions(&self, patch: StateTransitionsPatch) -> Result<bool> {
        self.mutate("set_state_transitions", self.inner.token(), move |doc| {
            doc.header.patch_state_transitions(patch);
        })
        .await
    }

    /// Set or clear `right_now.active_task_id`
    pub async fn set_active_task(&self, task_id: Option<&str>) -> Result<bool> {
        let task_id = task_id.map(str::to_string);
        self.mutate("set_active_task", self.inner.token(), move |doc| {
            doc.header.set_active_task_id(task_id.as_deref());
        })
        .await
    }

    /// Move the section whose heading is block `index`; out-of-range and
    /// boundary moves are no-ops.
    pub async fn move_section(&self, index: usize, direction: Direction) -> Result<bool> {
        self.mutate("move_section", self.inner.token(), move |doc| {
            if let Some(moved) = reorder::move_section(doc, index, direction) {
                *doc = moved;
            }
        })
        .await
    }

    /// Give every task without an identifier a fresh one.
    /// Returns how many were added.
    pub async fn assign_missing_task_ids(&self) -> Result<usize> {
        let mut added = 0;
        self.mutate("assign_missing_task_ids", self.inner.token(), |doc| {
            added = task_id::assign_missing_ids(doc);
        })
        .await?;
        Ok(added)
    }

    /// Append an open task with a fresh identifier to the end of the
    /// document. Returns the identifier, or `None` when nothing was written.
    pub async fn add_task(&self, name: &str) -> Result<Option<String>> {
        let mut created = None;
        let written = self
            .mutate("add_task", self.inner.token(), |doc| {
                let mut task = Task::new(name);
                let mut existing = doc.task_ids();
                task_id::ensure(&mut task, &mut existing);
                created = task.task_id.clone();
                doc.push_task(task);
            })
            .await?;
        Ok(created.filter(|_| written))
    }

    /// Flip the checkbox of the task with `task_id`
    pub async fn toggle_task(&self, task_id: &str) -> Result<bool> {
        self.mutate("toggle_task", self.inner.token(), |doc| {
            match doc.find_task_mut(task_id) {
                Some(task) => task.toggle(),
                None => tracing::debug!(task_id, "No such task"),
            }
        })
        .await
    }

    /// Set or clear the session badge of the task with `task_id`
    pub async fn set_task_session(
        &self,
        task_id: &str,
        session: Option<SessionStatus>,
    ) -> Result<bool> {
        self.mutate("set_task_session", self.inner.token(), |doc| {
            if let Some(task) = doc.find_task_mut(task_id) {
                task.session_status = session;
            }
        })
        .await
    }
}
