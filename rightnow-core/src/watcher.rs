//! Change watching for the loaded document
//!
//! Editors often save through a temp file and a rename, which replaces the
//! inode a file-level watch would be attached to. [`NotifyWatcher`] therefore
//! watches the document's parent directory and filters events down to the
//! document's own file name.
//!
//! Watchers only report that *something* changed; coalescing bursts into
//! reloads is the manager's job.

use crate::error::{Error, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Called (from any thread) whenever the watched file may have changed
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// A live watch; dropping or cleaning it up stops notifications.
pub trait WatchHandle: Send {
    fn cleanup(self: Box<Self>);
}

/// Something that can report changes to a file on disk.
pub trait ChangeWatcher: Send + Sync {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<Box<dyn WatchHandle>>;
}

/// [`ChangeWatcher`] backed by the platform's native file events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcher;

struct NotifyHandle {
    watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl WatchHandle for NotifyHandle {
    fn cleanup(mut self: Box<Self>) {
        if let Err(e) = self.watcher.unwatch(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "unwatch failed");
        }
    }
}

/// Directory to watch for `path`; a bare file name lives in `.`
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Create, modify, or remove of a file named `file_name`
fn is_relevant(event: &Event, file_name: &OsStr) -> bool {
    let meaningful = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    meaningful
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name))
}

impl ChangeWatcher for NotifyWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<Box<dyn WatchHandle>> {
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| Error::Watch(format!("not a file path: {}", path.display())))?
            .to_os_string();
        let dir = parent_dir(path);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, &file_name) => on_change(),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "file watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::debug!(dir = %dir.display(), "watching document directory");
        Ok(Box::new(NotifyHandle { watcher, dir }))
    }
}
