//! # rightnow-core
//!
//! Core library for rightnow - a to-do list and focus timer that lives in a
//! single Markdown file.
//!
//! This library provides:
//! - Domain types for documents, tasks, and timer state
//! - A lossless parser/serializer for the document format
//! - Task identifier generation and section reordering
//! - A document manager that serializes every change against the file
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Text:** The document on disk, which may be edited by hand at any time
//! - **Document:** Parsed blocks plus the YAML header; serializing an
//!   unmodified document reproduces the text byte for byte
//! - **Snapshot:** What the manager publishes to subscribers after every load,
//!   reload, or save
//!
//! ## Example
//!
//! ```rust,no_run
//! use rightnow_core::{DocumentManager, ManagerOptions, WorkState};
//!
//! # async fn run() -> rightnow_core::Result<()> {
//! let manager = DocumentManager::new(ManagerOptions::default());
//! manager.load("todo.md").await?;
//! manager.set_work_state(WorkState::Working).await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use document::{parse, serialize};
pub use error::{Error, Result};
pub use manager::{DocumentManager, LoadedDocumentState, ManagerOptions, Phase, Snapshot, Subscription};
pub use recent::{RecentProjects, RecentProjectsFile};
pub use reorder::Direction;
pub use types::*;
pub use watcher::{ChangeWatcher, NotifyWatcher, WatchHandle};

// Public modules
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod manager;
pub mod recent;
pub mod reorder;
pub mod task_id;
pub mod types;
pub mod watcher;
