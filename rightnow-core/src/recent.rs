//! Recently opened documents
//!
//! A small JSON list kept newest first, used by front-ends to offer quick
//! re-opening. Failing to record a document never fails the load that
//! triggered it.

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Entries kept in the list
pub const MAX_RECENT: usize = 10;

/// Somewhere to record that a document was opened
pub trait RecentProjects: Send + Sync {
    fn add_recent(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub path: PathBuf,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecentFile {
    #[serde(default)]
    projects: Vec<RecentEntry>,
}

/// [`RecentProjects`] stored as JSON on disk
#[derive(Debug, Clone)]
pub struct RecentProjectsFile {
    path: PathBuf,
}

impl RecentProjectsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`Config::recent_projects_path`]
    pub fn default_location() -> Self {
        Self::new(Config::recent_projects_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded entries, newest first. A missing file is an empty list.
    pub fn list(&self) -> Result<Vec<RecentEntry>> {
        Ok(self.read()?.projects)
    }

    fn read(&self) -> Result<RecentFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecentFile::default()),
            Err(source) => Err(Error::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, file: &RecentFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, json).map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl RecentProjects for RecentProjectsFile {
    fn add_recent(&self, path: &Path) -> Result<()> {
        let mut file = self.read()?;
        file.projects.retain(|entry| entry.path != path);
        file.projects.insert(
            0,
            RecentEntry {
                path: path.to_path_buf(),
                opened_at: Utc::now(),
            },
        );
        file.projects.truncate(MAX_RECENT);
        self.write(&file)
    }
}
