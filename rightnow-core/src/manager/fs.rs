//! File access for the manager

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Resolve `path` against the working directory without touching the disk
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Sibling temp file: `.<basename>.<timestamp-ms>.<random>.tmp`
pub fn temp_path_for(target: &Path, now_ms: i64) -> Result<PathBuf> {
    let name = target.file_name().ok_or_else(|| Error::Write {
        path: target.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
    })?;
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let temp_name = format!(
        ".{}.{}.{}.tmp",
        name.to_string_lossy(),
        now_ms,
        &salt[..8]
    );
    Ok(target.with_file_name(temp_name))
}

/// Replace `target` with `contents` so readers see either the old or the
/// new file, never a partial one.
pub async fn write_atomic(target: &Path, contents: &str, now_ms: i64) -> Result<()> {
    let temp = temp_path_for(target, now_ms)?;
    let result = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, target).await
    }
    .await;

    if let Err(source) = result {
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(temp = %temp.display(), error = %e, "failed to remove temp file");
            }
        }
        return Err(Error::Write {
            path: target.to_path_buf(),
            source,
        });
    }
    Ok(())
}
