//! Small filesystem helpers shared by the on-disk stores.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace `path` with `contents` in one rename.
///
/// The data is written to a temporary file in the same directory and then
/// persisted over the target, so readers see either the old or the new file.
pub async fn write_atomic(path: &Path, contents: Vec<u8>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents))
        .await
        .map_err(std::io::Error::other)?
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir)?;

    let mut file = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(&dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Point the symlink `link` at `target`, replacing any existing link atomically.
#[cfg(unix)]
pub async fn replace_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let dir = parent_dir(link);
    let staging = dir.join(format!(".latest-{}", uuid::Uuid::new_v4()));

    tokio::fs::symlink(target, &staging).await?;
    if let Err(e) = tokio::fs::rename(&staging, link).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }
    Ok(())
}
