use crate::error::{MemoryError, Result};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use symkg_store::project_data_dir;

/// Advisory exclusive lock serializing memory-directory writes across
/// processes. Reads stay lock-free (writes are atomic renames).
pub(crate) struct MemoryLock {
    #[allow(dead_code)]
    file: std::fs::File,
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path_for_root(root: &Path) -> PathBuf {
    project_data_dir(root).join("memory.lock")
}

pub(crate) async fn acquire_memory_lock(root: &Path) -> Result<MemoryLock> {
    let path = lock_path_for_root(root);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let lock = tokio::task::spawn_blocking(move || -> Result<MemoryLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                MemoryError::Lock(format!("open memory lock {}: {err}", path.display()))
            })?;

        file.lock_exclusive().map_err(|err| {
            MemoryError::Lock(format!("acquire memory lock {}: {err}", path.display()))
        })?;

        Ok(MemoryLock { file })
    })
    .await
    .map_err(|err| MemoryError::Lock(format!("join memory lock task: {err}")))??;

    Ok(lock)
}
