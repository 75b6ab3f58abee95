use crate::{KnowledgeError, Result};
use fs2::FileExt;
use std::path::Path;
use std::time::Instant;

/// Exclusive advisory lock over one data directory, released on drop.
///
/// Held for the whole fetch/chunk/embed/persist pipeline so concurrent builders
/// (in this process or another) never interleave manifest or index writes.
pub struct BuildLock {
    file: std::fs::File,
    wait_ms: u64,
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl BuildLock {
    pub async fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Self> {
            use std::fs::OpenOptions;

            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|err| {
                    KnowledgeError::Lock(format!("open build lock {}: {err}", path.display()))
                })?;

            let start = Instant::now();
            file.lock_exclusive().map_err(|err| {
                KnowledgeError::Lock(format!("acquire build lock {}: {err}", path.display()))
            })?;
            let waited = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            if waited > 0 {
                log::debug!("Waited {waited} ms for build lock {}", path.display());
            }

            Ok(Self {
                file,
                wait_ms: waited,
            })
        })
        .await
        .map_err(|err| KnowledgeError::Lock(format!("join build lock task: {err}")))?
    }

    /// Time spent blocked on another holder before this lock was granted
    #[must_use]
    pub const fn wait_ms(&self) -> u64 {
        self.wait_ms
    }
}
