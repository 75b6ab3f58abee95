use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "index.json";
pub const LOCK_FILE: &str = "build.lock";

/// Well-known artifact locations under one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub data_dir: PathBuf,
    pub manifest: PathBuf,
    pub index: PathBuf,
    pub lock: PathBuf,
}

impl ArtifactPaths {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            manifest: data_dir.join(MANIFEST_FILE),
            index: data_dir.join(INDEX_FILE),
            lock: data_dir.join(LOCK_FILE),
            data_dir,
        }
    }
}
