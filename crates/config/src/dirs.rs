//! On-disk project directories under the data directory.
//!
//! Each tracked project owns `<base>/<dir_name>/`, tagged with a
//! `.project-path` marker naming the canonical project path. Directory names
//! derive from the project's basename; distinct projects sharing a basename
//! get `-2`, `-3`, ... suffixes.
use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{Error, Result};

/// Marker file recording which project a directory belongs to.
pub const MARKER_FILENAME: &str = ".project-path";

/// Highest suffix tried before giving up on a basename.
const MAX_SUFFIX: usize = 1000;

/// Allocates and removes per-project directories.
#[async_trait]
pub trait DirectoryManager: Send + Sync {
    /// Create (or reuse) the directory for `path` and return its full path.
    async fn ensure_project_dir(&self, token: &CancellationToken, path: &Path) -> Result<PathBuf>;
    /// Remove the directory for `path`, if one exists.
    async fn delete_project_dir(&self, token: &CancellationToken, path: &Path) -> Result<()>;
    /// Directory name currently allocated to `path`.
    fn project_dir_name(&self, path: &Path) -> Option<String>;
}

/// Filesystem-backed [`DirectoryManager`].
pub struct FsDirectoryManager {
    base: PathBuf,
}

impl FsDirectoryManager {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn candidates(path: &Path) -> impl Iterator<Item = String> {
        let stem = sanitize_dir_name(path);
        std::iter::once(stem.clone()).chain((2..=MAX_SUFFIX).map(move |n| format!("{stem}-{n}")))
    }

    fn read_marker(dir: &Path) -> Option<PathBuf> {
        fs::read_to_string(dir.join(MARKER_FILENAME))
            .ok()
            .map(|s| PathBuf::from(s.trim_end()))
    }

    fn find_existing(&self, path: &Path) -> Option<String> {
        for name in Self::candidates(path) {
            let dir = self.base.join(&name);
            if !dir.exists() {
                return None;
            }
            if Self::read_marker(&dir).as_deref() == Some(path) {
                return Some(name);
            }
        }
        None
    }
}

#[async_trait]
impl DirectoryManager for FsDirectoryManager {
    async fn ensure_project_dir(&self, token: &CancellationToken, path: &Path) -> Result<PathBuf> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !path.is_absolute() {
            return Err(Error::invalid_path(path));
        }
        fs::create_dir_all(&self.base)?;

        for name in Self::candidates(path) {
            let dir = self.base.join(&name);
            if dir.exists() {
                match Self::read_marker(&dir) {
                    Some(owner) if owner == path => return Ok(dir),
                    Some(_) => continue,
                    None => {
                        warn!(dir = %dir.display(), "project directory without marker, skipping");
                        continue;
                    },
                }
            }
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(MARKER_FILENAME), path.to_string_lossy().as_bytes())?;
            debug!(dir = %dir.display(), project = %path.display(), "created project directory");
            return Ok(dir);
        }

        Err(Error::message(format!(
            "no free directory name for {} under {}",
            path.display(),
            self.base.display()
        )))
    }

    async fn delete_project_dir(&self, token: &CancellationToken, path: &Path) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(name) = self.find_existing(path) {
            let dir = self.base.join(name);
            fs::remove_dir_all(&dir)?;
            debug!(dir = %dir.display(), "removed project directory");
        }
        Ok(())
    }

    fn project_dir_name(&self, path: &Path) -> Option<String> {
        self.find_existing(path)
    }
}

/// Filesystem-safe directory name derived from the last path segment.
pub fn sanitize_dir_name(path: &Path) -> String {
    let raw = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "project".to_string()
    } else {
        cleaned
    }
}
