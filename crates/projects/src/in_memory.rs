//! In-memory registry and directory manager for tests.
//!
//! Both doubles count the calls that reach them, so tests can assert that an
//! operation did (or did not) touch the registry or the filesystem.
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    projdash_config::{Config, ConfigLoader, DirectoryManager, dirs::sanitize_dir_name},
    tokio_util::sync::CancellationToken,
};

/// [`ConfigLoader`] holding the registry in a `Mutex`. No persistence.
pub struct InMemoryConfigLoader {
    config: Mutex<Config>,
    load_calls: AtomicUsize,
    save_calls: AtomicUsize,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
}

impl InMemoryConfigLoader {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            load_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            fail_load: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
        }
    }

    /// Registry pre-populated with `(dir_name, project_path)` pairs.
    pub fn with_projects<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut config = Config::default();
        for (dir, path) in entries {
            config.set_project_entry(dir, Path::new(path), "", false);
        }
        Self::with_config(config)
    }

    /// Edit the registry directly, bypassing the counters.
    pub fn update(&self, f: impl FnOnce(&mut Config)) {
        let mut config = self.config.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut config);
    }

    pub fn snapshot(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigLoader for InMemoryConfigLoader {
    async fn load(&self, token: &CancellationToken) -> projdash_config::Result<Config> {
        if token.is_cancelled() {
            return Err(projdash_config::Error::Cancelled);
        }
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(projdash_config::Error::message("injected load failure"));
        }
        Ok(self.snapshot())
    }

    async fn save(&self, token: &CancellationToken, config: &Config) -> projdash_config::Result<()> {
        if token.is_cancelled() {
            return Err(projdash_config::Error::Cancelled);
        }
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(projdash_config::Error::message("injected save failure"));
        }
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();
        Ok(())
    }
}

/// [`DirectoryManager`] creating `<base>/<basename>` without markers or
/// collision handling.
pub struct TempDirectoryManager {
    base: PathBuf,
    dirs: Mutex<HashMap<PathBuf, String>>,
    ensure_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl TempDirectoryManager {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            dirs: Mutex::new(HashMap::new()),
            ensure_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryManager for TempDirectoryManager {
    async fn ensure_project_dir(
        &self,
        token: &CancellationToken,
        path: &Path,
    ) -> projdash_config::Result<PathBuf> {
        if token.is_cancelled() {
            return Err(projdash_config::Error::Cancelled);
        }
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        let name = sanitize_dir_name(path);
        let dir = self.base.join(&name);
        fs::create_dir_all(&dir)?;
        self.dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), name);
        Ok(dir)
    }

    async fn delete_project_dir(
        &self,
        token: &CancellationToken,
        path: &Path,
    ) -> projdash_config::Result<()> {
        if token.is_cancelled() {
            return Err(projdash_config::Error::Cancelled);
        }
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
        if let Some(name) = removed {
            let dir = self.base.join(name);
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn project_dir_name(&self, path: &Path) -> Option<String> {
        self.dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}
