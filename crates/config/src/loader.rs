use std::{
    fs,
    path::{Path, PathBuf},
};

use {async_trait::async_trait, tokio_util::sync::CancellationToken, tracing::debug};

use crate::{Error, Result, schema::Config};

/// File name of the registry inside the data directory.
pub const REGISTRY_FILENAME: &str = "config.yaml";

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "PROJDASH_DATA_DIR";

/// Read/write access to the project registry.
///
/// Any backend works as long as it round-trips [`Config`].
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load(&self, token: &CancellationToken) -> Result<Config>;
    async fn save(&self, token: &CancellationToken, config: &Config) -> Result<()>;
}

/// Registry stored as a YAML file.
pub struct YamlConfigLoader {
    path: PathBuf,
}

impl YamlConfigLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Registry at `<data_dir>/config.yaml`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(REGISTRY_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Config> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no registry file, using empty registry");
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&self.path)
            .map_err(|e| Error::file(format!("failed to read {}", self.path.display()), e))?;
        if data.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    fn write_file(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_yaml::to_string(config)?;
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, data)
            .map_err(|e| Error::file(format!("failed to write {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::file(format!("failed to replace {}", self.path.display()), e))?;
        debug!(path = %self.path.display(), projects = config.len(), "saved registry");
        Ok(())
    }
}

#[async_trait]
impl ConfigLoader for YamlConfigLoader {
    async fn load(&self, token: &CancellationToken) -> Result<Config> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.read_file()
    }

    async fn save(&self, token: &CancellationToken, config: &Config) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.write_file(config)
    }
}

/// Resolve the data directory.
///
/// `PROJDASH_DATA_DIR` wins when set and non-empty; otherwise the platform
/// data directory (e.g. `~/.local/share/projdash`).
pub fn data_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("", "", "projdash").map(|d| d.data_dir().to_path_buf())
}
