//! Registry schema: the mapping from canonical project path to the opaque
//! directory name that holds the project's state, plus display metadata.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::Result;

/// Current on-disk registry layout version.
pub const STORAGE_VERSION: u32 = 2;

/// File name of the per-project sidecar written inside each project directory.
pub const PROJECT_CONFIG_FILENAME: &str = "config.yaml";

/// One tracked project in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

/// Root registry document, keyed by directory name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_version: u32,
    pub projects: BTreeMap<String, ProjectEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_version: STORAGE_VERSION,
            projects: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Directory name registered for `path`, if any.
    pub fn directory_name(&self, path: &Path) -> Option<&str> {
        self.projects
            .iter()
            .find(|(_, entry)| entry.path == path)
            .map(|(dir, _)| dir.as_str())
    }

    /// Insert or replace the entry for `dir_name`.
    ///
    /// An empty display name is stored as absent. The original `added_at`
    /// survives replacement.
    pub fn set_project_entry(
        &mut self,
        dir_name: &str,
        path: &Path,
        display_name: &str,
        favorite: bool,
    ) {
        let display_name = (!display_name.is_empty()).then(|| display_name.to_string());
        let added_at = self
            .projects
            .get(dir_name)
            .and_then(|e| e.added_at)
            .or_else(|| Some(Utc::now()));
        self.projects.insert(dir_name.to_string(), ProjectEntry {
            path: path.to_path_buf(),
            display_name,
            favorite,
            added_at,
        });
    }

    /// Remove the entry for `dir_name`, returning it if present.
    pub fn remove_project(&mut self, dir_name: &str) -> Option<ProjectEntry> {
        self.projects.remove(dir_name)
    }

    /// Registered directory names in key order.
    pub fn projects(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    pub fn entry(&self, dir_name: &str) -> Option<&ProjectEntry> {
        self.projects.get(dir_name)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// Per-project sidecar stored next to the project's database.
///
/// Non-essential metadata: losing it never affects the database or registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl ProjectConfig {
    /// Write `<dir>/config.yaml` for `project_path` unless one already exists.
    pub fn ensure(dir: &Path, project_path: &Path) -> Result<PathBuf> {
        let file = dir.join(PROJECT_CONFIG_FILENAME);
        if file.exists() {
            return Ok(file);
        }
        let sidecar = Self {
            path: project_path.to_path_buf(),
            created_at: Utc::now(),
        };
        fs::write(&file, serde_yaml::to_string(&sidecar)?)?;
        debug!(path = %file.display(), "wrote project sidecar");
        Ok(file)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let data = fs::read_to_string(dir.join(PROJECT_CONFIG_FILENAME))?;
        Ok(serde_yaml::from_str(&data)?)
    }
}
