//! Project registry and on-disk directory layout.
//!
//! The registry (`<data_dir>/config.yaml`) maps each tracked project's
//! canonical path to the directory name holding its state. Directory
//! management allocates `<data_dir>/<dir_name>/` and tags it with a
//! `.project-path` marker.

pub mod dirs;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    dirs::{DirectoryManager, FsDirectoryManager, MARKER_FILENAME},
    error::{Error, Result},
    loader::{ConfigLoader, DATA_DIR_ENV, REGISTRY_FILENAME, YamlConfigLoader, data_dir},
    schema::{Config, PROJECT_CONFIG_FILENAME, ProjectConfig, ProjectEntry, STORAGE_VERSION},
};
