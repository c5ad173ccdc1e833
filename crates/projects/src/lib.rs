//! Persistence core for the project dashboard.
//!
//! Every tracked project owns a SQLite database under its own directory.
//! [`ProjectRepository`] manages one of those databases; the
//! [`RepositoryCoordinator`] presents all of them as a single [`Repository`],
//! routing through the registry kept by `projdash-config`.

pub mod codec;
pub mod coordinator;
pub mod error;
pub mod in_memory;
pub mod repository;
pub mod schema;
pub mod store;
pub mod types;

pub use {
    coordinator::RepositoryCoordinator,
    error::{Error, Result},
    in_memory::{InMemoryConfigLoader, TempDirectoryManager},
    repository::Repository,
    schema::{MIGRATIONS, Migration, Migrator},
    store::{DB_FILENAME, ProjectRepository},
    types::{Confidence, Project, ProjectState, Stage, project_id},
};
