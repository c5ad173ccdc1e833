use std::path::Path;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    tokio_util::sync::CancellationToken,
};

use crate::{
    Result,
    types::{Project, ProjectState},
};

/// Persistence contract for tracked projects.
///
/// Every operation checks `token` before touching storage and returns
/// [`crate::Error::Cancelled`] if it already fired. List operations never
/// return `None`-like values: no matches is an empty `Vec`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert or replace a project, keyed by id or path.
    async fn save(&self, token: &CancellationToken, project: &mut Project) -> Result<()>;
    async fn find_by_id(&self, token: &CancellationToken, id: &str) -> Result<Project>;
    async fn find_by_path(&self, token: &CancellationToken, path: &Path) -> Result<Project>;
    async fn find_all(&self, token: &CancellationToken) -> Result<Vec<Project>>;
    async fn find_active(&self, token: &CancellationToken) -> Result<Vec<Project>>;
    async fn find_hibernated(&self, token: &CancellationToken) -> Result<Vec<Project>>;
    async fn delete(&self, token: &CancellationToken, id: &str) -> Result<()>;
    /// Change the lifecycle state. Leaves `last_activity_at` untouched.
    async fn update_state(
        &self,
        token: &CancellationToken,
        id: &str,
        state: ProjectState,
    ) -> Result<()>;
    async fn update_last_activity(
        &self,
        token: &CancellationToken,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
