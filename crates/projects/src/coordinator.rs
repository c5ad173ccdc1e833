//! Aggregating repository over many per-project databases.
//!
//! The registry maps each project path to a directory under the base path;
//! every directory holds one [`ProjectRepository`]. Handles are opened lazily
//! and cached by directory name. A second map remembers which directory owns
//! an id so activity updates can skip the full scan. Both maps are hints
//! rebuilt on demand: [`RepositoryCoordinator::close`] may clear them at any
//! time.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    projdash_config::{
        Config, ConfigLoader, DirectoryManager, FsDirectoryManager, ProjectConfig,
        YamlConfigLoader,
    },
    tokio::sync::{Mutex, RwLock},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    repository::Repository,
    store::{self, ProjectRepository, ensure_live},
    types::{Project, ProjectState},
};

#[derive(Default)]
struct Cache {
    /// Directory name to opened repository.
    repos: HashMap<String, Arc<ProjectRepository>>,
    /// Project id to owning directory name.
    id_to_dir: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
enum ListQuery {
    All,
    Active,
    Hibernated,
}

impl ListQuery {
    fn name(self) -> &'static str {
        match self {
            Self::All => "find_all",
            Self::Active => "find_active",
            Self::Hibernated => "find_hibernated",
        }
    }
}

/// The application-facing [`Repository`], routing each call to the
/// per-project database that owns the entity.
pub struct RepositoryCoordinator {
    config: Arc<dyn ConfigLoader>,
    dirs: Arc<dyn DirectoryManager>,
    base_path: PathBuf,
    cache: RwLock<Cache>,
    /// Serialises read-modify-write cycles on the registry.
    registry_lock: Mutex<()>,
}

impl RepositoryCoordinator {
    pub fn new(
        config: Arc<dyn ConfigLoader>,
        dirs: Arc<dyn DirectoryManager>,
        base_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            dirs,
            base_path: base_path.into(),
            cache: RwLock::new(Cache::default()),
            registry_lock: Mutex::new(()),
        }
    }

    /// Coordinator over `<data_dir>/config.yaml` and directories under
    /// `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self::new(
            Arc::new(YamlConfigLoader::in_dir(&data_dir)),
            Arc::new(FsDirectoryManager::new(data_dir.clone())),
            data_dir,
        )
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of repositories currently held open in the cache.
    pub async fn cached_repo_count(&self) -> usize {
        self.cache.read().await.repos.len()
    }

    /// Number of id → directory hints currently cached.
    pub async fn hot_index_len(&self) -> usize {
        self.cache.read().await.id_to_dir.len()
    }

    /// Whether the repository for `dir_name` is currently cached.
    pub async fn is_cached(&self, dir_name: &str) -> bool {
        self.cache.read().await.repos.contains_key(dir_name)
    }

    /// Drop every cached handle and hint. The coordinator stays usable;
    /// later calls reopen what they need.
    pub async fn close(&self, token: &CancellationToken) -> Result<()> {
        ensure_live(token)?;
        let mut cache = self.cache.write().await;
        *cache = Cache::default();
        debug!("repository cache cleared");
        Ok(())
    }

    /// Repository for `dir_name`, opening and caching it on first use.
    ///
    /// A failed open is not cached; the next call retries.
    pub async fn repository(
        &self,
        token: &CancellationToken,
        dir_name: &str,
    ) -> Result<Arc<ProjectRepository>> {
        ensure_live(token)?;
        if let Some(repo) = self.cache.read().await.repos.get(dir_name) {
            return Ok(Arc::clone(repo));
        }

        let mut cache = self.cache.write().await;
        if let Some(repo) = cache.repos.get(dir_name) {
            return Ok(Arc::clone(repo));
        }
        let repo = Arc::new(ProjectRepository::open(token, self.base_path.join(dir_name)).await?);
        cache.repos.insert(dir_name.to_string(), Arc::clone(&repo));
        debug!(dir = dir_name, "opened project repository");
        Ok(repo)
    }

    async fn load_config(&self, token: &CancellationToken) -> Result<Config> {
        ensure_live(token)?;
        Ok(self.config.load(token).await?)
    }

    /// Every repository the registry lists, skipping the ones that fail to
    /// open.
    async fn open_all(
        &self,
        token: &CancellationToken,
        config: &Config,
    ) -> Result<Vec<(String, Arc<ProjectRepository>)>> {
        let mut repos = Vec::with_capacity(config.len());
        for dir in config.projects() {
            ensure_live(token)?;
            match self.repository(token, dir).await {
                Ok(repo) => repos.push((dir.to_string(), repo)),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(dir, error = %e, "skipping project database"),
            }
        }
        Ok(repos)
    }

    async fn list_all_repos(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<(String, Arc<ProjectRepository>)>> {
        let config = self.load_config(token).await?;
        self.open_all(token, &config).await
    }

    async fn collect(&self, token: &CancellationToken, query: ListQuery) -> Result<Vec<Project>> {
        let repos = self.list_all_repos(token).await?;
        let mut projects = Vec::new();
        let mut owners = Vec::new();
        for (dir, repo) in repos {
            ensure_live(token)?;
            let found = match query {
                ListQuery::All => repo.find_all(token).await,
                ListQuery::Active => repo.find_active(token).await,
                ListQuery::Hibernated => repo.find_hibernated(token).await,
            };
            match found {
                Ok(found) => {
                    if matches!(query, ListQuery::All) {
                        owners.extend(found.iter().map(|p| (p.id.clone(), dir.clone())));
                    }
                    projects.extend(found);
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(
                    dir = %dir,
                    query = query.name(),
                    error = %e,
                    "skipping project database"
                ),
            }
        }

        if !owners.is_empty() {
            self.cache.write().await.id_to_dir.extend(owners);
        }
        Ok(projects)
    }

    async fn remember(&self, id: &str, dir_name: &str) {
        self.cache
            .write()
            .await
            .id_to_dir
            .insert(id.to_string(), dir_name.to_string());
    }

    async fn forget(&self, id: &str) {
        self.cache.write().await.id_to_dir.remove(id);
    }

    /// Allocate a directory for a project the registry has never seen and
    /// register it. Returns the directory name, which may belong to a
    /// concurrent caller that registered the same path first.
    async fn register(&self, token: &CancellationToken, project: &Project) -> Result<String> {
        let _guard = self.registry_lock.lock().await;
        let mut config = self.load_config(token).await?;
        if let Some(dir) = config.directory_name(&project.path) {
            return Ok(dir.to_string());
        }

        let full_path = self
            .dirs
            .ensure_project_dir(token, &project.path)
            .await
            .map_err(|e| Error::directory(&project.path, e))?;
        let dir_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::path_not_accessible(&full_path))?;

        if let Err(e) = ProjectConfig::ensure(&full_path, &project.path) {
            warn!(dir = %full_path.display(), error = %e, "failed to write project sidecar");
        }

        config.set_project_entry(
            &dir_name,
            &project.path,
            &project.display_name,
            project.is_favorite,
        );
        self.config.save(token, &config).await?;
        debug!(dir = %dir_name, project = %project.path.display(), "registered new project");
        Ok(dir_name)
    }

    /// Drop `dir_name` from the registry, re-reading it under the lock so
    /// concurrent registrations survive.
    async fn unregister(&self, token: &CancellationToken, dir_name: &str) -> Result<()> {
        let _guard = self.registry_lock.lock().await;
        let mut config = self.load_config(token).await?;
        if config.remove_project(dir_name).is_some() {
            self.config.save(token, &config).await?;
        }
        Ok(())
    }

    /// Directory owning `id`: authoritative scan, then registry lookup.
    async fn resolve_dir(&self, token: &CancellationToken, id: &str) -> Result<String> {
        let project = self.find_by_id(token, id).await?;
        let config = self.load_config(token).await?;
        config
            .directory_name(&project.path)
            .map(str::to_string)
            .ok_or_else(|| Error::Consistency {
                id: id.to_string(),
                path: project.path.clone(),
            })
    }

    /// Try the hot index for `id`. `Ok(true)` means the update landed.
    async fn update_activity_via_hint(
        &self,
        token: &CancellationToken,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(dir) = self.cache.read().await.id_to_dir.get(id).cloned() else {
            debug!(id, "hot index miss");
            return Ok(false);
        };
        let outcome = match self.repository(token, &dir).await {
            Ok(repo) => repo.update_last_activity(token, id, at).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                debug!(id, dir = %dir, error = %e, "stale hot index entry");
                Ok(false)
            },
        }
    }
}

#[async_trait]
impl Repository for RepositoryCoordinator {
    async fn save(&self, token: &CancellationToken, project: &mut Project) -> Result<()> {
        ensure_live(token)?;
        store::validate(project)?;
        let config = self.load_config(token).await?;
        let dir_name = match config.directory_name(&project.path) {
            Some(dir) => dir.to_string(),
            None => self.register(token, project).await?,
        };

        let repo = self.repository(token, &dir_name).await?;
        repo.save(token, project).await?;
        self.remember(&project.id, &dir_name).await;
        Ok(())
    }

    async fn find_by_id(&self, token: &CancellationToken, id: &str) -> Result<Project> {
        for (dir, repo) in self.list_all_repos(token).await? {
            ensure_live(token)?;
            match repo.find_by_id(token, id).await {
                Ok(project) => {
                    self.remember(id, &dir).await;
                    return Ok(project);
                },
                Err(e) if e.is_not_found() => {},
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(dir = %dir, id, error = %e, "find_by_id failed, continuing scan"),
            }
        }
        Err(Error::not_found(id))
    }

    async fn find_by_path(&self, token: &CancellationToken, path: &Path) -> Result<Project> {
        let config = self.load_config(token).await?;

        let routed = config.directory_name(path);
        if let Some(dir) = routed {
            let found = match self.repository(token, dir).await {
                Ok(repo) => repo.find_by_path(token, path).await,
                Err(e) => Err(e),
            };
            match found {
                Ok(project) => return Ok(project),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_not_found() => debug!(
                    dir,
                    path = %path.display(),
                    "registry entry is stale, scanning all projects"
                ),
                Err(e) => warn!(
                    dir,
                    path = %path.display(),
                    error = %e,
                    "registry lookup failed, scanning all projects"
                ),
            }
        }

        for (dir, repo) in self.open_all(token, &config).await? {
            ensure_live(token)?;
            if routed == Some(dir.as_str()) {
                continue;
            }
            match repo.find_by_path(token, path).await {
                Ok(project) => return Ok(project),
                Err(e) if e.is_not_found() => {},
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(
                    dir = %dir,
                    path = %path.display(),
                    error = %e,
                    "find_by_path failed, continuing scan"
                ),
            }
        }
        Err(Error::not_found(path.to_string_lossy()))
    }

    async fn find_all(&self, token: &CancellationToken) -> Result<Vec<Project>> {
        self.collect(token, ListQuery::All).await
    }

    async fn find_active(&self, token: &CancellationToken) -> Result<Vec<Project>> {
        self.collect(token, ListQuery::Active).await
    }

    async fn find_hibernated(&self, token: &CancellationToken) -> Result<Vec<Project>> {
        self.collect(token, ListQuery::Hibernated).await
    }

    async fn delete(&self, token: &CancellationToken, id: &str) -> Result<()> {
        let project = self.find_by_id(token, id).await?;
        let config = self.load_config(token).await?;
        let dir_name = config
            .directory_name(&project.path)
            .map(str::to_string)
            .ok_or_else(|| Error::Consistency {
                id: id.to_string(),
                path: project.path.clone(),
            })?;

        let repo = self.repository(token, &dir_name).await?;
        repo.delete(token, id).await?;

        if let Err(e) = self.unregister(token, &dir_name).await {
            warn!(dir = %dir_name, id, error = %e, "project deleted but registry not updated");
        }

        let mut cache = self.cache.write().await;
        cache.repos.remove(&dir_name);
        cache.id_to_dir.remove(id);
        debug!(dir = %dir_name, id, "deleted project");
        Ok(())
    }

    async fn update_state(
        &self,
        token: &CancellationToken,
        id: &str,
        state: ProjectState,
    ) -> Result<()> {
        let dir_name = self.resolve_dir(token, id).await?;
        let repo = self.repository(token, &dir_name).await?;
        repo.update_state(token, id, state).await
    }

    async fn update_last_activity(
        &self,
        token: &CancellationToken,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        ensure_live(token)?;
        if self.update_activity_via_hint(token, id, at).await? {
            return Ok(());
        }

        let dir_name = match self.resolve_dir(token, id).await {
            Ok(dir) => dir,
            Err(e) => {
                if e.is_not_found() {
                    self.forget(id).await;
                }
                return Err(e);
            },
        };
        self.remember(id, &dir_name).await;
        let repo = self.repository(token, &dir_name).await?;
        repo.update_last_activity(token, id, at).await
    }
}
