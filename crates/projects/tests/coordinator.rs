//! End-to-end tests for the repository coordinator.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    chrono::Utc,
    projdash_config::{ConfigLoader, DirectoryManager},
    projdash_projects::{
        InMemoryConfigLoader, Project, ProjectRepository, ProjectState, Repository,
        RepositoryCoordinator, TempDirectoryManager, project_id,
    },
    rstest::rstest,
    tokio_util::sync::CancellationToken,
};

// ── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
    base: tempfile::TempDir,
    config: Arc<InMemoryConfigLoader>,
    dirs: Arc<TempDirectoryManager>,
    coordinator: RepositoryCoordinator,
}

impl Harness {
    fn new(config: InMemoryConfigLoader) -> Self {
        let base = tempfile::tempdir().unwrap();
        let config = Arc::new(config);
        let dirs = Arc::new(TempDirectoryManager::new(base.path().to_path_buf()));
        let coordinator = RepositoryCoordinator::new(
            Arc::clone(&config) as Arc<dyn ConfigLoader>,
            Arc::clone(&dirs) as Arc<dyn DirectoryManager>,
            base.path(),
        );
        Self {
            base,
            config,
            dirs,
            coordinator,
        }
    }

    fn empty() -> Self {
        Self::new(InMemoryConfigLoader::new())
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.base.path().join(name)
    }

    /// Create `<base>/<dir>` holding one saved project, and register it.
    async fn populate(&self, dir: &str, path: &str) -> Project {
        let token = CancellationToken::new();
        std::fs::create_dir_all(self.dir(dir)).unwrap();
        let repo = ProjectRepository::open(&token, self.dir(dir)).await.unwrap();
        let mut project = Project::new(path);
        repo.save(&token, &mut project).await.unwrap();
        self.config
            .update(|cfg| cfg.set_project_entry(dir, Path::new(path), "", false));
        project
    }
}

fn live() -> CancellationToken {
    CancellationToken::new()
}

fn cancelled() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}

// ── Seed scenarios ──────────────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_three_projects() {
    let h = Harness::empty();
    for n in 1..=3 {
        h.populate(&format!("proj-{n}"), &format!("/integration/project{n}"))
            .await;
    }

    let all = h.coordinator.find_all(&live()).await.unwrap();
    assert_eq!(all.len(), 3);

    h.coordinator.close(&live()).await.unwrap();
    assert_eq!(h.coordinator.cached_repo_count().await, 0);
    assert_eq!(h.coordinator.hot_index_len().await, 0);

    let again = h.coordinator.find_all(&live()).await.unwrap();
    assert_eq!(again.len(), 3);
}

#[tokio::test]
async fn save_find_delete_cycle() {
    let h = Harness::new(InMemoryConfigLoader::with_projects([(
        "cycle-proj",
        "/integration/cycle",
    )]));
    std::fs::create_dir_all(h.dir("cycle-proj")).unwrap();
    let token = live();

    let mut project = Project::new("/integration/cycle");
    project.notes = "round trip".into();
    h.coordinator.save(&token, &mut project).await.unwrap();
    assert_eq!(h.dirs.ensure_calls(), 0);

    let found = h.coordinator.find_by_id(&token, &project.id).await.unwrap();
    assert_eq!(found.id, project.id);
    assert_eq!(found.path, project.path);
    assert_eq!(found.notes, "round trip");
    assert!(found.updated_at >= found.created_at);

    h.coordinator.delete(&token, &project.id).await.unwrap();
    let err = h.coordinator.find_by_id(&token, &project.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(h.config.snapshot().is_empty());

    let repo = ProjectRepository::open(&token, h.dir("cycle-proj"))
        .await
        .unwrap();
    assert!(repo.find_all(&token).await.unwrap().is_empty());
}

#[tokio::test]
async fn graceful_degradation_skips_missing_directory() {
    let h = Harness::empty();
    let valid = h.populate("valid-proj", "/integration/valid").await;
    h.config.update(|cfg| {
        cfg.set_project_entry("invalid-proj", Path::new("/integration/invalid"), "", false);
    });

    let all = h.coordinator.find_all(&live()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, valid.id);
    assert_eq!(h.coordinator.cached_repo_count().await, 1);
}

#[tokio::test]
async fn lazy_loading_twenty_projects() {
    let h = Harness::empty();
    let mut projects = Vec::new();
    for n in 0..20 {
        projects.push(
            h.populate(&format!("lazy-{n:02}"), &format!("/integration/lazy{n}"))
                .await,
        );
    }
    assert_eq!(h.coordinator.cached_repo_count().await, 0);

    let target = &projects[7];
    let found = h.coordinator.find_by_id(&live(), &target.id).await.unwrap();
    assert_eq!(found.id, target.id);
    assert!(h.coordinator.cached_repo_count().await >= 1);
    assert!(h.coordinator.is_cached("lazy-07").await);

    h.coordinator.close(&live()).await.unwrap();
    assert_eq!(h.coordinator.cached_repo_count().await, 0);

    let all = h.coordinator.find_all(&live()).await.unwrap();
    assert_eq!(all.len(), 20);
    assert_eq!(h.coordinator.cached_repo_count().await, 20);
}

#[tokio::test]
async fn new_project_save_registers_once() {
    let h = Harness::empty();
    let token = live();

    let mut project = Project::new("/integration/brand-new");
    assert_eq!(project.id, project_id(Path::new("/integration/brand-new")));
    h.coordinator.save(&token, &mut project).await.unwrap();

    assert_eq!(h.dirs.ensure_calls(), 1);
    assert_eq!(h.config.save_calls(), 1);
    assert_eq!(
        h.config
            .snapshot()
            .directory_name(Path::new("/integration/brand-new")),
        Some("brand-new")
    );

    let found = h.coordinator.find_by_id(&token, &project.id).await.unwrap();
    assert_eq!(found.id, project.id);
    assert_eq!(found.path, project.path);

    // Saving again goes straight to the registered directory.
    h.coordinator.save(&token, &mut project).await.unwrap();
    assert_eq!(h.dirs.ensure_calls(), 1);
    assert_eq!(h.config.save_calls(), 1);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    FindAll,
    FindActive,
    FindHibernated,
    FindById,
    FindByPath,
    Save,
    Delete,
    UpdateState,
    UpdateLastActivity,
    Close,
}

async fn run(
    coordinator: &RepositoryCoordinator,
    token: &CancellationToken,
    op: Op,
    existing: &Project,
) -> projdash_projects::Result<()> {
    match op {
        Op::FindAll => coordinator.find_all(token).await.map(drop),
        Op::FindActive => coordinator.find_active(token).await.map(drop),
        Op::FindHibernated => coordinator.find_hibernated(token).await.map(drop),
        Op::FindById => coordinator.find_by_id(token, &existing.id).await.map(drop),
        Op::FindByPath => coordinator
            .find_by_path(token, &existing.path)
            .await
            .map(drop),
        Op::Save => {
            let mut fresh = Project::new("/integration/cancel-new");
            coordinator.save(token, &mut fresh).await
        },
        Op::Delete => coordinator.delete(token, &existing.id).await,
        Op::UpdateState => {
            coordinator
                .update_state(token, &existing.id, ProjectState::Hibernated)
                .await
        },
        Op::UpdateLastActivity => {
            coordinator
                .update_last_activity(token, &existing.id, Utc::now())
                .await
        },
        Op::Close => coordinator.close(token).await,
    }
}

#[rstest]
#[case::find_all(Op::FindAll)]
#[case::find_active(Op::FindActive)]
#[case::find_hibernated(Op::FindHibernated)]
#[case::find_by_id(Op::FindById)]
#[case::find_by_path(Op::FindByPath)]
#[case::save(Op::Save)]
#[case::delete(Op::Delete)]
#[case::update_state(Op::UpdateState)]
#[case::update_last_activity(Op::UpdateLastActivity)]
#[case::close(Op::Close)]
#[tokio::test]
async fn cancelled_token_returns_promptly(#[case] op: Op) {
    let h = Harness::empty();
    let existing = h.populate("cancel-proj", "/integration/cancel").await;
    h.coordinator.find_all(&live()).await.unwrap();

    let loads = h.config.load_calls();
    let cached = h.coordinator.cached_repo_count().await;
    let hot = h.coordinator.hot_index_len().await;

    let err = run(&h.coordinator, &cancelled(), op, &existing)
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "{op:?} returned {err}");

    assert_eq!(h.config.load_calls(), loads);
    assert_eq!(h.config.save_calls(), 0);
    assert_eq!(h.dirs.ensure_calls(), 0);
    assert_eq!(h.coordinator.cached_repo_count().await, cached);
    assert_eq!(h.coordinator.hot_index_len().await, hot);

    let stored = h
        .coordinator
        .find_by_id(&live(), &existing.id)
        .await
        .unwrap();
    assert_eq!(stored, existing);
}

// ── Properties ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_then_reload_matches_prior_state() {
    let h = Harness::empty();
    let a = h.populate("a", "/integration/a").await;
    h.populate("b", "/integration/b").await;
    let token = live();

    h.coordinator
        .update_state(&token, &a.id, ProjectState::Hibernated)
        .await
        .unwrap();
    let mut before = h.coordinator.find_all(&token).await.unwrap();

    h.coordinator.close(&token).await.unwrap();
    let mut after = h.coordinator.find_all(&token).await.unwrap();

    before.sort_by(|x, y| x.id.cmp(&y.id));
    after.sort_by(|x, y| x.id.cmp(&y.id));
    assert_eq!(before, after);
    assert_eq!(h.coordinator.find_hibernated(&token).await.unwrap().len(), 1);

    let by_path = h
        .coordinator
        .find_by_path(&token, Path::new("/integration/a"))
        .await
        .unwrap();
    assert_eq!(by_path.id, a.id);
}

#[tokio::test]
async fn one_corrupt_database_does_not_hide_the_rest() {
    let h = Harness::empty();
    h.populate("good-1", "/integration/good1").await;
    h.populate("good-2", "/integration/good2").await;
    std::fs::create_dir_all(h.dir("broken")).unwrap();
    std::fs::write(
        h.dir("broken").join(projdash_projects::DB_FILENAME),
        b"definitely not a sqlite file, just some bytes padding it out",
    )
    .unwrap();
    h.config.update(|cfg| {
        cfg.set_project_entry("broken", Path::new("/integration/broken"), "", false);
    });

    let all = h.coordinator.find_all(&live()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(!h.coordinator.is_cached("broken").await);
}

#[tokio::test]
async fn empty_registry_lists_nothing() {
    let h = Harness::empty();
    let token = live();
    assert!(h.coordinator.find_all(&token).await.unwrap().is_empty());
    assert!(h.coordinator.find_active(&token).await.unwrap().is_empty());
    assert!(h.coordinator.find_hibernated(&token).await.unwrap().is_empty());
    assert!(
        h.coordinator
            .find_by_id(&token, "missing")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn invalid_project_is_rejected_before_io() {
    let h = Harness::empty();
    let mut project = Project::new("relative/path");

    let err = h.coordinator.save(&live(), &mut project).await.unwrap_err();
    assert!(matches!(err, projdash_projects::Error::Validation { .. }));
    assert_eq!(h.config.load_calls(), 0);
    assert_eq!(h.dirs.ensure_calls(), 0);
}

#[tokio::test]
async fn concurrent_activity_updates_across_projects() {
    let h = Arc::new(Harness::empty());
    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(
            h.populate(&format!("busy-{n}"), &format!("/integration/busy{n}"))
                .await
                .id,
        );
    }

    let updates = ids.iter().cycle().take(40).map(|id| {
        let h = Arc::clone(&h);
        let id = id.clone();
        async move {
            h.coordinator
                .update_last_activity(&live(), &id, Utc::now())
                .await
        }
    });
    for result in futures::future::join_all(updates).await {
        result.unwrap();
    }

    assert_eq!(h.coordinator.hot_index_len().await, 5);
    assert_eq!(h.coordinator.cached_repo_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_new_project_saves_all_register() {
    let h = Arc::new(Harness::empty());

    let mut handles = Vec::new();
    for n in 0..32 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            let mut project = Project::new(format!("/integration/fresh{n}"));
            h.coordinator.save(&live(), &mut project).await.map(|()| project.id)
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.config.snapshot().len(), 32);
    assert_eq!(h.coordinator.find_all(&live()).await.unwrap().len(), 32);
    for id in &ids {
        h.coordinator.find_by_id(&live(), id).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_delete_and_save_keep_registry_consistent() {
    let h = Arc::new(Harness::empty());
    let mut doomed = Vec::new();
    for n in 0..8 {
        doomed.push(
            h.populate(&format!("old-{n}"), &format!("/integration/old{n}"))
                .await
                .id,
        );
    }

    let mut handles = Vec::new();
    for (n, id) in doomed.into_iter().enumerate() {
        let deleter = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            deleter.coordinator.delete(&live(), &id).await
        }));
        let saver = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            let mut project = Project::new(format!("/integration/new{n}"));
            saver.coordinator.save(&live(), &mut project).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let registry = h.config.snapshot();
    assert_eq!(registry.len(), 8);
    assert!(registry.projects().all(|dir| dir.starts_with("new")));
    assert_eq!(h.coordinator.find_all(&live()).await.unwrap().len(), 8);
}
