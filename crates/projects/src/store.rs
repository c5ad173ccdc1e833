//! SQLite-backed repository for a single project directory.
//!
//! The database lives at `<project_dir>/state.db`. No connection outlives an
//! operation: each call opens one in WAL mode with a 5 s busy timeout, runs
//! its statement and closes it again, so concurrent access is left to
//! SQLite's file locking.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{
        Connection, Sqlite, SqliteConnection,
        query::Query,
        sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode},
    },
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::{
    Error, Result,
    codec::{self, ProjectRow, format_timestamp},
    repository::Repository,
    schema::{self, Migrator},
    types::{Project, ProjectState},
};

/// Database file name inside a project directory.
pub const DB_FILENAME: &str = "state.db";

/// How long a connection waits for a competing writer's lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_PROJECTS: &str = "SELECT id, name, path, display_name, detected_method, \
     current_stage, confidence, detection_reasoning, is_favorite, state, notes, path_missing, \
     last_activity_at, created_at, updated_at FROM projects";

pub(crate) fn ensure_live(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Checks the invariants a project must satisfy before it is written.
pub fn validate(project: &Project) -> Result<()> {
    if project.id.is_empty() {
        return Err(Error::validation("id must not be empty"));
    }
    if project.path.as_os_str().is_empty() {
        return Err(Error::validation("path must not be empty"));
    }
    if !project.path.is_absolute() {
        return Err(Error::validation(format!(
            "path {} is not absolute",
            project.path.display()
        )));
    }
    if project.created_at <= DateTime::<Utc>::UNIX_EPOCH {
        return Err(Error::validation("created_at is not set"));
    }
    if project.last_activity_at <= DateTime::<Utc>::UNIX_EPOCH {
        return Err(Error::validation("last_activity_at is not set"));
    }
    Ok(())
}

/// Repository over one project's `state.db`.
///
/// Holds no open handles, so it can be shared freely and dropped at any time.
#[derive(Debug, Clone)]
pub struct ProjectRepository {
    dir: PathBuf,
    db_path: PathBuf,
    options: SqliteConnectOptions,
}

impl ProjectRepository {
    /// Open the repository for `dir`, migrating its schema to the latest
    /// version before returning.
    pub async fn open(token: &CancellationToken, dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(token, dir, Migrator::default()).await
    }

    pub async fn open_with(
        token: &CancellationToken,
        dir: impl Into<PathBuf>,
        migrator: Migrator,
    ) -> Result<Self> {
        ensure_live(token)?;
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::path_not_accessible(dir));
        }
        let db_path = dir.join(DB_FILENAME);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let repo = Self {
            dir,
            db_path,
            options,
        };

        let mut conn = repo.connect().await?;
        let migrated = migrator.apply(&mut conn, &repo.db_path).await;
        repo.release(conn).await;
        let version = migrated?;
        debug!(db = %repo.db_path.display(), version, "opened project repository");
        Ok(repo)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Schema version currently recorded in the database.
    pub async fn schema_version(&self, token: &CancellationToken) -> Result<i64> {
        ensure_live(token)?;
        let mut conn = self.connect().await?;
        let version = schema::current_version(&mut conn).await;
        self.release(conn).await;
        version.map_err(|e| self.db_error("read schema version", e))
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|e| self.db_error("open database", e))
    }

    async fn release(&self, conn: SqliteConnection) {
        if let Err(e) = conn.close().await {
            debug!(db = %self.db_path.display(), error = %e, "closing connection failed");
        }
    }

    fn db_error(&self, context: &str, source: sqlx::Error) -> Error {
        Error::database(
            format!("{context} in {}", self.db_path.display()),
            &self.db_path,
            source,
        )
    }

    async fn list_where(
        &self,
        token: &CancellationToken,
        state: Option<ProjectState>,
    ) -> Result<Vec<Project>> {
        ensure_live(token)?;
        let mut conn = self.connect().await?;
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, ProjectRow>(&format!(
                    "{SELECT_PROJECTS} WHERE state = ? ORDER BY name ASC"
                ))
                .bind(state.as_str())
                .fetch_all(&mut conn)
                .await
            },
            None => {
                sqlx::query_as::<_, ProjectRow>(&format!("{SELECT_PROJECTS} ORDER BY name ASC"))
                    .fetch_all(&mut conn)
                    .await
            },
        };
        self.release(conn).await;
        let rows = rows.map_err(|e| self.db_error("list projects", e))?;
        rows.into_iter().map(codec::decode).collect()
    }

    /// Single-statement upsert: `OR REPLACE` drops any row colliding on id
    /// or path, and `created_at` survives when the id already existed.
    async fn upsert(conn: &mut SqliteConnection, row: &ProjectRow) -> sqlx::Result<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO projects (id, name, path, display_name, detected_method,
                   current_stage, confidence, detection_reasoning, is_favorite, state, notes,
                   path_missing, last_activity_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                   COALESCE((SELECT created_at FROM projects WHERE id = ?), ?), ?)"#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.path)
        .bind(&row.display_name)
        .bind(&row.detected_method)
        .bind(&row.current_stage)
        .bind(&row.confidence)
        .bind(&row.detection_reasoning)
        .bind(row.is_favorite)
        .bind(&row.state)
        .bind(&row.notes)
        .bind(row.path_missing)
        .bind(&row.last_activity_at)
        .bind(&row.id)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn find_one(&self, token: &CancellationToken, column: &str, key: &str) -> Result<Project> {
        ensure_live(token)?;
        let mut conn = self.connect().await?;
        let row = sqlx::query_as::<_, ProjectRow>(&format!("{SELECT_PROJECTS} WHERE {column} = ?"))
            .bind(key)
            .fetch_optional(&mut conn)
            .await;
        self.release(conn).await;
        let row = row.map_err(|e| self.db_error(&format!("find project by {column}"), e))?;
        codec::decode(row.ok_or_else(|| Error::not_found(key))?)
    }

    /// Run an UPDATE/DELETE keyed by id, mapping "no row affected" to `NotFound`.
    async fn execute_for_id<'q>(
        &self,
        token: &CancellationToken,
        context: &str,
        id: &str,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Result<()> {
        ensure_live(token)?;
        let mut conn = self.connect().await?;
        let result = query.execute(&mut conn).await;
        self.release(conn).await;
        let result = result.map_err(|e| self.db_error(context, e))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for ProjectRepository {
    async fn save(&self, token: &CancellationToken, project: &mut Project) -> Result<()> {
        ensure_live(token)?;
        validate(project)?;
        project.updated_at = Utc::now();
        let row = codec::encode(project);

        let mut conn = self.connect().await?;
        let result = Self::upsert(&mut conn, &row).await;
        self.release(conn).await;
        result.map_err(|e| self.db_error(&format!("save project {}", project.id), e))
    }

    async fn find_by_id(&self, token: &CancellationToken, id: &str) -> Result<Project> {
        self.find_one(token, "id", id).await
    }

    async fn find_by_path(&self, token: &CancellationToken, path: &Path) -> Result<Project> {
        self.find_one(token, "path", &path.to_string_lossy()).await
    }

    async fn find_all(&self, token: &CancellationToken) -> Result<Vec<Project>> {
        self.list_where(token, None).await
    }

    async fn find_active(&self, token: &CancellationToken) -> Result<Vec<Project>> {
        self.list_where(token, Some(ProjectState::Active)).await
    }

    async fn find_hibernated(&self, token: &CancellationToken) -> Result<Vec<Project>> {
        self.list_where(token, Some(ProjectState::Hibernated)).await
    }

    async fn delete(&self, token: &CancellationToken, id: &str) -> Result<()> {
        let query = sqlx::query("DELETE FROM projects WHERE id = ?").bind(id);
        self.execute_for_id(token, &format!("delete project {id}"), id, query)
            .await
    }

    async fn update_state(
        &self,
        token: &CancellationToken,
        id: &str,
        state: ProjectState,
    ) -> Result<()> {
        let query = sqlx::query("UPDATE projects SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(format_timestamp(&Utc::now()))
            .bind(id);
        self.execute_for_id(token, &format!("update state of {id}"), id, query)
            .await
    }

    async fn update_last_activity(
        &self,
        token: &CancellationToken,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query = sqlx::query(
            "UPDATE projects SET last_activity_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(format_timestamp(&at))
        .bind(format_timestamp(&Utc::now()))
        .bind(id);
        self.execute_for_id(token, &format!("update activity of {id}"), id, query)
            .await
    }
}
