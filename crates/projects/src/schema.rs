//! Per-project database schema and its ordered migrations.
//!
//! Applied versions are recorded in `schema_version`. Each pending migration
//! runs in its own transaction; the first failure stops the run.
use std::path::Path;

use {
    chrono::Utc,
    sqlx::{Connection, SqliteConnection},
    tracing::{debug, info, warn},
};

use crate::{Error, Result, codec::format_timestamp};

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

const CREATE_SCHEMA_VERSION: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT    NOT NULL
)";

/// Migrations shipped with this build, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create projects table",
        statements: &[
            CREATE_SCHEMA_VERSION,
            r#"CREATE TABLE IF NOT EXISTS projects (
                id                  TEXT    PRIMARY KEY,
                name                TEXT    NOT NULL,
                path                TEXT    NOT NULL UNIQUE,
                display_name        TEXT,
                detected_method     TEXT,
                current_stage       TEXT,
                confidence          TEXT,
                detection_reasoning TEXT,
                is_favorite         INTEGER DEFAULT 0,
                state               TEXT    DEFAULT 'active',
                notes               TEXT,
                last_activity_at    TEXT    NOT NULL,
                created_at          TEXT    NOT NULL,
                updated_at          TEXT    NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_projects_path ON projects(path)",
            "CREATE INDEX IF NOT EXISTS idx_projects_state ON projects(state)",
        ],
    },
    Migration {
        version: 2,
        description: "add path_missing flag",
        statements: &["ALTER TABLE projects ADD COLUMN path_missing INTEGER DEFAULT 0"],
    },
];

/// Applies a fixed list of migrations to one database.
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
    migrations: &'static [Migration],
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(MIGRATIONS)
    }
}

impl Migrator {
    pub const fn new(migrations: &'static [Migration]) -> Self {
        Self { migrations }
    }

    /// Highest version this migrator knows about.
    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Bring the database up to [`Self::latest_version`].
    ///
    /// Returns the resulting schema version. `db_path` is only used for error
    /// reporting.
    pub async fn apply(&self, conn: &mut SqliteConnection, db_path: &Path) -> Result<i64> {
        self.check_order()?;

        sqlx::query(CREATE_SCHEMA_VERSION)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::database("create schema_version", db_path, e))?;

        let current = current_version(conn)
            .await
            .map_err(|e| Error::database("read schema version", db_path, e))?;
        let latest = self.latest_version();
        if current > latest {
            return Err(Error::SchemaTooNew {
                found: current,
                supported: latest,
            });
        }

        for migration in self.migrations.iter().filter(|m| m.version > current) {
            apply_one(conn, migration)
                .await
                .map_err(|e| Error::Migration {
                    version: migration.version,
                    description: migration.description,
                    source: Box::new(Error::database("apply migration", db_path, e)),
                })?;
            info!(
                db = %db_path.display(),
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }

        if current == latest {
            debug!(db = %db_path.display(), version = current, "schema up to date");
        }
        Ok(latest)
    }

    fn check_order(&self) -> Result<()> {
        for (idx, migration) in self.migrations.iter().enumerate() {
            let expected = i64::try_from(idx).unwrap_or(i64::MAX).saturating_add(1);
            if migration.version != expected {
                return Err(Error::validation(format!(
                    "migration {:?} has version {}, expected {expected}",
                    migration.description, migration.version
                )));
            }
        }
        Ok(())
    }
}

/// `max(version)` from `schema_version`, or 0 on a fresh database.
pub async fn current_version(conn: &mut SqliteConnection) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(&mut *conn)
        .await
}

async fn apply_one(conn: &mut SqliteConnection, migration: &Migration) -> sqlx::Result<()> {
    let mut tx = conn.begin().await?;
    match run_statements(&mut tx, migration).await {
        Ok(()) => tx.commit().await,
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(
                    version = migration.version,
                    error = %rollback,
                    "migration rollback failed"
                );
            }
            Err(e)
        },
    }
}

async fn run_statements(conn: &mut SqliteConnection, migration: &Migration) -> sqlx::Result<()> {
    for statement in migration.statements {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
        .bind(migration.version)
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *conn)
        .await?;
    Ok(())
}
