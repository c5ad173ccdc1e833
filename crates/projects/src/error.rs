use std::path::{Path, PathBuf};

/// SQLite primary result codes that indicate a damaged database file.
const SQLITE_IOERR: i32 = 10;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_NOTADB: i32 = 26;

/// Lowercased error-text fragments that indicate a damaged database file.
const CORRUPTION_MARKERS: &[&str] = &[
    "malformed",
    "corrupt",
    "disk i/o error",
    "database disk image is malformed",
];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("project not found: {key}")]
    NotFound { key: String },

    #[error("project directory not accessible: {}", .path.display())]
    PathNotAccessible { path: PathBuf },

    #[error(
        "{context}: database corrupted at {}: {message} (delete {} and re-add the project)",
        .path.display(),
        .path.display()
    )]
    DatabaseCorrupted {
        context: String,
        path: PathBuf,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("migration v{version} ({description}) failed: {source}")]
    Migration {
        version: i64,
        description: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("invalid project: {message}")]
    Validation { message: String },

    #[error("failed to decode {field} {value:?}: {source}")]
    Decode {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("project {id} is stored at {} but has no registry entry", .path.display())]
    Consistency { id: String, path: PathBuf },

    #[error("registry: {0}")]
    Registry(#[source] projdash_config::Error),

    #[error("project directory for {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: projdash_config::Error,
    },

    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

}

impl Error {
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn path_not_accessible(path: impl Into<PathBuf>) -> Self {
        Self::PathNotAccessible { path: path.into() }
    }

    /// Wrap a driver error for the database at `db_path`.
    ///
    /// Corruption signals become [`Error::DatabaseCorrupted`]; everything else
    /// keeps the driver error as its source.
    #[must_use]
    pub fn database(context: impl Into<String>, db_path: &Path, source: sqlx::Error) -> Self {
        if is_corruption(&source) {
            return Self::DatabaseCorrupted {
                context: context.into(),
                path: db_path.to_path_buf(),
                message: source.to_string(),
            };
        }
        Self::Database {
            context: context.into(),
            source,
        }
    }

    /// Wrap a directory-manager failure for project `path`.
    #[must_use]
    pub fn directory(path: &Path, source: projdash_config::Error) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Directory {
            path: path.to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        match self {
            Self::DatabaseCorrupted { .. } => true,
            Self::Migration { source, .. } => source.is_corrupted(),
            _ => false,
        }
    }
}

impl From<projdash_config::Error> for Error {
    fn from(err: projdash_config::Error) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Registry(err)
        }
    }
}

/// Whether a driver error signals a damaged database file.
///
/// Prefers the SQLite result code when the driver exposes one and falls back
/// to matching the error text.
pub fn is_corruption(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db) = err
        && let Some(code) = db.code().and_then(|c| c.parse::<i32>().ok())
        && matches!(code & 0xff, SQLITE_IOERR | SQLITE_CORRUPT | SQLITE_NOTADB)
    {
        return true;
    }
    is_corruption_message(&err.to_string())
}

pub(crate) fn is_corruption_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    CORRUPTION_MARKERS.iter().any(|m| lower.contains(m))
}

pub type Result<T> = std::result::Result<T, Error>;
