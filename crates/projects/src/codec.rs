//! Conversion between the persisted row form and [`Project`].
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC with
//! nanosecond precision, so text order matches chronological order.
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    Error, Result,
    types::{Confidence, Project, ProjectState, Stage},
};

/// Persisted form of a [`Project`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub path: String,
    pub display_name: Option<String>,
    pub detected_method: Option<String>,
    pub current_stage: Option<String>,
    pub confidence: Option<String>,
    pub detection_reasoning: Option<String>,
    pub is_favorite: Option<i64>,
    pub state: Option<String>,
    pub notes: Option<String>,
    pub path_missing: Option<i64>,
    pub last_activity_at: String,
    pub created_at: String,
    pub updated_at: String,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| Error::Decode {
            field,
            value: value.to_string(),
            source,
        })
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Encode a project for storage.
pub fn encode(project: &Project) -> ProjectRow {
    ProjectRow {
        id: project.id.clone(),
        name: project.name.clone(),
        path: project.path.to_string_lossy().into_owned(),
        display_name: non_empty(&project.display_name),
        detected_method: non_empty(&project.detected_method),
        current_stage: Some(project.current_stage.as_str().to_string()),
        confidence: project
            .confidence
            .filter(|c| *c != Confidence::Unknown)
            .map(|c| c.as_str().to_string()),
        detection_reasoning: non_empty(&project.detection_reasoning),
        is_favorite: Some(i64::from(project.is_favorite)),
        state: Some(project.state.as_str().to_string()),
        notes: non_empty(&project.notes),
        path_missing: Some(i64::from(project.path_missing)),
        last_activity_at: format_timestamp(&project.last_activity_at),
        created_at: format_timestamp(&project.created_at),
        updated_at: format_timestamp(&project.updated_at),
    }
}

/// Decode a stored row.
///
/// Only malformed timestamps fail; every other column has a fallback.
pub fn decode(row: ProjectRow) -> Result<Project> {
    Ok(Project {
        last_activity_at: parse_timestamp("last_activity_at", &row.last_activity_at)?,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        id: row.id,
        name: row.name,
        path: PathBuf::from(row.path),
        display_name: row.display_name.unwrap_or_default(),
        detected_method: row.detected_method.unwrap_or_default(),
        current_stage: row
            .current_stage
            .as_deref()
            .map(Stage::parse_lossy)
            .unwrap_or_default(),
        confidence: row.confidence.as_deref().map(Confidence::parse_lossy),
        detection_reasoning: row.detection_reasoning.unwrap_or_default(),
        is_favorite: row.is_favorite.unwrap_or(0) != 0,
        state: row
            .state
            .as_deref()
            .map(ProjectState::parse_lossy)
            .unwrap_or_default(),
        notes: row.notes.unwrap_or_default(),
        path_missing: row.path_missing.unwrap_or(0) != 0,
    })
}

impl TryFrom<ProjectRow> for Project {
    type Error = Error;

    fn try_from(row: ProjectRow) -> Result<Self> {
        decode(row)
    }
}
