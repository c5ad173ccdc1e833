use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
};

/// Stable project identifier: the first 16 hex digits of SHA-256 over the path.
pub fn project_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

/// Lifecycle state of a tracked project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    #[default]
    Active,
    Hibernated,
}

impl ProjectState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Hibernated => "hibernated",
        }
    }

    /// Unknown tokens fall back to `Active`, the column default.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hibernated" => Self::Hibernated,
            _ => Self::Active,
        }
    }
}

/// Workflow stage reported by detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reserved for tokens this build does not recognise.
    #[default]
    Unknown,
    NotStarted,
    Discovery,
    Planning,
    Design,
    Implementation,
    Testing,
    Review,
    Deployed,
    Maintenance,
}

impl Stage {
    pub const ALL: [Self; 10] = [
        Self::Unknown,
        Self::NotStarted,
        Self::Discovery,
        Self::Planning,
        Self::Design,
        Self::Implementation,
        Self::Testing,
        Self::Review,
        Self::Deployed,
        Self::Maintenance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NotStarted => "not_started",
            Self::Discovery => "discovery",
            Self::Planning => "planning",
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Review => "review",
            Self::Deployed => "deployed",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn parse_lossy(s: &str) -> Self {
        let token = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == token)
            .unwrap_or(Self::Unknown)
    }
}

/// How sure detection is about the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Certain,
    Likely,
    Uncertain,
    /// Reserved for tokens this build does not recognise.
    Unknown,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Certain => "certain",
            Self::Likely => "likely",
            Self::Uncertain => "uncertain",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "certain" => Self::Certain,
            "likely" => Self::Likely,
            "uncertain" => Self::Uncertain,
            _ => Self::Unknown,
        }
    }
}

macro_rules! token_impls {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::parse_lossy(s))
            }
        }
    )*};
}

token_impls!(ProjectState, Stage, Confidence);

/// A tracked project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    /// Empty means "use `name`".
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub detected_method: String,
    #[serde(default)]
    pub current_stage: Stage,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub detection_reasoning: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub state: ProjectState,
    #[serde(default)]
    pub notes: String,
    /// Set while the path is unreachable (e.g. an unmounted volume).
    #[serde(default)]
    pub path_missing: bool,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// New active project for `path`, with id and name derived from it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let now = Utc::now();
        Self {
            id: project_id(&path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
            display_name: String::new(),
            detected_method: String::new(),
            current_stage: Stage::Unknown,
            confidence: None,
            detection_reasoning: String::new(),
            is_favorite: false,
            state: ProjectState::Active,
            notes: String::new(),
            path_missing: false,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name to show: the display override when set, else the derived name.
    pub fn effective_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn is_hibernated(&self) -> bool {
        self.state == ProjectState::Hibernated
    }
}
