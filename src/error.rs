use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a source into a [`Table`](crate::loader::Table).
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// Expected local artifact is not there.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Remote fetch failed (network error or non-success HTTP status).
    #[error("source unavailable: {url}: {reason}")]
    SourceUnavailable {
        url: String,
        reason: String,
        /// `None` when the server answered with a non-success status
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read workbook {}: {source}", path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("source {origin} has no header row")]
    Empty { origin: String },

    #[error("column '{column}' not found in {origin}")]
    MissingColumn { column: String, origin: String },
}

/// Which of the two input datasets a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Properties,
    Services,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Properties => write!(f, "confiscated properties"),
            Dataset::Services => write!(f, "social services"),
        }
    }
}

/// Fatal pipeline failure. Any variant aborts the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{dataset} dataset failed to load: {source}")]
    Load {
        dataset: Dataset,
        #[source]
        source: DataLoadError,
    },

    #[error(transparent)]
    Coordinates(#[from] CoordinateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn load(dataset: Dataset) -> impl FnOnce(DataLoadError) -> Self {
        move |source| PipelineError::Load { dataset, source }
    }

    /// The dataset that failed, when the failure is a load failure.
    pub fn dataset(&self) -> Option<Dataset> {
        match self {
            PipelineError::Load { dataset, .. } => Some(*dataset),
            PipelineError::Coordinates(_) | PipelineError::Config(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinateError {
    #[error("failed to read coordinate table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid coordinate table {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid delimiter '{0}': expected \"auto\" or a single ASCII character")]
    Delimiter(String),
}
