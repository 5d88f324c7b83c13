use thiserror::Error;

use crate::model::EntityKind;

/// Which side of a migration a fetch was talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing configuration: {0} (set it in the config file, a flag, or the environment)")]
    ConfigMissing(&'static str),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to fetch {kind} from {side}: {message}")]
    Fetch {
        kind: EntityKind,
        side: Side,
        message: String,
    },

    #[error("failed to filter {0}: {1}")]
    Filter(EntityKind, String),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no destination section for case {0}: its source section is unmapped and no --dst-section was given")]
    NoTargetSection(u64),

    #[error("mapping file '{0}' is corrupt: {1}")]
    MappingCorrupt(String, String),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("migration of {0} aborted at confirmation prompt")]
    Aborted(EntityKind),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config_missing",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::Fetch { .. } => "fetch_failed",
            Self::Filter(_, _) => "filter_failed",
            Self::Api { .. } => "api_error",
            Self::Http(_) => "http_error",
            Self::NoTargetSection(_) => "no_target_section",
            Self::MappingCorrupt(_, _) => "mapping_corrupt",
            Self::Locked(_) => "locked",
            Self::Aborted(_) => "aborted",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
        }
    }

    /// Wrap a client error as a fetch failure for one side of a migration.
    pub fn fetch(kind: EntityKind, side: Side, err: SyncError) -> Self {
        Self::Fetch {
            kind,
            side,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
