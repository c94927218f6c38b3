#[allow(clippy::single_component_path_imports)]
use serde_yaml;

/// Errors raised by the episode core.
///
/// The first five variants are the caller-facing taxonomy and are what the API layer maps to
/// distinct responses. Everything below them is a storage or configuration fault.
#[derive(Debug, thiserror::Error)]
pub enum EpisodeError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("forbidden")]
    Forbidden,
    #[error("episode is discharged and closed to further changes")]
    EpisodeClosed,
    #[error("episode not found")]
    NotFound,
    #[error("episode was modified concurrently (expected version {expected}, found {actual})")]
    Conflict { expected: u64, actual: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to create episode directory: {0}")]
    EpisodeDirCreation(std::io::Error),
    #[error(
        "admission failed and cleanup also failed (path: {path}): init={init_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterInitialiseFailed {
        path: std::path::PathBuf,
        #[source]
        init_error: Box<EpisodeError>,
        cleanup_error: std::io::Error,
    },
    #[error("failed to write episode file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read episode file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("corrupt record {file} at {path}: {message}")]
    CorruptRecord {
        file: String,
        path: String,
        message: String,
    },
    #[error("could not allocate a unique admission number")]
    AdmissionNumberExhausted,
    #[error("episode lock poisoned")]
    LockPoisoned,

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),
    #[error("failed to walk git history: {0}")]
    GitRevwalk(git2::Error),
}

impl EpisodeError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for the variants a caller can act on; false for internal faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Forbidden
                | Self::EpisodeClosed
                | Self::NotFound
                | Self::Conflict { .. }
        )
    }
}

pub type EpisodeResult<T> = std::result::Result<T, EpisodeError>;
