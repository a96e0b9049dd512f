use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("document not found")]
    NotFound,

    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("invalid pipeline: {reason}")]
    InvalidPipeline { reason: String },

    #[error("pipeline failed at stage {index} ({stage}): {source}")]
    PipelineStage {
        index: usize,
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },

    #[error("document with id '{id}' already exists")]
    DuplicateId { id: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lock poisoned: {lock_name} (another thread panicked while holding this lock)")]
    LockPoisoned { lock_name: String },
}

impl Error {
    /// The stage index a pipeline error was raised at, if any.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Error::PipelineStage { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::LockPoisoned {
            lock_name: "unknown".to_string(),
        }
    }
}
