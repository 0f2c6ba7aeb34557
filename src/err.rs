//! Error types shared across the pipeline stages.

/// Input file is malformed or not supported.
///
/// Raised both when validating the header of an uploaded file and when
/// normalizing an annotated per-gene file.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ParsingError {
    pub message: String,
}

impl ParsingError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Problem running the external annotation pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AnnotationToolError {
    #[error("could not start {stage} command {program:?}: {source}")]
    Spawn {
        stage: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} command exited with code {code:?}: {stderr}")]
    Failed {
        stage: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("problem writing per-gene files: {0}")]
    Io(#[from] std::io::Error),
}

/// Problem accessing the relational store.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not obtain connection from pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("store lock poisoned by a panicking writer")]
    LockPoisoned,
    #[error("could not (de)serialize stored value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid stored value in column {column}: {value:?}")]
    InvalidValue { column: &'static str, value: String },
}
