use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {name}: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write photo {path}: {source}")]
    Photo {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("data directory {path} is in use by another rollcall process")]
    Locked { path: PathBuf },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Input rejected before any store is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("person id {0:?} may only contain letters, digits, '-', '_' and '.'")]
    InvalidId(String),
    #[error("person id {0} is already registered")]
    DuplicateId(String),
    #[error("no person with id {0}")]
    UnknownId(String),
    #[error("time-in {0:?} is not a valid HH:MM time")]
    InvalidTime(String),
    #[error("unknown weekday {0:?}")]
    InvalidWeekday(String),
}
