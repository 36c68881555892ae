use thiserror::Error;

/// Everything the rehearsal engine can report back to its caller.
///
/// None of these are fatal: an invalid edit is rejected and the previous value
/// kept, a failed conversion yields no deck at all, and a failed write leaves
/// the in-memory session untouched.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid time '{0}', expected HH:MM:SS")]
    InvalidFormat(String),

    #[error("slide index {index} out of range for a deck of {len} slides")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to render page {}", .page + 1)]
    PageRender {
        /// 0-based page index
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} is not a readable PDF", .path.display())]
    UnreadableDocument {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("a rehearsal session is already running")]
    SessionAlreadyActive,

    #[error("deck has no slides")]
    EmptyDeck,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("presentation {0} not found")]
    NotFound(i64),

    #[error("presentation {presentation} has no slide {}", .slide_index + 1)]
    SlideNotFound { presentation: i64, slide_index: usize },
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(err.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Persistence(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
