use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("statement has {expected} placeholder(s) but {got} argument(s) were bound")]
    ArgumentCountMismatch { expected: usize, got: usize },

    #[error("malformed netstring frame at byte offset {0}")]
    MalformedFrame(usize),

    #[error("frame declared length {declared} but only {available} bytes remained")]
    TruncatedFrame { declared: usize, available: usize },

    #[error("statement is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
