use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoverError {
    #[error("recovery is already in progress")]
    AlreadyRecovering,

    #[error("database is not empty")]
    NotEmpty,

    #[error("download failed: {0}")]
    Download(String),

    #[error(transparent)]
    Sql(#[from] sql::SqlError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
