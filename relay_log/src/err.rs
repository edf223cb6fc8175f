use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayLogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("sql error: {0}")]
    Sql(#[from] sql::err::SqlError),

    #[error("upload failed: {0}")]
    Upload(String),
}
