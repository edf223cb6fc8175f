use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error(transparent)]
    Sql(#[from] sql::SqlError),

    #[error(transparent)]
    RelayLog(#[from] relay_log::RelayLogError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
