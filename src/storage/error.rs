/// Errors returned by [`StorageApi`](super::StorageApi) implementations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A database operation failed.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// Running migrations failed.
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// A stored column could not be decoded into its domain type.
    #[error("invalid value for column {column}: {value}")]
    InvalidColumn {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },
    /// A record referenced by an update does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// A write-once field of a record is already set.
    #[error("{0} already recorded")]
    AlreadyRecorded(String),
}
