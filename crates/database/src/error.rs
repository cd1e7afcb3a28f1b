use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to connect to the database: {0}")]
    ConnectionError(#[source] sqlx::Error),

    #[error("Failed to prepare the statement: {0}")]
    PrepareError(#[source] sqlx::Error),

    #[error("Statement execution failed: {0}")]
    ExecutionError(#[source] sqlx::Error),

    #[error("Failed to close the database connection: {0}")]
    CloseError(#[source] sqlx::Error),
}
