use database::DbError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a batch run stopped.
///
/// The first failure aborts the run; statements after it are not executed
/// and result files already written stay on disk.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::error::ConfigError),

    #[error("Database connection error: {0}")]
    Connection(#[source] DbError),

    #[error("Failed to read queries file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Query {index} failed: {source}")]
    Execution {
        index: usize,
        #[source]
        source: DbError,
    },

    #[error("Query {index} returned no result set to fetch")]
    NoResultSet { index: usize },

    #[error("Failed to write result file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
