use crate::connection::connect;
use crate::error::DbError;
use crate::value::ResultRow;
use async_trait::async_trait;
use configuration::ConnectionConfig;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Executor, Statement};

/// Whether a statement hands back rows, determined before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// The statement describes output columns (SELECT, `... RETURNING`, SHOW).
    Query { columns: usize },
    /// The statement produces no result set (INSERT, UPDATE, DDL...).
    Command,
}

/// The operations the batch runner needs from a database session.
///
/// Abstracting the session lets the runner be driven by PostgreSQL in
/// production and by an in-memory fake in tests.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Prepares `sql` without running it and reports whether it yields rows.
    async fn inspect(&mut self, sql: &str) -> Result<StatementKind, DbError>;

    /// Runs a row-producing statement and fetches every row.
    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<ResultRow>, DbError>;

    /// Runs a statement without a result set; returns the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64, DbError>;

    /// Releases the underlying connection.
    async fn close(self) -> Result<(), DbError>;
}

/// A session over one dedicated PostgreSQL connection.
#[derive(Debug)]
pub struct PgSession {
    conn: PgConnection,
}

impl PgSession {
    /// Opens the connection described by `config`.
    pub async fn open(config: &ConnectionConfig) -> Result<Self, DbError> {
        let conn = connect(config).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StatementExecutor for PgSession {
    async fn inspect(&mut self, sql: &str) -> Result<StatementKind, DbError> {
        let statement = (&mut self.conn)
            .prepare(sql)
            .await
            .map_err(DbError::PrepareError)?;
        let columns = statement.columns().len();

        // A cached statement keeps its result type. Dropping it lets the same
        // text run again after the schema it reads has changed.
        self.conn
            .clear_cached_statements()
            .await
            .map_err(DbError::PrepareError)?;

        Ok(if columns == 0 {
            StatementKind::Command
        } else {
            StatementKind::Query { columns }
        })
    }

    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<ResultRow>, DbError> {
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut self.conn)
            .await
            .map_err(DbError::ExecutionError)?;

        tracing::debug!(row_count = rows.len(), "Rows fetched.");
        Ok(rows.iter().map(ResultRow::from_pg_row).collect())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        let result = sqlx::query(sql)
            .persistent(false)
            .execute(&mut self.conn)
            .await
            .map_err(DbError::ExecutionError)?;

        Ok(result.rows_affected())
    }

    async fn close(self) -> Result<(), DbError> {
        self.conn.close().await.map_err(DbError::CloseError)?;
        tracing::debug!("Database connection closed.");
        Ok(())
    }
}
