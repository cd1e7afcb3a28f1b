//! # Runner Crate
//!
//! Executes a file of `;`-separated SQL statements, one after the other, over
//! a single database session and writes the rows of every statement to its own
//! `result_query_<N>.txt` file, `N` being the statement's position in the file.
//!
//! - `run`: opens the PostgreSQL session and runs the batch.
//! - `run_with_session`: runs the batch over any `StatementExecutor`.
//! - `split_statements`: the naive and SQL-aware splitters.
//! - `RunError`: why a run stopped.

use configuration::{ConnectionConfig, FetchMode, RunnerSettings};
use database::{DbError, PgSession, StatementExecutor, StatementKind};
use std::fmt;
use std::path::PathBuf;

pub mod error;
pub mod output;
pub mod splitter;

pub use error::RunError;
pub use output::{result_file_path, write_result_file};
pub use splitter::{Statement, split_statements};

const SQL_PREVIEW_CHARS: usize = 100;

/// What happened to one executed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    /// The statement returned rows, which were written to `path`.
    Rows {
        index: usize,
        path: PathBuf,
        row_count: usize,
    },
    /// The statement had no result set; no file was written.
    Command { index: usize, rows_affected: u64 },
}

impl StatementOutcome {
    pub fn index(&self) -> usize {
        match self {
            StatementOutcome::Rows { index, .. } | StatementOutcome::Command { index, .. } => {
                *index
            }
        }
    }
}

/// The status line printed for each executed statement.
impl fmt::Display for StatementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementOutcome::Rows { index, path, .. } => write!(
                f,
                "Query {index} executed and result saved to {}",
                path.display()
            ),
            StatementOutcome::Command { index, rows_affected } => {
                write!(f, "Query {index} executed ({rows_affected} rows affected)")
            }
        }
    }
}

/// Outcomes of a successful run, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<StatementOutcome>,
}

/// Connects with `connection` and runs the batch described by `settings`.
///
/// `on_status` is called once per executed statement, right after its result
/// file (if any) has been flushed.
pub async fn run(
    settings: &RunnerSettings,
    connection: &ConnectionConfig,
    on_status: impl FnMut(&StatementOutcome),
) -> Result<RunReport, RunError> {
    let session = PgSession::open(connection)
        .await
        .map_err(RunError::Connection)?;
    run_with_session(session, settings, on_status).await
}

/// Runs the batch over an already open session and closes it afterwards,
/// whether the batch succeeded or not.
pub async fn run_with_session<E: StatementExecutor>(
    mut session: E,
    settings: &RunnerSettings,
    mut on_status: impl FnMut(&StatementOutcome),
) -> Result<RunReport, RunError> {
    let result = run_batch(&mut session, settings, &mut on_status).await;

    match (session.close().await, &result) {
        (Ok(()), _) => {}
        (Err(e), Ok(_)) => return Err(RunError::Connection(e)),
        // The batch error is the one worth reporting.
        (Err(e), Err(_)) => tracing::warn!(error = %e, "Failed to close the session after a failed run."),
    }

    result
}

async fn run_batch<E: StatementExecutor>(
    session: &mut E,
    settings: &RunnerSettings,
    on_status: &mut impl FnMut(&StatementOutcome),
) -> Result<RunReport, RunError> {
    let text = tokio::fs::read_to_string(&settings.queries_file)
        .await
        .map_err(|source| RunError::Read {
            path: settings.queries_file.clone(),
            source,
        })?;

    if settings.create_output_dir {
        tokio::fs::create_dir_all(&settings.output_dir)
            .await
            .map_err(|source| RunError::Write {
                path: settings.output_dir.clone(),
                source,
            })?;
    }

    let statements = split_statements(&text, settings.split_mode);
    tracing::info!(
        file = %settings.queries_file.display(),
        fragments = statements.len(),
        split_mode = ?settings.split_mode,
        "Queries file loaded."
    );

    let mut report = RunReport::default();
    for statement in statements {
        if statement.is_blank() {
            tracing::trace!(index = statement.index, "Skipping blank fragment.");
            continue;
        }

        let outcome = run_statement(session, settings, statement).await?;
        on_status(&outcome);
        report.outcomes.push(outcome);
    }

    tracing::info!(executed = report.outcomes.len(), "Batch complete.");
    Ok(report)
}

async fn run_statement<E: StatementExecutor>(
    session: &mut E,
    settings: &RunnerSettings,
    statement: Statement<'_>,
) -> Result<StatementOutcome, RunError> {
    let index = statement.index;
    let sql = statement.sql;
    tracing::debug!(
        index,
        sql = %sql.trim().chars().take(SQL_PREVIEW_CHARS).collect::<String>(),
        "Executing statement."
    );

    let execution_error = |source: DbError| RunError::Execution { index, source };

    match session.inspect(sql).await.map_err(execution_error)? {
        StatementKind::Query { columns } => {
            let rows = session.fetch_all(sql).await.map_err(execution_error)?;

            let path = result_file_path(&settings.output_dir, index);
            write_result_file(&path, &rows)
                .await
                .map_err(|source| RunError::Write {
                    path: path.clone(),
                    source,
                })?;

            tracing::info!(index, columns, rows = rows.len(), path = %path.display(), "Result saved.");
            Ok(StatementOutcome::Rows {
                index,
                path,
                row_count: rows.len(),
            })
        }
        StatementKind::Command => match settings.fetch_mode {
            FetchMode::Strict => Err(RunError::NoResultSet { index }),
            FetchMode::Inspect => {
                let rows_affected = session.execute(sql).await.map_err(execution_error)?;
                tracing::info!(index, rows_affected, "Command executed.");
                Ok(StatementOutcome::Command {
                    index,
                    rows_affected,
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use configuration::SplitMode;
    use database::{DbError, ResultRow, SqlValue};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    enum Scripted {
        Rows(Vec<ResultRow>),
        Command(u64),
    }

    /// What the fake saw, shared with the test after the session is consumed.
    #[derive(Default)]
    struct Journal {
        executed: Vec<String>,
        closed: bool,
    }

    struct FakeSession {
        script: HashMap<String, Scripted>,
        journal: Arc<Mutex<Journal>>,
        fail_close: bool,
    }

    impl FakeSession {
        fn new(script: &[(&str, Scripted)]) -> (Self, Arc<Mutex<Journal>>) {
            let journal = Arc::new(Mutex::new(Journal::default()));
            let session = Self {
                script: script
                    .iter()
                    .map(|(sql, response)| (sql.to_string(), response.clone()))
                    .collect(),
                journal: journal.clone(),
                fail_close: false,
            };
            (session, journal)
        }

        fn lookup(&self, sql: &str) -> Result<Scripted, DbError> {
            self.script.get(sql.trim()).cloned().ok_or_else(|| {
                DbError::PrepareError(sqlx::Error::Protocol(format!(
                    "syntax error at or near \"{}\"",
                    sql.trim()
                )))
            })
        }
    }

    #[async_trait]
    impl StatementExecutor for FakeSession {
        async fn inspect(&mut self, sql: &str) -> Result<StatementKind, DbError> {
            Ok(match self.lookup(sql)? {
                Scripted::Rows(rows) => StatementKind::Query {
                    columns: rows.first().map_or(1, |r| r.values().len()),
                },
                Scripted::Command(_) => StatementKind::Command,
            })
        }

        async fn fetch_all(&mut self, sql: &str) -> Result<Vec<ResultRow>, DbError> {
            self.journal.lock().unwrap().executed.push(sql.trim().to_string());
            match self.lookup(sql)? {
                Scripted::Rows(rows) => Ok(rows),
                Scripted::Command(_) => unreachable!("fetch_all called on a command"),
            }
        }

        async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
            self.journal.lock().unwrap().executed.push(sql.trim().to_string());
            match self.lookup(sql)? {
                Scripted::Command(n) => Ok(n),
                Scripted::Rows(_) => unreachable!("execute called on a query"),
            }
        }

        async fn close(self) -> Result<(), DbError> {
            self.journal.lock().unwrap().closed = true;
            if self.fail_close {
                return Err(DbError::CloseError(sqlx::Error::PoolClosed));
            }
            Ok(())
        }
    }

    fn one(value: i64) -> Scripted {
        Scripted::Rows(vec![ResultRow(vec![SqlValue::Int(value)])])
    }

    fn settings_for(dir: &Path, queries: &str) -> RunnerSettings {
        let queries_file = dir.join("queries.txt");
        std::fs::write(&queries_file, queries).unwrap();
        RunnerSettings {
            queries_file,
            output_dir: dir.to_path_buf(),
            ..RunnerSettings::default()
        }
    }

    fn result_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("result_query_"))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn blank_fragments_produce_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), " ;\n ;\t;");
        let (session, journal) = FakeSession::new(&[]);

        let mut lines = Vec::new();
        let report = run_with_session(session, &settings, |o| lines.push(o.to_string()))
            .await
            .unwrap();

        assert!(report.outcomes.is_empty());
        assert!(lines.is_empty());
        assert!(result_files(dir.path()).is_empty());
        assert!(journal.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn single_select_writes_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), "SELECT 1;");
        let (session, _) = FakeSession::new(&[("SELECT 1", one(1))]);

        let mut lines = Vec::new();
        run_with_session(session, &settings, |o| lines.push(o.to_string()))
            .await
            .unwrap();

        let path = dir.path().join("result_query_1.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "(1,)\n");
        assert_eq!(
            lines,
            vec![format!("Query 1 executed and result saved to {}", path.display())]
        );
    }

    #[tokio::test]
    async fn numbering_keeps_gaps_for_blank_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), "SELECT 1; ; SELECT 2;");
        let (session, journal) = FakeSession::new(&[("SELECT 1", one(1)), ("SELECT 2", one(2))]);

        let report = run_with_session(session, &settings, |_| {}).await.unwrap();

        assert_eq!(
            result_files(dir.path()),
            vec!["result_query_1.txt", "result_query_3.txt"]
        );
        let indexes: Vec<usize> = report.outcomes.iter().map(StatementOutcome::index).collect();
        assert_eq!(indexes, vec![1, 3]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("result_query_3.txt")).unwrap(),
            "(2,)\n"
        );
        assert_eq!(journal.lock().unwrap().executed, vec!["SELECT 1", "SELECT 2"]);
    }

    #[tokio::test]
    async fn naive_split_breaks_quoted_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), "SELECT 'a;b'; SELECT 2;");
        // Neither `SELECT 'a` nor `b'` parses.
        let (session, journal) = FakeSession::new(&[("SELECT 2", one(2))]);

        let err = run_with_session(session, &settings, |_| {}).await.unwrap_err();

        assert!(matches!(err, RunError::Execution { index: 1, .. }));
        assert!(err.to_string().starts_with("Query 1 failed: "));
        assert!(result_files(dir.path()).is_empty());
        let journal = journal.lock().unwrap();
        assert!(journal.executed.is_empty());
        assert!(journal.closed);
    }

    #[tokio::test]
    async fn sql_aware_split_keeps_quoted_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), "SELECT 'a;b';");
        settings.split_mode = SplitMode::SqlAware;
        let (session, _) = FakeSession::new(&[(
            "SELECT 'a;b'",
            Scripted::Rows(vec![ResultRow(vec![SqlValue::Text("a;b".into())])]),
        )]);

        run_with_session(session, &settings, |_| {}).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("result_query_1.txt")).unwrap(),
            "('a;b',)\n"
        );
    }

    #[tokio::test]
    async fn strict_mode_aborts_on_command_without_running_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(
            dir.path(),
            "SELECT 1; UPDATE t SET x = 1; SELECT 3;",
        );
        settings.fetch_mode = FetchMode::Strict;
        let (session, journal) = FakeSession::new(&[
            ("SELECT 1", one(1)),
            ("UPDATE t SET x = 1", Scripted::Command(4)),
            ("SELECT 3", one(3)),
        ]);

        let err = run_with_session(session, &settings, |_| {}).await.unwrap_err();

        assert!(matches!(err, RunError::NoResultSet { index: 2 }));
        assert_eq!(err.to_string(), "Query 2 returned no result set to fetch");
        let journal = journal.lock().unwrap();
        assert_eq!(journal.executed, vec!["SELECT 1"]);
        assert!(journal.closed);
        assert_eq!(result_files(dir.path()), vec!["result_query_1.txt"]);
    }

    #[tokio::test]
    async fn inspect_mode_executes_commands_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), "UPDATE t SET x = 1; SELECT 2;");
        let (session, journal) = FakeSession::new(&[
            ("UPDATE t SET x = 1", Scripted::Command(4)),
            ("SELECT 2", one(2)),
        ]);

        let mut lines = Vec::new();
        let report = run_with_session(session, &settings, |o| lines.push(o.to_string()))
            .await
            .unwrap();

        assert_eq!(
            report.outcomes[0],
            StatementOutcome::Command {
                index: 1,
                rows_affected: 4
            }
        );
        assert_eq!(lines[0], "Query 1 executed (4 rows affected)");
        assert_eq!(result_files(dir.path()), vec!["result_query_2.txt"]);
        assert_eq!(
            journal.lock().unwrap().executed,
            vec!["UPDATE t SET x = 1", "SELECT 2"]
        );
    }

    #[tokio::test]
    async fn missing_queries_file_is_a_read_error_and_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RunnerSettings {
            queries_file: dir.path().join("absent.txt"),
            output_dir: dir.path().to_path_buf(),
            ..RunnerSettings::default()
        };
        let (session, journal) = FakeSession::new(&[]);

        let err = run_with_session(session, &settings, |_| {}).await.unwrap_err();

        assert!(matches!(err, RunError::Read { .. }));
        assert!(journal.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn unwritable_output_dir_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), "SELECT 1; SELECT 2;");
        settings.output_dir = dir.path().join("missing");
        let (session, journal) = FakeSession::new(&[("SELECT 1", one(1)), ("SELECT 2", one(2))]);

        let err = run_with_session(session, &settings, |_| {}).await.unwrap_err();

        assert!(matches!(err, RunError::Write { .. }));
        assert_eq!(journal.lock().unwrap().executed, vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn output_dir_is_created_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), "SELECT 1;");
        settings.output_dir = dir.path().join("nested").join("out");
        settings.create_output_dir = true;
        let (session, _) = FakeSession::new(&[("SELECT 1", one(1))]);

        run_with_session(session, &settings, |_| {}).await.unwrap();

        assert!(settings.output_dir.join("result_query_1.txt").exists());
    }

    #[tokio::test]
    async fn close_failure_after_success_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), "SELECT 1;");
        let (mut session, _) = FakeSession::new(&[("SELECT 1", one(1))]);
        session.fail_close = true;

        let err = run_with_session(session, &settings, |_| {}).await.unwrap_err();

        assert!(matches!(err, RunError::Connection(DbError::CloseError(_))));
    }

    #[tokio::test]
    async fn batch_error_wins_over_close_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), "SELECT nope;");
        let (mut session, _) = FakeSession::new(&[]);
        session.fail_close = true;

        let err = run_with_session(session, &settings, |_| {}).await.unwrap_err();

        assert!(matches!(err, RunError::Execution { index: 1, .. }));
    }
}
