use anyhow::Context;
use clap::Parser;
use comfy_table::Table;
use configuration::{FetchMode, RunnerSettings, SplitMode};
use runner::{RunError, RunReport, StatementOutcome};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// The main entry point for the batch query runner.
#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = match init_tracing(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match handle_run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Batch run failed.");
            println!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Runs the `;`-separated SQL statements of a file against PostgreSQL and
/// saves the rows of each statement to `result_query_<N>.txt`.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The file holding the statements (default: /home/queries.txt).
    queries_file: Option<PathBuf>,

    /// Directory the result files are written to (default: /home).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// How the file is cut into statements.
    #[arg(long, value_enum)]
    split_mode: Option<SplitMode>,

    /// What to do with statements that return no rows.
    #[arg(long, value_enum)]
    fetch_mode: Option<FetchMode>,

    /// Create the output directory if it does not exist.
    #[arg(long)]
    create_output_dir: bool,

    /// A TOML settings file (default: ./runner.toml, if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a table of the executed statements at the end.
    #[arg(long)]
    summary: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags take precedence over every other settings source.
    fn apply_overrides(&self, settings: &mut RunnerSettings) {
        if let Some(path) = &self.queries_file {
            settings.queries_file = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(mode) = self.split_mode {
            settings.split_mode = mode;
        }
        if let Some(mode) = self.fetch_mode {
            settings.fetch_mode = mode;
        }
        if self.create_output_dir {
            settings.create_output_dir = true;
        }
    }
}

// ==============================================================================
// Logging
// ==============================================================================

/// Installs the global subscriber. Verbosity comes from `RUST_LOG` and
/// defaults to `warn` so stdout only carries the status lines.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
            Ok(None)
        }
    }
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

/// Loads the configuration, runs the batch and prints one line per statement.
async fn handle_run(cli: &Cli) -> Result<(), RunError> {
    // Load environment variables from the .env file, if any.
    if let Some(path) = configuration::load_env_file()? {
        tracing::debug!(path = %path.display(), "Loaded .env file.");
    }

    let connection = configuration::load_connection_config()?;
    let mut settings = configuration::load_runner_settings(cli.config.as_deref())?;
    cli.apply_overrides(&mut settings);
    tracing::info!(?connection, ?settings, "Starting batch run.");

    let report = runner::run(&settings, &connection, |outcome| println!("{outcome}")).await?;

    if cli.summary {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let mut table = Table::new();
    table.set_header(vec!["Query", "Kind", "Rows", "Result file"]);

    for outcome in &report.outcomes {
        match outcome {
            StatementOutcome::Rows {
                index,
                path,
                row_count,
            } => table.add_row(vec![
                index.to_string(),
                "rows".to_string(),
                row_count.to_string(),
                path.display().to_string(),
            ]),
            StatementOutcome::Command {
                index,
                rows_affected,
            } => table.add_row(vec![
                index.to_string(),
                "command".to_string(),
                rows_affected.to_string(),
                "-".to_string(),
            ]),
        };
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_loaded_settings() {
        let cli = Cli::parse_from([
            "batch-runner",
            "/data/batch.sql",
            "--output-dir",
            "/data/out",
            "--split-mode",
            "sql-aware",
            "--fetch-mode",
            "strict",
            "--create-output-dir",
        ]);
        let mut settings = RunnerSettings::default();
        cli.apply_overrides(&mut settings);

        assert_eq!(settings.queries_file, PathBuf::from("/data/batch.sql"));
        assert_eq!(settings.output_dir, PathBuf::from("/data/out"));
        assert_eq!(settings.split_mode, SplitMode::SqlAware);
        assert_eq!(settings.fetch_mode, FetchMode::Strict);
        assert!(settings.create_output_dir);
    }

    #[test]
    fn absent_flags_leave_settings_untouched() {
        let cli = Cli::parse_from(["batch-runner"]);
        let mut settings = RunnerSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings, RunnerSettings::default());
    }
}
