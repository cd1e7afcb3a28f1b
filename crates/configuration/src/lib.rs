use crate::error::ConfigError;
use std::path::{Path, PathBuf};

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{ConnectionConfig, FetchMode, RunnerSettings, SplitMode};

/// Prefix of the environment variables holding the connection parameters.
pub const DB_ENV_PREFIX: &str = "DB";
/// Prefix of the environment variables overriding runner settings.
pub const RUNNER_ENV_PREFIX: &str = "RUNNER";
/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "runner.toml";

/// Populates the process environment from a `.env` file, if there is one.
///
/// Returns the path of the file that was loaded. A missing file is not an
/// error; a file that exists but cannot be parsed is.
pub fn load_env_file() -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Loads the connection parameters from the `DB_*` environment variables.
pub fn load_connection_config() -> Result<ConnectionConfig, ConfigError> {
    connection_config_from(config::Environment::with_prefix(DB_ENV_PREFIX))
}

/// Builds a [`ConnectionConfig`] from an explicit environment source, applying
/// the `localhost:5432` defaults.
pub fn connection_config_from(
    env: config::Environment,
) -> Result<ConnectionConfig, ConfigError> {
    let builder = config::Config::builder()
        .set_default("host", settings::DEFAULT_HOST)?
        .set_default("port", i64::from(settings::DEFAULT_PORT))?
        .add_source(env)
        .build()?;

    let config = builder.try_deserialize::<ConnectionConfig>()?;
    if config.host.trim().is_empty() {
        return Err(ConfigError::ValidationError("DB_HOST must not be empty".to_string()));
    }

    Ok(config)
}

/// Loads the runner settings.
///
/// Sources are layered, later ones win: built-in defaults, the settings file
/// (`config_file`, or `runner.toml` if present), then `RUNNER_*` variables.
/// Command-line overrides are applied by the caller.
pub fn load_runner_settings(config_file: Option<&Path>) -> Result<RunnerSettings, ConfigError> {
    runner_settings_from(config_file, config::Environment::with_prefix(RUNNER_ENV_PREFIX))
}

pub fn runner_settings_from(
    config_file: Option<&Path>,
    env: config::Environment,
) -> Result<RunnerSettings, ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("queries_file", settings::DEFAULT_QUERIES_FILE)?
        .set_default("output_dir", settings::DEFAULT_OUTPUT_DIR)?
        .set_default("split_mode", "naive")?
        .set_default("fetch_mode", "inspect")?
        .set_default("create_output_dir", false)?;

    builder = match config_file {
        // An explicitly named file must exist.
        Some(path) => builder.add_source(config::File::from(path).required(true)),
        None => builder.add_source(config::File::with_name(DEFAULT_SETTINGS_FILE).required(false)),
    };

    let settings = builder
        .add_source(env)
        .build()?
        .try_deserialize::<RunnerSettings>()?;

    tracing::debug!(?settings, "Runner settings loaded.");
    Ok(settings)
}
