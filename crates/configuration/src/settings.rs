use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_QUERIES_FILE: &str = "/home/queries.txt";
pub const DEFAULT_OUTPUT_DIR: &str = "/home";

/// Parameters used to open the single database connection for a run.
///
/// Deserialized from the `DB_*` environment variables. `name`, `user` and
/// `password` stay optional so the driver's own defaults apply when unset.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: None,
            user: None,
            password: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// How the queries file is cut into statements.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum SplitMode {
    /// Split on every `;`, quoting and comments are ignored.
    #[default]
    Naive,
    /// Split on `;` only outside string literals, quoted identifiers,
    /// dollar-quoted bodies and comments.
    SqlAware,
}

/// What to do with a statement that has no result set (INSERT, UPDATE, DDL...).
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// Execute it and move on without writing a result file.
    #[default]
    Inspect,
    /// Treat it as a fatal error, as if rows had been fetched from it.
    Strict,
}

/// Everything the batch loop needs besides the connection parameters.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RunnerSettings {
    /// The file holding the `;`-separated statements.
    pub queries_file: PathBuf,
    /// Where `result_query_<N>.txt` files are written.
    pub output_dir: PathBuf,
    #[serde(default)]
    pub split_mode: SplitMode,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    /// Create `output_dir` (and parents) before the first write.
    #[serde(default)]
    pub create_output_dir: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            queries_file: PathBuf::from(DEFAULT_QUERIES_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            split_mode: SplitMode::default(),
            fetch_mode: FetchMode::default(),
            create_output_dir: false,
        }
    }
}
