use crate::error::DbError;
use configuration::ConnectionConfig;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

/// Translates the connection parameters into driver options.
///
/// Unset name/user/password fall through to the driver defaults
/// (`PGDATABASE`, `PGUSER`, ... or the current OS user).
pub fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port);

    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(name) = &config.name {
        options = options.database(name);
    }

    options
}

/// Opens a single, dedicated connection to the PostgreSQL database.
///
/// A batch runs statement by statement over this one connection. The caller
/// owns it and must close it.
pub async fn connect(config: &ConnectionConfig) -> Result<PgConnection, DbError> {
    tracing::debug!(?config, "Connecting to PostgreSQL.");

    let conn = PgConnection::connect_with(&connect_options(config))
        .await
        .map_err(DbError::ConnectionError)?;

    tracing::info!(host = %config.host, port = config.port, "Database connection established.");
    Ok(conn)
}
