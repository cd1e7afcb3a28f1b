//! # Database Crate
//!
//! The PostgreSQL side of the batch runner. It opens the single connection a
//! run uses, inspects each statement before running it, and decodes result
//! rows into dynamically typed values with a stable textual rendering.
//!
//! ## Public API
//!
//! - `connect` / `connect_options`: open the dedicated connection from a `ConnectionConfig`.
//! - `StatementExecutor`: the session operations the runner is written against.
//! - `PgSession`: the PostgreSQL implementation of `StatementExecutor`.
//! - `ResultRow` / `SqlValue`: decoded rows and their tuple-style `Display`.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod session;
pub mod value;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, connect_options};
pub use error::DbError;
pub use session::{PgSession, StatementExecutor, StatementKind};
pub use value::{ResultRow, SqlValue};
