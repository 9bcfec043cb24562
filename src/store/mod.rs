//! Persistence layer — libSQL-backed task definitions.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlTaskStore;
pub use traits::TaskStore;
