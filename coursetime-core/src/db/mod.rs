//! Database layer: SQLite storage for sessions, heartbeats, and aggregates

pub mod repo;
pub mod schema;

pub use repo::Database;
