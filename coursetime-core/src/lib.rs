//! Core library for coursetime, a learning-time analytics engine.
//!
//! Tracks learning sessions (start, heartbeat, end), attributes focused
//! active time to daily per-unit aggregate buckets, and serves the read-side
//! reports built on those buckets.
//!
//! Architecture:
//! - Canonical input: sessions and heartbeats, append-mostly
//! - Derived: daily time buckets, incremented atomically, never decremented
//! - Collaborators: course catalog and enrollment progress, behind traits

pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod logging;
pub mod types;

pub use analytics::{AggregateOutcome, Aggregator, ReconcileReport};
pub use catalog::{Catalog, CompletionStats, Enrollment, EnrollmentSource, StaticCatalog};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use lifecycle::SessionTracker;
pub use types::{
    BucketKey, BucketNames, Heartbeat, ReportFilter, Session, TimeBucket, TrackReply, UnitKind,
    UnitPath, ACTIVE_TIME_CAP_SECS,
};
