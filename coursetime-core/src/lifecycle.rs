//! Session lifecycle controller: start, heartbeat, end
//!
//! `start` propagates errors to the caller; `heartbeat` and `end` never do.
//! Clients fire those on timers and page unloads where a transport error and
//! an application error look the same, so both are reported through the
//! structured [`TrackReply`] payload and logged server-side.

use crate::analytics::aggregate::Aggregator;
use crate::catalog::Catalog;
use crate::config::TrackingConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{Heartbeat, Session, TrackReply, UnitKind, ACTIVE_TIME_CAP_SECS};
use chrono::Utc;
use uuid::Uuid;

/// Length of the opaque session token handed to clients.
const SESSION_ID_LEN: usize = 16;

/// Drives the session lifecycle against the store and catalog.
pub struct SessionTracker<'a> {
    db: &'a Database,
    catalog: &'a dyn Catalog,
    active_time_cap_secs: i64,
    default_end_reason: String,
}

impl<'a> SessionTracker<'a> {
    pub fn new(db: &'a Database, catalog: &'a dyn Catalog) -> Self {
        Self {
            db,
            catalog,
            active_time_cap_secs: ACTIVE_TIME_CAP_SECS,
            default_end_reason: "navigate".to_string(),
        }
    }

    pub fn from_config(db: &'a Database, catalog: &'a dyn Catalog, config: &TrackingConfig) -> Self {
        Self {
            db,
            catalog,
            active_time_cap_secs: config.active_time_cap_secs,
            default_end_reason: config.default_end_reason.clone(),
        }
    }

    /// Start a session for the given unit, returning the opaque session token.
    ///
    /// The unit is resolved through the catalog: a lesson pins its chapter and
    /// course, a chapter pins its course. A resolved course that contradicts
    /// `course_id` is a validation error (stale client state).
    pub fn start(
        &self,
        course_id: &str,
        unit_kind: UnitKind,
        unit_id: &str,
        actor: &str,
    ) -> Result<String> {
        let path = self.catalog.resolve_unit(unit_kind, unit_id)?;

        if path.course != course_id {
            return Err(Error::Validation(format!(
                "{} {} belongs to course {}, not {}",
                unit_kind, unit_id, path.course, course_id
            )));
        }

        let session_id: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SESSION_ID_LEN)
            .collect();

        let session = Session {
            session_id: session_id.clone(),
            member: actor.to_string(),
            course: path.course,
            chapter: path.chapter,
            lesson: path.lesson,
            start_time: Utc::now(),
            end_time: None,
            active_time: 0,
            end_reason: None,
            aggregated_at: None,
        };

        self.db.insert_session(&session)?;

        tracing::info!(
            session_id = %session_id,
            member = %actor,
            course = %session.course,
            unit_kind = %unit_kind,
            unit_id = %unit_id,
            "Session started"
        );

        Ok(session_id)
    }

    /// Record a focus/visibility ping for an open session.
    pub fn heartbeat(
        &self,
        session_id: &str,
        is_focused: bool,
        is_visible: bool,
        idle_ms: i64,
        actor: &str,
    ) -> TrackReply {
        match self.heartbeat_inner(session_id, is_focused, is_visible, idle_ms, actor) {
            Ok(()) => TrackReply::Success,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Heartbeat failed");
                TrackReply::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn heartbeat_inner(
        &self,
        session_id: &str,
        is_focused: bool,
        is_visible: bool,
        idle_ms: i64,
        actor: &str,
    ) -> Result<()> {
        let session = self
            .db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let hb = Heartbeat {
            session_id: session_id.to_string(),
            member: actor.to_string(),
            course: session.course.clone(),
            unit_kind: session.unit_kind(),
            unit_id: session.unit_id().to_string(),
            timestamp: Utc::now(),
            is_focused,
            is_visible,
            idle_ms,
        };

        self.db.insert_heartbeat(&hb)
    }

    /// Close a session: compute active time, persist, and aggregate.
    ///
    /// Closing an already-closed session is a success no-op, so client retries
    /// after a timeout cannot double count.
    pub fn end(&self, session_id: &str, end_reason: Option<&str>, actor: &str) -> TrackReply {
        match self.end_inner(session_id, end_reason, actor) {
            Ok(()) => TrackReply::Success,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Session end failed");
                TrackReply::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn end_inner(&self, session_id: &str, end_reason: Option<&str>, actor: &str) -> Result<()> {
        let session = self
            .db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if session.is_closed() {
            tracing::debug!(session_id = %session_id, "Session already closed, ignoring end");
            return Ok(());
        }

        let end_time = Utc::now();
        let reason = end_reason.unwrap_or(&self.default_end_reason);

        // Active time runs from the first focused+visible ping to the end;
        // no qualifying ping means none is attributed.
        let active_time = match self.db.first_engaged_heartbeat(session_id)? {
            Some(anchor) => {
                let elapsed = (end_time - anchor).num_seconds().max(0);
                elapsed.min(self.active_time_cap_secs)
            }
            None => 0,
        };

        // Two ends can race past the is_closed check; only the caller whose
        // close landed may aggregate, the loser leaves the winner's numbers.
        if !self
            .db
            .close_session(session_id, end_time, reason, active_time)?
        {
            tracing::debug!(session_id = %session_id, "Session closed concurrently, ignoring end");
            return Ok(());
        }

        tracing::info!(
            session_id = %session_id,
            member = %actor,
            end_reason = %reason,
            active_time,
            "Session ended"
        );

        let closed = self
            .db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        Aggregator::new(self.db, self.catalog).apply(&closed)?;

        Ok(())
    }
}
