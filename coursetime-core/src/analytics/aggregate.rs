//! Aggregation engine: merges closed sessions into daily time buckets

use crate::catalog::Catalog;
use crate::db::Database;
use crate::error::Result;
use crate::types::{BucketNames, Session};
use chrono::Utc;

/// What happened when a session was offered to the aggregate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// The session's contribution was merged into its bucket
    Applied,
    /// The session is still open; nothing to merge yet
    SkippedOpen,
    /// The session was already merged earlier (aggregated_at set)
    SkippedAlreadyAggregated,
}

/// Merges closed sessions into the aggregate store.
///
/// The merge itself is a single atomic upsert (see
/// [`Database::apply_bucket_increment`]); this type adds the dedupe guard and
/// the write-time display-name resolution on top.
pub struct Aggregator<'a> {
    db: &'a Database,
    catalog: &'a dyn Catalog,
}

impl<'a> Aggregator<'a> {
    pub fn new(db: &'a Database, catalog: &'a dyn Catalog) -> Self {
        Self { db, catalog }
    }

    /// Merge one session into its daily bucket.
    ///
    /// Open sessions are skipped. Before touching the bucket, the session's
    /// `aggregated_at` stamp is claimed atomically; only the claim winner
    /// increments, so concurrent callers holding stale snapshots of the same
    /// session (a retried end, the reconciliation batch) cannot double count.
    /// Zero-active-time sessions still count toward sessions_count.
    pub fn apply(&self, session: &Session) -> Result<AggregateOutcome> {
        if !session.is_closed() {
            tracing::debug!(session_id = %session.session_id, "Skipping open session");
            return Ok(AggregateOutcome::SkippedOpen);
        }

        if session.aggregated_at.is_some() {
            tracing::debug!(
                session_id = %session.session_id,
                "Session already aggregated, skipping"
            );
            return Ok(AggregateOutcome::SkippedAlreadyAggregated);
        }

        if !self.db.claim_aggregation(&session.session_id, Utc::now())? {
            tracing::debug!(
                session_id = %session.session_id,
                "Lost aggregation claim, skipping"
            );
            return Ok(AggregateOutcome::SkippedAlreadyAggregated);
        }

        let key = session.bucket_key();
        let names = self.resolve_names(session);

        self.db
            .apply_bucket_increment(&key, &names, session.active_time)?;

        tracing::info!(
            session_id = %session.session_id,
            member = %key.member,
            course = %key.course,
            date = %key.date,
            active_time = session.active_time,
            "Session aggregated"
        );

        Ok(AggregateOutcome::Applied)
    }

    /// Display names snapshotted onto the bucket at write time.
    fn resolve_names(&self, session: &Session) -> BucketNames {
        BucketNames {
            member_name: self.catalog.member_name(&session.member),
            course_name: self.catalog.course_title(&session.course),
            chapter_name: session
                .chapter
                .as_deref()
                .and_then(|c| self.catalog.chapter_title(c)),
            lesson_name: session
                .lesson
                .as_deref()
                .and_then(|l| self.catalog.lesson_title(l)),
        }
    }
}
