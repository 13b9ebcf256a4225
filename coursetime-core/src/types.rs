//! Core domain types for coursetime
//!
//! These types model the learning-activity pipeline:
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One continuous learning interaction, bounded by explicit start/end calls |
//! | **Heartbeat** | A periodic focus/visibility ping from a client during a session |
//! | **Bucket** | An aggregate row keyed by (member, course, chapter, lesson, date) |
//! | **Active time** | Seconds attributed to focused+visible engagement, capped per session |
//! | **Unit** | The thing being studied: a course, a chapter, or a lesson |
//!
//! Sessions and heartbeats are canonical input; buckets are derived and only
//! ever incremented. Display names on buckets are resolved once at write time
//! and are allowed to go stale if the catalog renames something later.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-session ceiling on attributed active time, in seconds.
///
/// A deliberate anti-outlier clamp (2 hours), not a precise engagement measure.
pub const ACTIVE_TIME_CAP_SECS: i64 = 7200;

// ============================================
// Learning units
// ============================================

/// The kind of catalog unit a session or heartbeat is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Course,
    Chapter,
    Lesson,
}

impl UnitKind {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Course => "course",
            UnitKind::Chapter => "chapter",
            UnitKind::Lesson => "lesson",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(UnitKind::Course),
            "chapter" => Ok(UnitKind::Chapter),
            "lesson" => Ok(UnitKind::Lesson),
            _ => Err(format!("unknown unit kind: {}", s)),
        }
    }
}

/// A unit resolved to its owning chapter and course.
///
/// Resolution goes leaf-to-root: a lesson carries its chapter and course, a
/// chapter carries its course, a course stands alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPath {
    /// Owning course id
    pub course: String,
    /// Owning chapter id, when the unit is a chapter or lesson
    pub chapter: Option<String>,
    /// Lesson id, when the unit is a lesson
    pub lesson: Option<String>,
}

impl UnitPath {
    /// Path for a bare course.
    pub fn course(course: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            chapter: None,
            lesson: None,
        }
    }
}

// ============================================
// Session
// ============================================

/// One learning session: who studied what, and for how long.
///
/// Created at session start with `active_time = 0`, mutated exactly once at
/// close (end_time, end_reason, active_time), immutable afterward.
/// `aggregated_at` records when the session's contribution landed in the
/// aggregate store; it is the dedupe guard between live aggregation and the
/// daily reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, externally visible session token
    pub session_id: String,
    /// Learner user id
    pub member: String,
    /// Course being studied
    pub course: String,
    /// Chapter, when the session targets a chapter or lesson
    pub chapter: Option<String>,
    /// Lesson, when the session targets a lesson
    pub lesson: Option<String>,
    /// When the session started
    pub start_time: DateTime<Utc>,
    /// When the session ended (None while open)
    pub end_time: Option<DateTime<Utc>>,
    /// Engaged seconds computed at close, capped at [`ACTIVE_TIME_CAP_SECS`]
    pub active_time: i64,
    /// Client-reported reason the session ended ("navigate", "timeout", ...)
    pub end_reason: Option<String>,
    /// When this session was merged into the aggregate store
    pub aggregated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// The narrowest unit this session is attached to.
    pub fn unit_kind(&self) -> UnitKind {
        if self.lesson.is_some() {
            UnitKind::Lesson
        } else if self.chapter.is_some() {
            UnitKind::Chapter
        } else {
            UnitKind::Course
        }
    }

    /// Identifier of the narrowest unit.
    pub fn unit_id(&self) -> &str {
        self.lesson
            .as_deref()
            .or(self.chapter.as_deref())
            .unwrap_or(&self.course)
    }

    /// The aggregate bucket this session contributes to.
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey {
            member: self.member.clone(),
            course: self.course.clone(),
            chapter: self.chapter.clone().unwrap_or_default(),
            lesson: self.lesson.clone().unwrap_or_default(),
            date: self.start_time.date_naive(),
        }
    }
}

// ============================================
// Heartbeat
// ============================================

/// A periodic focus/visibility ping tied to a session.
///
/// Append-only; never updated or deleted. The session_id is a reference,
/// not ownership: heartbeats outlive whatever happens to the session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Session this ping belongs to
    pub session_id: String,
    /// Learner user id
    pub member: String,
    /// Course the session targets
    pub course: String,
    /// Kind of the narrowest unit the session targets
    pub unit_kind: UnitKind,
    /// Id of that unit
    pub unit_id: String,
    /// When the ping was received
    pub timestamp: DateTime<Utc>,
    /// Whether the learning tab/window had input focus
    pub is_focused: bool,
    /// Whether the learning tab/window was visible
    pub is_visible: bool,
    /// Client-measured idle milliseconds since last input
    pub idle_ms: i64,
}

// ============================================
// Aggregate buckets
// ============================================

/// Key of an aggregate row: (member, course, chapter-or-empty,
/// lesson-or-empty, calendar date of session start).
///
/// Absent chapter/lesson are stored as empty strings so the SQL UNIQUE
/// constraint can cover all five columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub member: String,
    pub course: String,
    pub chapter: String,
    pub lesson: String,
    pub date: NaiveDate,
}

/// Denormalized display names stored on a bucket at write time.
///
/// Stale-by-design: not maintained if the catalog renames the source later.
#[derive(Debug, Clone, Default)]
pub struct BucketNames {
    pub member_name: Option<String>,
    pub course_name: Option<String>,
    pub chapter_name: Option<String>,
    pub lesson_name: Option<String>,
}

/// One aggregate row: cumulative active time and session count for a key.
#[derive(Debug, Clone, Serialize)]
pub struct TimeBucket {
    pub member: String,
    pub member_name: Option<String>,
    pub course: String,
    pub course_name: Option<String>,
    pub chapter: String,
    pub chapter_name: Option<String>,
    pub lesson: String,
    pub lesson_name: Option<String>,
    pub date: NaiveDate,
    /// Cumulative engaged seconds
    pub active_time: i64,
    /// Cumulative closed-session count
    pub sessions_count: i64,
}

// ============================================
// Lifecycle replies and report filters
// ============================================

/// Structured reply for heartbeat and session-end calls.
///
/// These operations never propagate internal failures to the caller; they log
/// and report through this payload, so retrying clients check `status` rather
/// than relying on transport-level errors.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TrackReply {
    Success,
    Error { message: String },
}

impl TrackReply {
    pub fn is_success(&self) -> bool {
        matches!(self, TrackReply::Success)
    }
}

/// Optional filters for the read-side report queries.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Restrict to a single learner
    pub student: Option<String>,
    /// Restrict to a single course
    pub course: Option<String>,
    /// Restrict to a set of courses (permission narrowing for course creators)
    pub course_in: Option<Vec<String>>,
    /// Inclusive lower date bound
    pub from_date: Option<NaiveDate>,
    /// Inclusive upper date bound
    pub to_date: Option<NaiveDate>,
}

impl ReportFilter {
    /// Filter for one student across all courses.
    pub fn for_student(student: impl Into<String>) -> Self {
        Self {
            student: Some(student.into()),
            ..Default::default()
        }
    }

    /// Filter for one course across all students.
    pub fn for_course(course: impl Into<String>) -> Self {
        Self {
            course: Some(course.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(chapter: Option<&str>, lesson: Option<&str>) -> Session {
        Session {
            session_id: "abcd1234abcd1234".to_string(),
            member: "jane@example.com".to_string(),
            course: "rust-101".to_string(),
            chapter: chapter.map(String::from),
            lesson: lesson.map(String::from),
            start_time: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
            end_time: None,
            active_time: 0,
            end_reason: None,
            aggregated_at: None,
        }
    }

    #[test]
    fn test_unit_kind_round_trip() {
        for kind in [UnitKind::Course, UnitKind::Chapter, UnitKind::Lesson] {
            assert_eq!(kind.as_str().parse::<UnitKind>().unwrap(), kind);
        }
        assert!("module".parse::<UnitKind>().is_err());
    }

    #[test]
    fn test_session_narrowest_unit() {
        let s = session(Some("ch-1"), Some("ls-1"));
        assert_eq!(s.unit_kind(), UnitKind::Lesson);
        assert_eq!(s.unit_id(), "ls-1");

        let s = session(Some("ch-1"), None);
        assert_eq!(s.unit_kind(), UnitKind::Chapter);
        assert_eq!(s.unit_id(), "ch-1");

        let s = session(None, None);
        assert_eq!(s.unit_kind(), UnitKind::Course);
        assert_eq!(s.unit_id(), "rust-101");
    }

    #[test]
    fn test_bucket_key_uses_start_date_and_empty_strings() {
        let key = session(None, None).bucket_key();
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(key.chapter, "");
        assert_eq!(key.lesson, "");
    }

    #[test]
    fn test_track_reply_serialization() {
        let ok = serde_json::to_value(TrackReply::Success).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "success"}));

        let err = serde_json::to_value(TrackReply::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(
            err,
            serde_json::json!({"status": "error", "message": "boom"})
        );
    }
}
