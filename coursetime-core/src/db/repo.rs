//! Database repository layer
//!
//! Provides insert, update, and rollup queries for sessions, heartbeats, and
//! aggregate time buckets.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

const DATE_FMT: &str = "%Y-%m-%d";

fn parse_dt(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Per-unit rollup within a course: one row per (chapter, lesson) pair.
#[derive(Debug, Clone)]
pub struct UnitRollup {
    pub chapter: String,
    pub chapter_name: Option<String>,
    pub lesson: String,
    pub lesson_name: Option<String>,
    pub total_active_time: i64,
    pub total_sessions: i64,
    /// Most recent bucket date for the unit
    pub last_access: NaiveDate,
}

/// Per-student rollup within a course.
#[derive(Debug, Clone)]
pub struct StudentRollup {
    pub member: String,
    pub member_name: Option<String>,
    pub total_active_time: i64,
    pub total_sessions: i64,
    pub days_active: i64,
}

/// Per-day rollup across the matching buckets.
#[derive(Debug, Clone)]
pub struct DailyRollup {
    pub date: NaiveDate,
    pub total_active_time: i64,
    pub total_sessions: i64,
    pub distinct_students: i64,
}

/// Per-course rollup for one member.
#[derive(Debug, Clone)]
pub struct MemberCourseRollup {
    pub course: String,
    pub course_name: Option<String>,
    pub total_active_time: i64,
    pub total_sessions: i64,
    pub days_active: i64,
    pub first_access: NaiveDate,
    pub last_access: NaiveDate,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Session operations
    // ============================================

    /// Insert a newly started session
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sessions (session_id, member, course, chapter, lesson,
                                  start_time, end_time, active_time, end_reason, aggregated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                session.session_id,
                session.member,
                session.course,
                session.chapter,
                session.lesson,
                session.start_time.to_rfc3339(),
                session.end_time.map(|t| t.to_rfc3339()),
                session.active_time,
                session.end_reason,
                session.aggregated_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get a session by its token
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM sessions WHERE session_id = ?",
            [session_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Close an open session, recording end time, reason, and computed active time.
    ///
    /// The WHERE guard makes the close idempotent: a session that already has
    /// an end_time is left untouched and 0 rows are reported.
    pub fn close_session(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
        end_reason: &str,
        active_time: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"
            UPDATE sessions
            SET end_time = ?2, end_reason = ?3, active_time = ?4
            WHERE session_id = ?1 AND end_time IS NULL
            "#,
            params![session_id, end_time.to_rfc3339(), end_reason, active_time],
        )?;
        Ok(updated > 0)
    }

    /// Claim the right to aggregate a session.
    ///
    /// The `aggregated_at IS NULL` guard elects exactly one winner per
    /// session across concurrent callers (live end vs. retries vs. the
    /// reconciliation batch). Returns whether this caller won the claim.
    pub fn claim_aggregation(&self, session_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET aggregated_at = ?2 WHERE session_id = ?1 AND aggregated_at IS NULL",
            params![session_id, at.to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    /// Closed sessions whose end_time falls in `[from, to)`
    pub fn sessions_ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM sessions
            WHERE end_time IS NOT NULL AND end_time >= ?1 AND end_time < ?2
            ORDER BY end_time
            "#,
        )?;

        let sessions = stmt
            .query_map(
                params![from.to_rfc3339(), to.to_rfc3339()],
                Self::row_to_session,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
        let start_time_str: String = row.get("start_time")?;
        let end_time_str: Option<String> = row.get("end_time")?;
        let aggregated_str: Option<String> = row.get("aggregated_at")?;

        Ok(Session {
            session_id: row.get("session_id")?,
            member: row.get("member")?,
            course: row.get("course")?,
            chapter: row.get("chapter")?,
            lesson: row.get("lesson")?,
            start_time: parse_dt(&start_time_str)?,
            end_time: end_time_str.as_deref().map(parse_dt).transpose()?,
            active_time: row.get("active_time")?,
            end_reason: row.get("end_reason")?,
            aggregated_at: aggregated_str.as_deref().map(parse_dt).transpose()?,
        })
    }

    // ============================================
    // Heartbeat operations
    // ============================================

    /// Append a heartbeat ping
    pub fn insert_heartbeat(&self, hb: &Heartbeat) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO heartbeats (session_id, member, course, unit_kind, unit_id,
                                    timestamp, is_focused, is_visible, idle_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                hb.session_id,
                hb.member,
                hb.course,
                hb.unit_kind.as_str(),
                hb.unit_id,
                hb.timestamp.to_rfc3339(),
                hb.is_focused as i64,
                hb.is_visible as i64,
                hb.idle_ms,
            ],
        )?;
        Ok(())
    }

    /// Earliest heartbeat for a session that was both focused and visible.
    ///
    /// This is the anchor point for active-time attribution; sessions with no
    /// such heartbeat earn zero active time.
    pub fn first_engaged_heartbeat(&self, session_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let ts: Option<String> = conn.query_row(
            r#"
            SELECT MIN(timestamp) FROM heartbeats
            WHERE session_id = ? AND is_focused = 1 AND is_visible = 1
            "#,
            [session_id],
            |row| row.get(0),
        )?;
        Ok(ts.as_deref().map(parse_dt).transpose()?)
    }

    /// Number of heartbeats recorded for a session
    pub fn count_session_heartbeats(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM heartbeats WHERE session_id = ?",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ============================================
    // Bucket operations
    // ============================================

    /// Merge one closed session into its aggregate bucket.
    ///
    /// A single atomic upsert: inserts the bucket row if the key is new,
    /// otherwise increments active_time and sessions_count in place. Totals
    /// only ever grow.
    pub fn apply_bucket_increment(
        &self,
        key: &BucketKey,
        names: &BucketNames,
        active_time: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO time_buckets (member, member_name, course, course_name,
                                      chapter, chapter_name, lesson, lesson_name,
                                      date, active_time, sessions_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
            ON CONFLICT(member, course, chapter, lesson, date) DO UPDATE SET
                active_time = active_time + excluded.active_time,
                sessions_count = sessions_count + 1
            "#,
            params![
                key.member,
                names.member_name,
                key.course,
                names.course_name,
                key.chapter,
                names.chapter_name,
                key.lesson,
                names.lesson_name,
                key.date.format(DATE_FMT).to_string(),
                active_time,
            ],
        )?;
        Ok(())
    }

    /// Get a single aggregate bucket by its full key
    pub fn get_bucket(&self, key: &BucketKey) -> Result<Option<TimeBucket>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT * FROM time_buckets
            WHERE member = ?1 AND course = ?2 AND chapter = ?3 AND lesson = ?4 AND date = ?5
            "#,
            params![
                key.member,
                key.course,
                key.chapter,
                key.lesson,
                key.date.format(DATE_FMT).to_string(),
            ],
            Self::row_to_bucket,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Scan aggregate buckets with optional filtering, newest dates first
    pub fn scan_buckets(&self, filter: &ReportFilter) -> Result<Vec<TimeBucket>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT * FROM time_buckets WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(student) = &filter.student {
            sql.push_str(" AND member = ?");
            params.push(Box::new(student.clone()));
        }

        if let Some(course) = &filter.course {
            sql.push_str(" AND course = ?");
            params.push(Box::new(course.clone()));
        }

        if let Some(courses) = &filter.course_in {
            if courses.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; courses.len()].join(", ");
            sql.push_str(&format!(" AND course IN ({})", placeholders));
            for course in courses {
                params.push(Box::new(course.clone()));
            }
        }

        if let Some(from) = &filter.from_date {
            sql.push_str(" AND date >= ?");
            params.push(Box::new(from.format(DATE_FMT).to_string()));
        }

        if let Some(to) = &filter.to_date {
            sql.push_str(" AND date <= ?");
            params.push(Box::new(to.format(DATE_FMT).to_string()));
        }

        sql.push_str(" ORDER BY date DESC, member, course, chapter, lesson");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let buckets = stmt
            .query_map(params_refs.as_slice(), Self::row_to_bucket)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(buckets)
    }

    fn row_to_bucket(row: &Row) -> rusqlite::Result<TimeBucket> {
        let date_str: String = row.get("date")?;

        Ok(TimeBucket {
            member: row.get("member")?,
            member_name: row.get("member_name")?,
            course: row.get("course")?,
            course_name: row.get("course_name")?,
            chapter: row.get("chapter")?,
            chapter_name: row.get("chapter_name")?,
            lesson: row.get("lesson")?,
            lesson_name: row.get("lesson_name")?,
            date: parse_date(&date_str)?,
            active_time: row.get("active_time")?,
            sessions_count: row.get("sessions_count")?,
        })
    }

    // ============================================
    // Course rollups
    // ============================================

    /// Per-unit totals within a course, busiest units first
    pub fn course_unit_rollup(
        &self,
        course: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<UnitRollup>> {
        let conn = self.conn.lock().unwrap();

        let (date_clause, params) = Self::date_range_params(course, from, to);
        let sql = format!(
            r#"
            SELECT chapter, chapter_name, lesson, lesson_name,
                   SUM(active_time) as total_active_time,
                   SUM(sessions_count) as total_sessions,
                   MAX(date) as last_access
            FROM time_buckets
            WHERE course = ?1{}
            GROUP BY chapter, lesson
            ORDER BY total_active_time DESC
            "#,
            date_clause
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rollups = stmt
            .query_map(params_refs.as_slice(), |row| {
                let last_access: String = row.get("last_access")?;
                Ok(UnitRollup {
                    chapter: row.get("chapter")?,
                    chapter_name: row.get("chapter_name")?,
                    lesson: row.get("lesson")?,
                    lesson_name: row.get("lesson_name")?,
                    total_active_time: row.get("total_active_time")?,
                    total_sessions: row.get("total_sessions")?,
                    last_access: parse_date(&last_access)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rollups)
    }

    /// Per-student totals within a course, heaviest users first
    pub fn course_student_rollup(
        &self,
        course: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<StudentRollup>> {
        let conn = self.conn.lock().unwrap();

        let (date_clause, params) = Self::date_range_params(course, from, to);
        let sql = format!(
            r#"
            SELECT member, member_name,
                   SUM(active_time) as total_active_time,
                   SUM(sessions_count) as total_sessions,
                   COUNT(DISTINCT date) as days_active
            FROM time_buckets
            WHERE course = ?1{}
            GROUP BY member
            ORDER BY total_active_time DESC
            "#,
            date_clause
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rollups = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(StudentRollup {
                    member: row.get("member")?,
                    member_name: row.get("member_name")?,
                    total_active_time: row.get("total_active_time")?,
                    total_sessions: row.get("total_sessions")?,
                    days_active: row.get("days_active")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rollups)
    }

    /// Per-day totals within a course, oldest first
    pub fn course_daily_rollup(
        &self,
        course: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyRollup>> {
        let conn = self.conn.lock().unwrap();

        let (date_clause, params) = Self::date_range_params(course, from, to);
        let sql = format!(
            r#"
            SELECT date,
                   SUM(active_time) as total_active_time,
                   SUM(sessions_count) as total_sessions,
                   COUNT(DISTINCT member) as distinct_students
            FROM time_buckets
            WHERE course = ?1{}
            GROUP BY date
            ORDER BY date
            "#,
            date_clause
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rollups = stmt
            .query_map(params_refs.as_slice(), Self::row_to_daily)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rollups)
    }

    fn row_to_daily(row: &Row) -> rusqlite::Result<DailyRollup> {
        let date_str: String = row.get("date")?;
        Ok(DailyRollup {
            date: parse_date(&date_str)?,
            total_active_time: row.get("total_active_time")?,
            total_sessions: row.get("total_sessions")?,
            distinct_students: row.get("distinct_students")?,
        })
    }

    fn date_range_params(
        scope: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut clause = String::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(scope.to_string())];

        if let Some(from) = from {
            clause.push_str(" AND date >= ?");
            params.push(Box::new(from.format(DATE_FMT).to_string()));
        }

        if let Some(to) = to {
            clause.push_str(" AND date <= ?");
            params.push(Box::new(to.format(DATE_FMT).to_string()));
        }

        (clause, params)
    }

    // ============================================
    // Member rollups
    // ============================================

    /// Per-course totals for one member, heaviest courses first
    pub fn member_course_rollup(
        &self,
        member: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<MemberCourseRollup>> {
        let conn = self.conn.lock().unwrap();

        let (date_clause, params) = Self::date_range_params(member, from, to);
        let sql = format!(
            r#"
            SELECT course, course_name,
                   SUM(active_time) as total_active_time,
                   SUM(sessions_count) as total_sessions,
                   COUNT(DISTINCT date) as days_active,
                   MIN(date) as first_access,
                   MAX(date) as last_access
            FROM time_buckets
            WHERE member = ?1{}
            GROUP BY course
            ORDER BY total_active_time DESC
            "#,
            date_clause
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rollups = stmt
            .query_map(params_refs.as_slice(), |row| {
                let first_access: String = row.get("first_access")?;
                let last_access: String = row.get("last_access")?;
                Ok(MemberCourseRollup {
                    course: row.get("course")?,
                    course_name: row.get("course_name")?,
                    total_active_time: row.get("total_active_time")?,
                    total_sessions: row.get("total_sessions")?,
                    days_active: row.get("days_active")?,
                    first_access: parse_date(&first_access)?,
                    last_access: parse_date(&last_access)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rollups)
    }

    /// Per-unit totals for one member within a course, busiest units first
    pub fn member_course_units(&self, member: &str, course: &str) -> Result<Vec<UnitRollup>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT chapter, chapter_name, lesson, lesson_name,
                   SUM(active_time) as total_active_time,
                   SUM(sessions_count) as total_sessions,
                   MAX(date) as last_access
            FROM time_buckets
            WHERE member = ?1 AND course = ?2
            GROUP BY chapter, lesson
            ORDER BY total_active_time DESC
            "#,
        )?;

        let rollups = stmt
            .query_map(params![member, course], |row| {
                let last_access: String = row.get("last_access")?;
                Ok(UnitRollup {
                    chapter: row.get("chapter")?,
                    chapter_name: row.get("chapter_name")?,
                    lesson: row.get("lesson")?,
                    lesson_name: row.get("lesson_name")?,
                    total_active_time: row.get("total_active_time")?,
                    total_sessions: row.get("total_sessions")?,
                    last_access: parse_date(&last_access)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rollups)
    }

    /// Per-day totals for one member within a course, oldest first
    pub fn member_course_daily(
        &self,
        member: &str,
        course: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyRollup>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            r#"
            SELECT date,
                   SUM(active_time) as total_active_time,
                   SUM(sessions_count) as total_sessions,
                   COUNT(DISTINCT member) as distinct_students
            FROM time_buckets
            WHERE member = ?1 AND course = ?2
            "#,
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(member.to_string()), Box::new(course.to_string())];

        if let Some(from) = from {
            sql.push_str(" AND date >= ?");
            params.push(Box::new(from.format(DATE_FMT).to_string()));
        }

        if let Some(to) = to {
            sql.push_str(" AND date <= ?");
            params.push(Box::new(to.format(DATE_FMT).to_string()));
        }

        sql.push_str(" GROUP BY date ORDER BY date");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rollups = stmt
            .query_map(params_refs.as_slice(), Self::row_to_daily)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rollups)
    }
}
