//! Read-side report queries over the aggregate store
//!
//! All functions here are read-only and deterministic given the store
//! contents. Completion data comes from the [`EnrollmentSource`]
//! collaborator, never from the buckets themselves.

use crate::catalog::{CompletionStats, EnrollmentSource};
use crate::db::repo::{DailyRollup, UnitRollup};
use crate::db::Database;
use crate::error::Result;
use crate::types::ReportFilter;
use chrono::NaiveDate;
use serde::Serialize;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// One day of activity inside a (member, course) group.
#[derive(Debug, Clone, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub active_time: i64,
    pub sessions: i64,
}

/// Aggregated activity for one (member, course) pair.
#[derive(Debug, Clone, Serialize)]
pub struct StudentCourseSummary {
    pub member: String,
    pub member_name: Option<String>,
    pub course: String,
    pub course_name: Option<String>,
    pub total_active_time: i64,
    pub total_sessions: i64,
    pub days_active: i64,
    /// total_active_time / total_sessions, 0 when no sessions
    pub avg_session_time: f64,
    /// Completion percentage from the enrollment collaborator, 0 if unknown
    pub completion: i64,
    /// Per-day breakdown, newest first
    pub daily: Vec<DailyActivity>,
}

/// Activity grouped by (member, course), newest days first within each group.
///
/// Groups appear in bucket-scan order (date desc), so recently active pairs
/// come first. Completion stays 0 here; callers wanting it attach it with
/// [`attach_completion`].
pub fn student_time_analytics(
    db: &Database,
    filter: &ReportFilter,
) -> Result<Vec<StudentCourseSummary>> {
    let buckets = db.scan_buckets(filter)?;

    let mut groups: Vec<StudentCourseSummary> = Vec::new();
    let mut index: std::collections::HashMap<(String, String), usize> =
        std::collections::HashMap::new();

    for bucket in buckets {
        let key = (bucket.member.clone(), bucket.course.clone());
        let pos = match index.get(&key) {
            Some(&pos) => pos,
            None => {
                groups.push(StudentCourseSummary {
                    member: bucket.member.clone(),
                    member_name: bucket.member_name.clone(),
                    course: bucket.course.clone(),
                    course_name: bucket.course_name.clone(),
                    total_active_time: 0,
                    total_sessions: 0,
                    days_active: 0,
                    avg_session_time: 0.0,
                    completion: 0,
                    daily: Vec::new(),
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let group = &mut groups[pos];
        group.total_active_time += bucket.active_time;
        group.total_sessions += bucket.sessions_count;
        // Names may be missing on older buckets; keep the first one seen
        if group.member_name.is_none() {
            group.member_name = bucket.member_name.clone();
        }
        if group.course_name.is_none() {
            group.course_name = bucket.course_name.clone();
        }

        // Several unit-level buckets can share a date; fold them into one day
        match group.daily.iter_mut().find(|d| d.date == bucket.date) {
            Some(day) => {
                day.active_time += bucket.active_time;
                day.sessions += bucket.sessions_count;
            }
            None => group.daily.push(DailyActivity {
                date: bucket.date,
                active_time: bucket.active_time,
                sessions: bucket.sessions_count,
            }),
        }
    }

    for group in &mut groups {
        group.days_active = group.daily.len() as i64;
        if group.total_sessions > 0 {
            group.avg_session_time =
                round1(group.total_active_time as f64 / group.total_sessions as f64);
        }
    }

    Ok(groups)
}

/// Fill in each row's completion percentage from the enrollment collaborator.
pub fn attach_completion(rows: &mut [StudentCourseSummary], enrollment: &dyn EnrollmentSource) {
    for row in rows {
        row.completion = enrollment
            .completion_percent(&row.member, &row.course)
            .map(|p| p.round() as i64)
            .unwrap_or(0);
    }
}

/// Platform-wide headline numbers for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct AdminSummary {
    pub total_time: i64,
    pub active_students: i64,
    /// Mean of row completion percentages, 1-decimal, 0 when no rows
    pub avg_completion_rate: f64,
    /// total_time / active_students, 0 when no students
    pub avg_time_per_student: f64,
}

/// Admin dashboard payload: summary plus the per-(member, course) rows.
#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub summary: AdminSummary,
    pub data: Vec<StudentCourseSummary>,
}

/// Admin dashboard: all activity matching the filter, with headline stats.
pub fn admin_overview(
    db: &Database,
    enrollment: &dyn EnrollmentSource,
    filter: &ReportFilter,
) -> Result<AdminOverview> {
    let mut data = student_time_analytics(db, filter)?;
    attach_completion(&mut data, enrollment);

    let total_time: i64 = data.iter().map(|r| r.total_active_time).sum();
    let students: std::collections::HashSet<&str> =
        data.iter().map(|r| r.member.as_str()).collect();
    let active_students = students.len() as i64;

    let avg_completion_rate = if data.is_empty() {
        0.0
    } else {
        round1(data.iter().map(|r| r.completion as f64).sum::<f64>() / data.len() as f64)
    };

    let avg_time_per_student = if active_students == 0 {
        0.0
    } else {
        round1(total_time as f64 / active_students as f64)
    };

    Ok(AdminOverview {
        summary: AdminSummary {
            total_time,
            active_students,
            avg_completion_rate,
            avg_time_per_student,
        },
        data,
    })
}

/// Activity totals for one unit inside a course report.
#[derive(Debug, Clone, Serialize)]
pub struct CourseUnitActivity {
    pub chapter: String,
    pub chapter_name: Option<String>,
    pub lesson: String,
    pub lesson_name: Option<String>,
    pub active_time: i64,
    pub sessions: i64,
    pub last_access: NaiveDate,
}

impl From<UnitRollup> for CourseUnitActivity {
    fn from(r: UnitRollup) -> Self {
        Self {
            chapter: r.chapter,
            chapter_name: r.chapter_name,
            lesson: r.lesson,
            lesson_name: r.lesson_name,
            active_time: r.total_active_time,
            sessions: r.total_sessions,
            last_access: r.last_access,
        }
    }
}

/// Per-student totals inside a course report.
#[derive(Debug, Clone, Serialize)]
pub struct CourseStudentActivity {
    pub member: String,
    pub member_name: Option<String>,
    pub active_time: i64,
    pub sessions: i64,
    pub days_active: i64,
    pub avg_session_time: f64,
    pub completion: i64,
}

/// Per-day totals inside a course report.
#[derive(Debug, Clone, Serialize)]
pub struct CourseDailyActivity {
    pub date: NaiveDate,
    pub active_time: i64,
    pub sessions: i64,
    pub distinct_students: i64,
}

impl From<DailyRollup> for CourseDailyActivity {
    fn from(r: DailyRollup) -> Self {
        Self {
            date: r.date,
            active_time: r.total_active_time,
            sessions: r.total_sessions,
            distinct_students: r.distinct_students,
        }
    }
}

/// Headline numbers for one course.
#[derive(Debug, Clone, Serialize)]
pub struct CourseSummary {
    pub total_active_time: i64,
    pub total_students: i64,
    pub total_sessions: i64,
    /// total_active_time / total_students, 0 when no students
    pub avg_time_per_student: f64,
    pub completion_stats: CompletionStats,
}

/// Full course report: summary, unit/student/daily breakdowns.
#[derive(Debug, Clone, Serialize)]
pub struct CourseReport {
    pub course: String,
    pub summary: CourseSummary,
    pub units: Vec<CourseUnitActivity>,
    pub students: Vec<CourseStudentActivity>,
    pub daily: Vec<CourseDailyActivity>,
}

/// Course-level analytics over an optional date window.
pub fn course_time_analytics(
    db: &Database,
    enrollment: &dyn EnrollmentSource,
    course: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<CourseReport> {
    let units: Vec<CourseUnitActivity> = db
        .course_unit_rollup(course, from, to)?
        .into_iter()
        .map(Into::into)
        .collect();

    let students: Vec<CourseStudentActivity> = db
        .course_student_rollup(course, from, to)?
        .into_iter()
        .map(|r| {
            let avg_session_time = if r.total_sessions > 0 {
                round1(r.total_active_time as f64 / r.total_sessions as f64)
            } else {
                0.0
            };
            let completion = enrollment
                .completion_percent(&r.member, course)
                .map(|p| p.round() as i64)
                .unwrap_or(0);
            CourseStudentActivity {
                member: r.member,
                member_name: r.member_name,
                active_time: r.total_active_time,
                sessions: r.total_sessions,
                days_active: r.days_active,
                avg_session_time,
                completion,
            }
        })
        .collect();

    let daily: Vec<CourseDailyActivity> = db
        .course_daily_rollup(course, from, to)?
        .into_iter()
        .map(Into::into)
        .collect();

    let total_active_time: i64 = students.iter().map(|s| s.active_time).sum();
    let total_sessions: i64 = students.iter().map(|s| s.sessions).sum();
    let total_students = students.len() as i64;
    let avg_time_per_student = if total_students == 0 {
        0.0
    } else {
        round1(total_active_time as f64 / total_students as f64)
    };

    Ok(CourseReport {
        course: course.to_string(),
        summary: CourseSummary {
            total_active_time,
            total_students,
            total_sessions,
            avg_time_per_student,
            completion_stats: enrollment.completion_counts(course),
        },
        units,
        students,
        daily,
    })
}

/// Lesson totals inside a chapter breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct LessonActivity {
    pub lesson: String,
    pub lesson_name: Option<String>,
    pub active_time: i64,
    pub sessions: i64,
    pub last_access: NaiveDate,
}

/// Chapter totals with their lesson breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterBreakdown {
    pub chapter: String,
    pub chapter_name: Option<String>,
    pub active_time: i64,
    pub sessions: i64,
    pub lessons: Vec<LessonActivity>,
}

/// One member's activity in one course, with structure breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct StudentCourseReport {
    pub member: String,
    pub course: String,
    pub course_name: Option<String>,
    pub total_active_time: i64,
    pub total_sessions: i64,
    pub days_active: i64,
    pub avg_session_time: f64,
    pub first_access: NaiveDate,
    pub last_access: NaiveDate,
    pub completion: i64,
    pub chapters: Vec<ChapterBreakdown>,
    pub daily: Vec<DailyActivity>,
}

/// One member's activity per course, heaviest courses first.
///
/// Bucket rows without a chapter (course-level sessions) contribute to the
/// course totals but are excluded from the chapter breakdown.
pub fn student_course_analytics(
    db: &Database,
    enrollment: &dyn EnrollmentSource,
    student: &str,
    course: Option<&str>,
) -> Result<Vec<StudentCourseReport>> {
    let rollups = db.member_course_rollup(student, None, None)?;

    let mut reports = Vec::new();
    for rollup in rollups {
        if let Some(course) = course {
            if rollup.course != course {
                continue;
            }
        }

        let units = db.member_course_units(student, &rollup.course)?;

        let mut chapters: Vec<ChapterBreakdown> = Vec::new();
        for unit in units {
            if unit.chapter.is_empty() {
                continue;
            }
            let pos = match chapters.iter().position(|c| c.chapter == unit.chapter) {
                Some(pos) => pos,
                None => {
                    chapters.push(ChapterBreakdown {
                        chapter: unit.chapter.clone(),
                        chapter_name: unit.chapter_name.clone(),
                        active_time: 0,
                        sessions: 0,
                        lessons: Vec::new(),
                    });
                    chapters.len() - 1
                }
            };
            let chapter = &mut chapters[pos];
            chapter.active_time += unit.total_active_time;
            chapter.sessions += unit.total_sessions;
            if !unit.lesson.is_empty() {
                chapter.lessons.push(LessonActivity {
                    lesson: unit.lesson,
                    lesson_name: unit.lesson_name,
                    active_time: unit.total_active_time,
                    sessions: unit.total_sessions,
                    last_access: unit.last_access,
                });
            }
        }

        let daily: Vec<DailyActivity> = db
            .member_course_daily(student, &rollup.course, None, None)?
            .into_iter()
            .map(|r| DailyActivity {
                date: r.date,
                active_time: r.total_active_time,
                sessions: r.total_sessions,
            })
            .collect();

        let avg_session_time = if rollup.total_sessions > 0 {
            round1(rollup.total_active_time as f64 / rollup.total_sessions as f64)
        } else {
            0.0
        };

        let completion = enrollment
            .completion_percent(student, &rollup.course)
            .map(|p| p.round() as i64)
            .unwrap_or(0);

        reports.push(StudentCourseReport {
            member: student.to_string(),
            course: rollup.course,
            course_name: rollup.course_name,
            total_active_time: rollup.total_active_time,
            total_sessions: rollup.total_sessions,
            days_active: rollup.days_active,
            avg_session_time,
            first_access: rollup.first_access,
            last_access: rollup.last_access,
            completion,
            chapters,
            daily,
        });
    }

    Ok(reports)
}
