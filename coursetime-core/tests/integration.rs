//! End-to-end tests: lifecycle through aggregation to reports and export

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use coursetime_core::analytics::{
    admin_overview, attach_completion, export_csv, reconcile, student_time_analytics, Aggregator,
};
use coursetime_core::{
    Database, Heartbeat, ReportFilter, Session, SessionTracker, StaticCatalog, UnitKind,
};

fn setup() -> (Database, StaticCatalog) {
    coursetime_core::logging::init_test();

    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();

    let mut catalog = StaticCatalog::new();
    catalog
        .add_member("jane@example.com", Some("Jane Doe"))
        .add_member("bob@example.com", Some("Bob Roberts"))
        .add_course("rust-101", Some("Rust 101"), Some("prof@example.com"))
        .add_chapter("ch-1", "rust-101", Some("Getting Started"))
        .add_lesson("ls-1", "rust-101", "ch-1", Some("Hello, Cargo"))
        .add_enrollment("jane@example.com", "rust-101", 60.0);
    (db, catalog)
}

fn backdated_heartbeat(db: &Database, session_id: &str, secs_ago: i64) {
    let session = db.get_session(session_id).unwrap().unwrap();
    db.insert_heartbeat(&Heartbeat {
        session_id: session_id.to_string(),
        member: session.member.clone(),
        course: session.course.clone(),
        unit_kind: session.unit_kind(),
        unit_id: session.unit_id().to_string(),
        timestamp: Utc::now() - Duration::seconds(secs_ago),
        is_focused: true,
        is_visible: true,
        idle_ms: 0,
    })
    .unwrap();
}

#[test]
fn lesson_session_flows_into_one_bucket() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    let id = tracker
        .start("rust-101", UnitKind::Lesson, "ls-1", "jane@example.com")
        .unwrap();

    // Two engaged heartbeats 300 seconds apart; the earliest anchors the clock
    backdated_heartbeat(&db, &id, 300);
    backdated_heartbeat(&db, &id, 0);

    assert!(tracker.end(&id, None, "jane@example.com").is_success());

    let session = db.get_session(&id).unwrap().unwrap();
    assert!(session.active_time >= 300 && session.active_time <= 302);

    let bucket = db.get_bucket(&session.bucket_key()).unwrap().unwrap();
    assert_eq!(bucket.course, "rust-101");
    assert_eq!(bucket.chapter, "ch-1");
    assert_eq!(bucket.lesson, "ls-1");
    assert_eq!(bucket.date, Utc::now().date_naive());
    assert_eq!(bucket.active_time, session.active_time);
    assert_eq!(bucket.sessions_count, 1);
    assert_eq!(bucket.member_name.as_deref(), Some("Jane Doe"));
}

#[test]
fn session_without_engaged_heartbeat_earns_zero_time() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    let id = tracker
        .start("rust-101", UnitKind::Course, "rust-101", "jane@example.com")
        .unwrap();
    tracker.heartbeat(&id, false, true, 0, "jane@example.com");
    tracker.heartbeat(&id, true, false, 0, "jane@example.com");
    tracker.end(&id, None, "jane@example.com");

    let session = db.get_session(&id).unwrap().unwrap();
    assert_eq!(session.active_time, 0);

    let bucket = db.get_bucket(&session.bucket_key()).unwrap().unwrap();
    assert_eq!(bucket.active_time, 0);
    assert_eq!(bucket.sessions_count, 1);
}

#[test]
fn active_time_never_exceeds_cap() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    let id = tracker
        .start("rust-101", UnitKind::Course, "rust-101", "jane@example.com")
        .unwrap();
    backdated_heartbeat(&db, &id, 3 * 24 * 3600);
    tracker.end(&id, None, "jane@example.com");

    let session = db.get_session(&id).unwrap().unwrap();
    assert_eq!(session.active_time, coursetime_core::ACTIVE_TIME_CAP_SECS);
}

#[test]
fn repeated_sessions_accumulate_monotonically() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    let mut expected_total = 0;
    for secs in [120, 45, 300] {
        let id = tracker
            .start("rust-101", UnitKind::Lesson, "ls-1", "jane@example.com")
            .unwrap();
        backdated_heartbeat(&db, &id, secs);
        tracker.end(&id, None, "jane@example.com");
        expected_total += db.get_session(&id).unwrap().unwrap().active_time;
    }

    let rows = student_time_analytics(&db, &ReportFilter::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_active_time, expected_total);
    assert_eq!(rows[0].total_sessions, 3);
}

#[test]
fn report_rows_carry_completion_and_export_cleanly() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    let id = tracker
        .start("rust-101", UnitKind::Lesson, "ls-1", "jane@example.com")
        .unwrap();
    backdated_heartbeat(&db, &id, 100);
    tracker.end(&id, None, "jane@example.com");

    let mut rows =
        student_time_analytics(&db, &ReportFilter::for_student("jane@example.com")).unwrap();
    attach_completion(&mut rows, &catalog);
    assert_eq!(rows[0].completion, 60);

    let csv = export_csv(&rows);
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("Student,Student Name,"));
    let row = lines.next().unwrap();
    assert!(row.starts_with("jane@example.com,Jane Doe,rust-101,Rust 101,"));
    assert!(row.ends_with(",1,1,60"));
}

#[test]
fn admin_overview_counts_distinct_students() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    for member in ["jane@example.com", "jane@example.com", "bob@example.com"] {
        let id = tracker
            .start("rust-101", UnitKind::Course, "rust-101", member)
            .unwrap();
        backdated_heartbeat(&db, &id, 600);
        tracker.end(&id, None, member);
    }

    let overview = admin_overview(&db, &catalog, &ReportFilter::default()).unwrap();
    assert_eq!(overview.summary.active_students, 2);
    assert_eq!(overview.data.len(), 2);
    assert!(overview.summary.total_time >= 1800);
}

#[test]
fn reconciliation_only_catches_missed_sessions() {
    let (db, catalog) = setup();
    let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    let start = Utc.from_utc_datetime(&day.and_hms_opt(10, 0, 0).unwrap());

    let make = |id: &str| Session {
        session_id: id.to_string(),
        member: "jane@example.com".to_string(),
        course: "rust-101".to_string(),
        chapter: None,
        lesson: None,
        start_time: start,
        end_time: Some(start + Duration::seconds(400)),
        active_time: 400,
        end_reason: Some("navigate".to_string()),
        aggregated_at: None,
    };

    // s1 was live-aggregated, s2 slipped through
    let s1 = make("s1");
    let s2 = make("s2");
    db.insert_session(&s1).unwrap();
    db.insert_session(&s2).unwrap();
    Aggregator::new(&db, &catalog).apply(&s1).unwrap();

    let report = reconcile::run_for_date(&db, &catalog, day).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);

    let bucket = db.get_bucket(&s1.bucket_key()).unwrap().unwrap();
    assert_eq!(bucket.active_time, 800);
    assert_eq!(bucket.sessions_count, 2);
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("data.db");

    {
        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        let mut catalog = StaticCatalog::new();
        catalog.add_course("rust-101", Some("Rust 101"), None);

        let tracker = SessionTracker::new(&db, &catalog);
        let id = tracker
            .start("rust-101", UnitKind::Course, "rust-101", "jane@example.com")
            .unwrap();
        tracker.end(&id, None, "jane@example.com");
    }

    let db = Database::open(&path).unwrap();
    db.migrate().unwrap();
    let rows = student_time_analytics(&db, &ReportFilter::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_sessions, 1);
}

#[test]
fn double_end_does_not_double_count() {
    let (db, catalog) = setup();
    let tracker = SessionTracker::new(&db, &catalog);

    let id = tracker
        .start("rust-101", UnitKind::Lesson, "ls-1", "jane@example.com")
        .unwrap();
    backdated_heartbeat(&db, &id, 60);

    assert!(tracker.end(&id, None, "jane@example.com").is_success());
    assert!(tracker.end(&id, None, "jane@example.com").is_success());

    let session = db.get_session(&id).unwrap().unwrap();
    let bucket = db.get_bucket(&session.bucket_key()).unwrap().unwrap();
    assert_eq!(bucket.sessions_count, 1);
}
