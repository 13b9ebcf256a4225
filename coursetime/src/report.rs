//! coursetime-report - CLI tool to query learning-time analytics
//!
//! Reads the local aggregate store and prints admin, course, or student
//! reports; optionally writes the CSV export.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use coursetime_core::analytics::{
    admin_overview, attach_completion, course_time_analytics, export_csv,
    student_course_analytics, student_time_analytics,
};
use coursetime_core::auth::{
    ensure_course_access, ensure_student_access, scope_admin_filter, Role, Viewer,
};
use coursetime_core::format::format_duration;
use coursetime_core::{Config, Database, ReportFilter, StaticCatalog};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Platform-wide overview across students and courses
    Admin,
    /// One course: units, students, daily series
    Course,
    /// One student: per-course breakdown
    Student,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "coursetime-report")]
#[command(about = "Query learning-time analytics from the local store")]
#[command(version)]
struct Args {
    /// Report mode
    #[arg(short, long, value_enum, default_value = "admin")]
    mode: Mode,

    /// Student to report on (required for --mode student)
    #[arg(short, long)]
    student: Option<String>,

    /// Course to report on (required for --mode course)
    #[arg(short, long)]
    course: Option<String>,

    /// Inclusive lower date bound (YYYY-MM-DD); defaults to the configured
    /// report window (admin and course modes)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Inclusive upper date bound (YYYY-MM-DD); defaults to today
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Acting viewer (member id); defaults to an administrator
    #[arg(long)]
    viewer: Option<String>,

    /// Roles held by the viewer
    #[arg(long, value_enum)]
    role: Vec<CliRole>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Write the CSV export of the admin report to this path
    #[arg(long)]
    csv: Option<std::path::PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliRole {
    Admin,
    Moderator,
    CourseCreator,
}

impl From<CliRole> for Role {
    fn from(r: CliRole) -> Self {
        match r {
            CliRole::Admin => Role::Admin,
            CliRole::Moderator => Role::Moderator,
            CliRole::CourseCreator => Role::CourseCreator,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        coursetime_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let catalog = match &config.catalog.path {
        Some(path) => StaticCatalog::load_from(path).context("failed to load catalog")?,
        None => StaticCatalog::new(),
    };

    let viewer = match &args.viewer {
        Some(member) => Viewer::new(member, args.role.iter().map(|&r| r.into()).collect()),
        None => Viewer::new("admin", vec![Role::Admin]),
    };

    tracing::info!(viewer = %viewer.member, "Running report");

    // Admin and course reports cover the trailing configured window unless
    // explicit bounds are given; student reports span all history.
    let today = chrono::Utc::now().date_naive();
    let from = args
        .from
        .unwrap_or_else(|| config.tracking.default_window_start(today));
    let to = args.to.unwrap_or(today);

    match args.mode {
        Mode::Admin => run_admin(&args, from, to, &db, &catalog, &viewer),
        Mode::Course => run_course(&args, from, to, &db, &catalog, &viewer),
        Mode::Student => run_student(&args, &db, &catalog, &viewer),
    }
}

fn run_admin(
    args: &Args,
    from: NaiveDate,
    to: NaiveDate,
    db: &Database,
    catalog: &StaticCatalog,
    viewer: &Viewer,
) -> Result<()> {
    let filter = ReportFilter {
        student: args.student.clone(),
        course: args.course.clone(),
        course_in: None,
        from_date: Some(from),
        to_date: Some(to),
    };
    let filter = scope_admin_filter(viewer, filter, catalog)?;

    let overview = admin_overview(db, catalog, &filter)?;

    if let Some(path) = &args.csv {
        let mut rows = student_time_analytics(db, &filter)?;
        attach_completion(&mut rows, catalog);
        std::fs::write(path, export_csv(&rows)).context("failed to write CSV export")?;
        println!("Wrote {} rows to {}", rows.len(), path.display());
    }

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&overview)?),
        Format::Text => {
            println!("Total time:        {}", format_duration(overview.summary.total_time));
            println!("Active students:   {}", overview.summary.active_students);
            println!("Avg completion:    {}%", overview.summary.avg_completion_rate);
            println!(
                "Avg time/student:  {}",
                format_duration(overview.summary.avg_time_per_student as i64)
            );
            println!();
            for row in &overview.data {
                println!(
                    "{:<30} {:<20} {:>10} {:>5} sessions {:>4} days {:>4}%",
                    row.member,
                    row.course,
                    format_duration(row.total_active_time),
                    row.total_sessions,
                    row.days_active,
                    row.completion,
                );
            }
        }
    }

    Ok(())
}

fn run_course(
    args: &Args,
    from: NaiveDate,
    to: NaiveDate,
    db: &Database,
    catalog: &StaticCatalog,
    viewer: &Viewer,
) -> Result<()> {
    let course = args
        .course
        .as_deref()
        .context("--course is required for --mode course")?;
    ensure_course_access(viewer, course, catalog)?;

    let report = course_time_analytics(db, catalog, course, Some(from), Some(to))?;

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            println!("Course: {}", report.course);
            println!(
                "  total {}  students {}  sessions {}  avg/student {}",
                format_duration(report.summary.total_active_time),
                report.summary.total_students,
                report.summary.total_sessions,
                format_duration(report.summary.avg_time_per_student as i64),
            );
            println!(
                "  completion: {} complete, {} partial, {} incomplete",
                report.summary.completion_stats.complete,
                report.summary.completion_stats.partially_complete,
                report.summary.completion_stats.incomplete,
            );
            println!("\nStudents:");
            for s in &report.students {
                println!(
                    "  {:<30} {:>10} {:>5} sessions {:>4} days {:>4}%",
                    s.member,
                    format_duration(s.active_time),
                    s.sessions,
                    s.days_active,
                    s.completion,
                );
            }
            println!("\nUnits:");
            for u in &report.units {
                let label = match (u.chapter.as_str(), u.lesson.as_str()) {
                    ("", _) => "(course)".to_string(),
                    (ch, "") => ch.to_string(),
                    (ch, ls) => format!("{}/{}", ch, ls),
                };
                println!(
                    "  {:<30} {:>10} {:>5} sessions",
                    label,
                    format_duration(u.active_time),
                    u.sessions,
                );
            }
            println!("\nDaily:");
            for d in &report.daily {
                println!(
                    "  {} {:>10} {:>5} sessions {:>4} students",
                    d.date,
                    format_duration(d.active_time),
                    d.sessions,
                    d.distinct_students,
                );
            }
        }
    }

    Ok(())
}

fn run_student(args: &Args, db: &Database, catalog: &StaticCatalog, viewer: &Viewer) -> Result<()> {
    let student = args
        .student
        .as_deref()
        .context("--student is required for --mode student")?;
    ensure_student_access(viewer, student, args.course.as_deref(), catalog)?;

    let reports = student_course_analytics(db, catalog, student, args.course.as_deref())?;

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => {
            if reports.is_empty() {
                println!("No activity recorded for {}", student);
                return Ok(());
            }
            for report in &reports {
                println!(
                    "{} ({})",
                    report.course,
                    report.course_name.as_deref().unwrap_or("untitled"),
                );
                println!(
                    "  total {}  sessions {}  days {}  completion {}%",
                    format_duration(report.total_active_time),
                    report.total_sessions,
                    report.days_active,
                    report.completion,
                );
                println!(
                    "  first access {}  last access {}",
                    report.first_access, report.last_access,
                );
                for chapter in &report.chapters {
                    println!(
                        "  {:<28} {:>10} {:>5} sessions",
                        chapter.chapter_name.as_deref().unwrap_or(&chapter.chapter),
                        format_duration(chapter.active_time),
                        chapter.sessions,
                    );
                    for lesson in &chapter.lessons {
                        println!(
                            "    {:<26} {:>10} {:>5} sessions",
                            lesson.lesson_name.as_deref().unwrap_or(&lesson.lesson),
                            format_duration(lesson.active_time),
                            lesson.sessions,
                        );
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}
