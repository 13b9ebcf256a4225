//! CSV export of the per-(student, course) activity report

use crate::analytics::queries::StudentCourseSummary;
use crate::format::format_hours;

/// Fixed export columns, in order.
pub const CSV_HEADER: [&str; 9] = [
    "Student",
    "Student Name",
    "Course",
    "Course Name",
    "Time Spent (seconds)",
    "Time Spent (hours)",
    "Sessions",
    "Days Active",
    "Completion %",
];

/// Serialize report rows as CSV, header first.
pub fn export_csv(rows: &[StudentCourseSummary]) -> String {
    let mut out = String::new();
    write_record(&mut out, CSV_HEADER.iter().map(|s| s.to_string()));

    for row in rows {
        write_record(
            &mut out,
            [
                row.member.clone(),
                row.member_name.clone().unwrap_or_default(),
                row.course.clone(),
                row.course_name.clone().unwrap_or_default(),
                row.total_active_time.to_string(),
                format_hours(row.total_active_time),
                row.total_sessions.to_string(),
                row.days_active.to_string(),
                row.completion.to_string(),
            ]
            .into_iter(),
        );
    }

    out
}

fn write_record(out: &mut String, fields: impl Iterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field(&field));
    }
    out.push('\n');
}

/// Quote a field only when it contains a delimiter, quote, or newline.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
