//! Analytics: aggregation, reporting, export, and reconciliation

pub mod aggregate;
pub mod export;
pub mod queries;
pub mod reconcile;

pub use aggregate::{AggregateOutcome, Aggregator};
pub use export::export_csv;
pub use queries::{
    admin_overview, attach_completion, course_time_analytics, student_course_analytics,
    student_time_analytics,
};
pub use reconcile::{run_for_date, run_previous_day, ReconcileReport};
