//! Catalog and enrollment collaborators
//!
//! The aggregation pipeline does not own course structure or enrollment
//! progress; it consumes them. [`Catalog`] resolves units to their owning
//! chapter/course and supplies display names, [`EnrollmentSource`] supplies
//! completion data for reporting.
//!
//! [`StaticCatalog`] is a TOML-backed implementation of both traits, used by
//! the CLI binaries and tests. Deployments embedded in a platform would
//! implement the traits against the platform's own catalog instead.

use crate::error::{Error, Result};
use crate::types::{UnitKind, UnitPath};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Resolves catalog units and display names.
pub trait Catalog: Send + Sync {
    /// Resolve a unit to its owning chapter and course.
    ///
    /// Fails with [`Error::UnitNotFound`] when the id does not exist, or with
    /// [`Error::Validation`] when a lesson/chapter does not belong to the
    /// expected course.
    fn resolve_unit(&self, kind: UnitKind, unit_id: &str) -> Result<UnitPath>;

    /// Display name for a member, if known.
    fn member_name(&self, member: &str) -> Option<String>;

    /// Title of a course, if known.
    fn course_title(&self, course: &str) -> Option<String>;

    /// Title of a chapter, if known.
    fn chapter_title(&self, chapter: &str) -> Option<String>;

    /// Title of a lesson, if known.
    fn lesson_title(&self, lesson: &str) -> Option<String>;

    /// Owner (creator) of a course, if known.
    fn course_owner(&self, course: &str) -> Option<String>;

    /// Courses owned by the given member.
    fn courses_owned_by(&self, member: &str) -> Vec<String>;
}

/// Per-course completion counts for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CompletionStats {
    #[serde(rename = "Complete")]
    pub complete: i64,
    #[serde(rename = "Partially Complete")]
    pub partially_complete: i64,
    #[serde(rename = "Incomplete")]
    pub incomplete: i64,
}

/// One enrollment: a member's progress in a course.
#[derive(Debug, Clone, Deserialize)]
pub struct Enrollment {
    pub member: String,
    pub course: String,
    /// Completion percentage, 0-100
    #[serde(default)]
    pub progress: f64,
}

impl Enrollment {
    /// Completion status derived from progress.
    pub fn status(&self) -> &'static str {
        if self.progress >= 100.0 {
            "Complete"
        } else if self.progress > 0.0 {
            "Partially Complete"
        } else {
            "Incomplete"
        }
    }
}

/// Supplies enrollment progress for the read-side reports.
pub trait EnrollmentSource: Send + Sync {
    /// Completion percentage for a (member, course) pair, if enrolled.
    fn completion_percent(&self, member: &str, course: &str) -> Option<f64>;

    /// Completion-status counts for a course. Statuses with no enrollments
    /// stay at 0.
    fn completion_counts(&self, course: &str) -> CompletionStats;

    /// Enrollments matching the optional course/member filters.
    fn enrollments(&self, course: Option<&str>, member: Option<&str>) -> Vec<Enrollment>;
}

// ============================================
// TOML-backed static catalog
// ============================================

#[derive(Debug, Deserialize, Default)]
struct CatalogFile {
    #[serde(default)]
    members: Vec<MemberEntry>,
    #[serde(default)]
    courses: Vec<CourseEntry>,
    #[serde(default)]
    enrollments: Vec<Enrollment>,
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CourseEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    lessons: Vec<LessonEntry>,
}

#[derive(Debug, Deserialize)]
struct LessonEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Clone)]
struct CourseInfo {
    title: Option<String>,
    owner: Option<String>,
}

#[derive(Debug, Clone)]
struct ChapterInfo {
    course: String,
    title: Option<String>,
}

#[derive(Debug, Clone)]
struct LessonInfo {
    course: String,
    chapter: String,
    title: Option<String>,
}

/// In-memory catalog loaded from a TOML file.
///
/// Implements both [`Catalog`] and [`EnrollmentSource`].
#[derive(Debug, Default)]
pub struct StaticCatalog {
    members: HashMap<String, Option<String>>,
    courses: HashMap<String, CourseInfo>,
    chapters: HashMap<String, ChapterInfo>,
    lessons: HashMap<String, LessonInfo>,
    enrollments: Vec<Enrollment>,
}

impl StaticCatalog {
    /// Empty catalog. Resolves nothing; useful as a null collaborator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read catalog file {:?}: {}", path, e))
        })?;
        Self::parse(&content)
    }

    /// Parse a catalog from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse catalog: {}", e)))?;

        let mut catalog = Self::default();
        for member in file.members {
            catalog.members.insert(member.id, member.name);
        }
        for course in file.courses {
            for chapter in &course.chapters {
                for lesson in &chapter.lessons {
                    catalog.lessons.insert(
                        lesson.id.clone(),
                        LessonInfo {
                            course: course.id.clone(),
                            chapter: chapter.id.clone(),
                            title: lesson.title.clone(),
                        },
                    );
                }
                catalog.chapters.insert(
                    chapter.id.clone(),
                    ChapterInfo {
                        course: course.id.clone(),
                        title: chapter.title.clone(),
                    },
                );
            }
            catalog.courses.insert(
                course.id,
                CourseInfo {
                    title: course.title,
                    owner: course.owner,
                },
            );
        }
        catalog.enrollments = file.enrollments;

        tracing::debug!(
            courses = catalog.courses.len(),
            chapters = catalog.chapters.len(),
            lessons = catalog.lessons.len(),
            members = catalog.members.len(),
            "Loaded static catalog"
        );

        Ok(catalog)
    }

    // Builder-style helpers for tests and embedding.

    /// Register a member.
    pub fn add_member(&mut self, id: &str, name: Option<&str>) -> &mut Self {
        self.members.insert(id.to_string(), name.map(String::from));
        self
    }

    /// Register a course.
    pub fn add_course(&mut self, id: &str, title: Option<&str>, owner: Option<&str>) -> &mut Self {
        self.courses.insert(
            id.to_string(),
            CourseInfo {
                title: title.map(String::from),
                owner: owner.map(String::from),
            },
        );
        self
    }

    /// Register a chapter under a course.
    pub fn add_chapter(&mut self, id: &str, course: &str, title: Option<&str>) -> &mut Self {
        self.chapters.insert(
            id.to_string(),
            ChapterInfo {
                course: course.to_string(),
                title: title.map(String::from),
            },
        );
        self
    }

    /// Register a lesson under a chapter and course.
    pub fn add_lesson(
        &mut self,
        id: &str,
        course: &str,
        chapter: &str,
        title: Option<&str>,
    ) -> &mut Self {
        self.lessons.insert(
            id.to_string(),
            LessonInfo {
                course: course.to_string(),
                chapter: chapter.to_string(),
                title: title.map(String::from),
            },
        );
        self
    }

    /// Register an enrollment.
    pub fn add_enrollment(&mut self, member: &str, course: &str, progress: f64) -> &mut Self {
        self.enrollments.push(Enrollment {
            member: member.to_string(),
            course: course.to_string(),
            progress,
        });
        self
    }
}

impl Catalog for StaticCatalog {
    fn resolve_unit(&self, kind: UnitKind, unit_id: &str) -> Result<UnitPath> {
        match kind {
            UnitKind::Course => {
                if !self.courses.contains_key(unit_id) {
                    return Err(Error::UnitNotFound {
                        kind: "course",
                        id: unit_id.to_string(),
                    });
                }
                Ok(UnitPath::course(unit_id))
            }
            UnitKind::Chapter => {
                let chapter = self.chapters.get(unit_id).ok_or_else(|| Error::UnitNotFound {
                    kind: "chapter",
                    id: unit_id.to_string(),
                })?;
                Ok(UnitPath {
                    course: chapter.course.clone(),
                    chapter: Some(unit_id.to_string()),
                    lesson: None,
                })
            }
            UnitKind::Lesson => {
                let lesson = self.lessons.get(unit_id).ok_or_else(|| Error::UnitNotFound {
                    kind: "lesson",
                    id: unit_id.to_string(),
                })?;
                Ok(UnitPath {
                    course: lesson.course.clone(),
                    chapter: Some(lesson.chapter.clone()),
                    lesson: Some(unit_id.to_string()),
                })
            }
        }
    }

    fn member_name(&self, member: &str) -> Option<String> {
        self.members.get(member).and_then(|n| n.clone())
    }

    fn course_title(&self, course: &str) -> Option<String> {
        self.courses.get(course).and_then(|c| c.title.clone())
    }

    fn chapter_title(&self, chapter: &str) -> Option<String> {
        self.chapters.get(chapter).and_then(|c| c.title.clone())
    }

    fn lesson_title(&self, lesson: &str) -> Option<String> {
        self.lessons.get(lesson).and_then(|l| l.title.clone())
    }

    fn course_owner(&self, course: &str) -> Option<String> {
        self.courses.get(course).and_then(|c| c.owner.clone())
    }

    fn courses_owned_by(&self, member: &str) -> Vec<String> {
        let mut owned: Vec<String> = self
            .courses
            .iter()
            .filter(|(_, info)| info.owner.as_deref() == Some(member))
            .map(|(id, _)| id.clone())
            .collect();
        owned.sort();
        owned
    }
}

impl EnrollmentSource for StaticCatalog {
    fn completion_percent(&self, member: &str, course: &str) -> Option<f64> {
        self.enrollments
            .iter()
            .find(|e| e.member == member && e.course == course)
            .map(|e| e.progress)
    }

    fn completion_counts(&self, course: &str) -> CompletionStats {
        let mut stats = CompletionStats::default();
        for enrollment in self.enrollments.iter().filter(|e| e.course == course) {
            match enrollment.status() {
                "Complete" => stats.complete += 1,
                "Partially Complete" => stats.partially_complete += 1,
                _ => stats.incomplete += 1,
            }
        }
        stats
    }

    fn enrollments(&self, course: Option<&str>, member: Option<&str>) -> Vec<Enrollment> {
        self.enrollments
            .iter()
            .filter(|e| course.map_or(true, |c| e.course == c))
            .filter(|e| member.map_or(true, |m| e.member == m))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_TOML: &str = r#"
[[members]]
id = "jane@example.com"
name = "Jane Doe"

[[courses]]
id = "rust-101"
title = "Rust 101"
owner = "prof@example.com"

  [[courses.chapters]]
  id = "ch-1"
  title = "Getting Started"

    [[courses.chapters.lessons]]
    id = "ls-1"
    title = "Hello, Cargo"

[[enrollments]]
member = "jane@example.com"
course = "rust-101"
progress = 42.0
"#;

    #[test]
    fn test_parse_catalog_and_resolve_lesson() {
        let catalog = StaticCatalog::parse(CATALOG_TOML).unwrap();

        let path = catalog.resolve_unit(UnitKind::Lesson, "ls-1").unwrap();
        assert_eq!(path.course, "rust-101");
        assert_eq!(path.chapter.as_deref(), Some("ch-1"));
        assert_eq!(path.lesson.as_deref(), Some("ls-1"));

        let path = catalog.resolve_unit(UnitKind::Chapter, "ch-1").unwrap();
        assert_eq!(path.course, "rust-101");
        assert_eq!(path.lesson, None);

        let path = catalog.resolve_unit(UnitKind::Course, "rust-101").unwrap();
        assert_eq!(path, UnitPath::course("rust-101"));
    }

    #[test]
    fn test_resolve_unknown_unit() {
        let catalog = StaticCatalog::parse(CATALOG_TOML).unwrap();
        let err = catalog.resolve_unit(UnitKind::Lesson, "ls-404").unwrap_err();
        assert!(matches!(err, Error::UnitNotFound { kind: "lesson", .. }));
    }

    #[test]
    fn test_display_names_and_ownership() {
        let catalog = StaticCatalog::parse(CATALOG_TOML).unwrap();
        assert_eq!(
            catalog.member_name("jane@example.com").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(catalog.course_title("rust-101").as_deref(), Some("Rust 101"));
        assert_eq!(
            catalog.course_owner("rust-101").as_deref(),
            Some("prof@example.com")
        );
        assert_eq!(
            catalog.courses_owned_by("prof@example.com"),
            vec!["rust-101".to_string()]
        );
        assert!(catalog.courses_owned_by("jane@example.com").is_empty());
    }

    #[test]
    fn test_enrollment_status_thresholds() {
        let mut catalog = StaticCatalog::new();
        catalog
            .add_enrollment("a", "c", 100.0)
            .add_enrollment("b", "c", 55.0)
            .add_enrollment("d", "c", 0.0);

        let stats = catalog.completion_counts("c");
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.partially_complete, 1);
        assert_eq!(stats.incomplete, 1);

        // Unknown course has all-zero counts, not an error
        assert_eq!(catalog.completion_counts("other"), CompletionStats::default());
    }

    #[test]
    fn test_completion_percent_lookup() {
        let catalog = StaticCatalog::parse(CATALOG_TOML).unwrap();
        assert_eq!(
            catalog.completion_percent("jane@example.com", "rust-101"),
            Some(42.0)
        );
        assert_eq!(catalog.completion_percent("jane@example.com", "other"), None);
    }
}
