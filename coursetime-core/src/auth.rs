//! Role and ownership checks for the read-side reports
//!
//! Three role classes gate analytics reads: administrators (and moderators)
//! see everything, course creators see courses they own, and members see
//! their own data. Write-side lifecycle calls only need an authenticated
//! actor and are not gated here.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::types::ReportFilter;

/// Roles a viewer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Moderator, treated like an administrator for analytics reads
    Moderator,
    /// Can create courses; sees analytics only for courses they own
    CourseCreator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::CourseCreator => "course_creator",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "course_creator" => Ok(Role::CourseCreator),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// An authenticated caller and the roles they hold.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub member: String,
    pub roles: Vec<Role>,
}

impl Viewer {
    pub fn new(member: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            member: member.into(),
            roles,
        }
    }

    /// A viewer with no elevated roles.
    pub fn member_only(member: impl Into<String>) -> Self {
        Self::new(member, vec![])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Admins and moderators have unrestricted analytics reads.
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Moderator)
    }
}

/// Narrow an admin-analytics filter to what the viewer may see.
///
/// Admins pass through unchanged. Course creators are restricted to courses
/// they own: an explicit course filter must be one of theirs, and an open
/// filter is narrowed to their course list. Everyone else is rejected.
pub fn scope_admin_filter(
    viewer: &Viewer,
    mut filter: ReportFilter,
    catalog: &dyn Catalog,
) -> Result<ReportFilter> {
    if viewer.is_admin() {
        return Ok(filter);
    }

    if viewer.has_role(Role::CourseCreator) {
        let owned = catalog.courses_owned_by(&viewer.member);
        if let Some(course) = &filter.course {
            if !owned.contains(course) {
                return Err(Error::PermissionDenied(format!(
                    "{} does not own course {}",
                    viewer.member, course
                )));
            }
        } else {
            filter.course_in = Some(owned);
        }
        return Ok(filter);
    }

    Err(Error::PermissionDenied(format!(
        "{} may not view admin analytics",
        viewer.member
    )))
}

/// Check that the viewer may read analytics for a single course.
pub fn ensure_course_access(viewer: &Viewer, course: &str, catalog: &dyn Catalog) -> Result<()> {
    if viewer.is_admin() {
        return Ok(());
    }

    if viewer.has_role(Role::CourseCreator)
        && catalog.course_owner(course).as_deref() == Some(viewer.member.as_str())
    {
        return Ok(());
    }

    Err(Error::PermissionDenied(format!(
        "{} may not view analytics for course {}",
        viewer.member, course
    )))
}

/// Check that the viewer may read a student's analytics.
///
/// Allowed for the student themselves, admins/moderators, and the owner of
/// the specific course being queried.
pub fn ensure_student_access(
    viewer: &Viewer,
    student: &str,
    course: Option<&str>,
    catalog: &dyn Catalog,
) -> Result<()> {
    if viewer.member == student || viewer.is_admin() {
        return Ok(());
    }

    if let Some(course) = course {
        if viewer.has_role(Role::CourseCreator)
            && catalog.course_owner(course).as_deref() == Some(viewer.member.as_str())
        {
            return Ok(());
        }
    }

    Err(Error::PermissionDenied(format!(
        "{} may not view analytics for {}",
        viewer.member, student
    )))
}
