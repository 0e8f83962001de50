//! Permission declarations for the school dashboard.
//!
//! One subtree per audience. Screens not listed here are open to any
//! authenticated actor.

use schoolgate_auth::{DeclarationError, PermissionRequirement, RoleKind, ScreenRegistry};

use schoolgate_auth::RoleKind::{
    AcademicTeacher, Admin, Headmaster, Parent, Student, SuperAdmin, Teacher, ViceHeadmaster,
};

const SCHOOL_LEADERSHIP: [RoleKind; 4] = [SuperAdmin, Admin, Headmaster, ViceHeadmaster];
const TEACHING_STAFF: [RoleKind; 2] = [AcademicTeacher, Teacher];

fn roles(groups: &[&[RoleKind]]) -> PermissionRequirement {
    groups.iter().flat_map(|g| g.iter().copied()).collect()
}

/// Build the dashboard's screen table.
pub fn dashboard() -> Result<ScreenRegistry, DeclarationError> {
    let mut registry = ScreenRegistry::new();
    registry
        .declare("/dashboard", PermissionRequirement::authenticated())?
        .declare("/dashboard/profile", PermissionRequirement::authenticated())?
        .declare("/dashboard/announcements", PermissionRequirement::authenticated())?
        // platform operators
        .declare("/dashboard/super-admin", roles(&[&[SuperAdmin]]))?
        .declare("/dashboard/admin", roles(&[&[SuperAdmin, Admin]]))?
        .declare("/dashboard/admin/schools", roles(&[&[SuperAdmin]]))?
        // school leadership
        .declare("/dashboard/headmaster", roles(&[&SCHOOL_LEADERSHIP]))?
        .declare("/dashboard/teachers", roles(&[&SCHOOL_LEADERSHIP]))?
        .declare("/dashboard/classes", roles(&[&SCHOOL_LEADERSHIP, &TEACHING_STAFF]))?
        .declare("/dashboard/exams", roles(&[&SCHOOL_LEADERSHIP, &TEACHING_STAFF]))?
        .declare("/dashboard/students", roles(&[&SCHOOL_LEADERSHIP, &TEACHING_STAFF]))?
        // teaching staff
        .declare("/dashboard/teacher", roles(&[&TEACHING_STAFF]))?
        .declare("/dashboard/academic", roles(&[&[AcademicTeacher, Headmaster, ViceHeadmaster]]))?
        // families
        .declare("/dashboard/student", roles(&[&[Student]]))?
        .declare("/dashboard/parent", roles(&[&[Parent]]))?
        .declare("/dashboard/results", roles(&[&[Student, Parent], &TEACHING_STAFF]))?;
    Ok(registry)
}
