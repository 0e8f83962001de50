use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary role of an actor inside a school (discriminant only).
///
/// This is what permission requirements are written in terms of.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    SuperAdmin,
    Admin,
    Headmaster,
    ViceHeadmaster,
    AcademicTeacher,
    Teacher,
    Student,
    Parent,
}

impl RoleKind {
    pub const ALL: [RoleKind; 8] = [
        RoleKind::SuperAdmin,
        RoleKind::Admin,
        RoleKind::Headmaster,
        RoleKind::ViceHeadmaster,
        RoleKind::AcademicTeacher,
        RoleKind::Teacher,
        RoleKind::Student,
        RoleKind::Parent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::SuperAdmin => "super_admin",
            RoleKind::Admin => "admin",
            RoleKind::Headmaster => "headmaster",
            RoleKind::ViceHeadmaster => "vice_headmaster",
            RoleKind::AcademicTeacher => "academic_teacher",
            RoleKind::Teacher => "teacher",
            RoleKind::Student => "student",
            RoleKind::Parent => "parent",
        }
    }

    /// Roles that may carry a teacher specialization.
    pub fn is_teacher_family(&self) -> bool {
        matches!(self, RoleKind::AcademicTeacher | RoleKind::Teacher)
    }
}

impl core::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleKind {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RoleError::UnknownRole(s.to_string()))
    }
}

/// Teacher specialization (the "sub-role").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherSpecialization {
    NormalTeacher,
    ClassTeacher,
    SubjectTeacher,
    HeadOfDepartment,
}

impl TeacherSpecialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeacherSpecialization::NormalTeacher => "normal_teacher",
            TeacherSpecialization::ClassTeacher => "class_teacher",
            TeacherSpecialization::SubjectTeacher => "subject_teacher",
            TeacherSpecialization::HeadOfDepartment => "head_of_department",
        }
    }
}

impl core::fmt::Display for TeacherSpecialization {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeacherSpecialization {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal_teacher" => Ok(TeacherSpecialization::NormalTeacher),
            "class_teacher" => Ok(TeacherSpecialization::ClassTeacher),
            "subject_teacher" => Ok(TeacherSpecialization::SubjectTeacher),
            "head_of_department" => Ok(TeacherSpecialization::HeadOfDepartment),
            other => Err(RoleError::UnknownSubRole(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("unknown teacher specialization '{0}'")]
    UnknownSubRole(String),

    #[error("role '{0}' cannot carry a teacher specialization")]
    SubRoleNotAllowed(RoleKind),
}

/// Primary role together with its dependent sub-role.
///
/// Only the teacher family has a slot for a specialization, so "sub-role
/// without a teacher role" cannot be represented.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "sub_role", rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Headmaster,
    ViceHeadmaster,
    AcademicTeacher(Option<TeacherSpecialization>),
    Teacher(Option<TeacherSpecialization>),
    Student,
    Parent,
}

impl Role {
    /// Build a role from its discriminant and an optional sub-role.
    pub fn from_parts(
        kind: RoleKind,
        sub_role: Option<TeacherSpecialization>,
    ) -> Result<Self, RoleError> {
        match (kind, sub_role) {
            (RoleKind::AcademicTeacher, sub) => Ok(Role::AcademicTeacher(sub)),
            (RoleKind::Teacher, sub) => Ok(Role::Teacher(sub)),
            (kind, None) => Ok(Role::from(kind)),
            (kind, Some(_)) => Err(RoleError::SubRoleNotAllowed(kind)),
        }
    }

    pub fn kind(&self) -> RoleKind {
        match self {
            Role::SuperAdmin => RoleKind::SuperAdmin,
            Role::Admin => RoleKind::Admin,
            Role::Headmaster => RoleKind::Headmaster,
            Role::ViceHeadmaster => RoleKind::ViceHeadmaster,
            Role::AcademicTeacher(_) => RoleKind::AcademicTeacher,
            Role::Teacher(_) => RoleKind::Teacher,
            Role::Student => RoleKind::Student,
            Role::Parent => RoleKind::Parent,
        }
    }

    pub fn sub_role(&self) -> Option<TeacherSpecialization> {
        match self {
            Role::AcademicTeacher(sub) | Role::Teacher(sub) => *sub,
            _ => None,
        }
    }
}

impl From<RoleKind> for Role {
    fn from(kind: RoleKind) -> Self {
        match kind {
            RoleKind::SuperAdmin => Role::SuperAdmin,
            RoleKind::Admin => Role::Admin,
            RoleKind::Headmaster => Role::Headmaster,
            RoleKind::ViceHeadmaster => Role::ViceHeadmaster,
            RoleKind::AcademicTeacher => Role::AcademicTeacher(None),
            RoleKind::Teacher => Role::Teacher(None),
            RoleKind::Student => Role::Student,
            RoleKind::Parent => Role::Parent,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.sub_role() {
            Some(sub) => write!(f, "{}/{}", self.kind(), sub),
            None => f.write_str(self.kind().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_kind_round_trips_through_its_name() {
        for kind in RoleKind::ALL {
            assert_eq!(kind.as_str().parse::<RoleKind>().unwrap(), kind);
        }
        assert_eq!(
            "janitor".parse::<RoleKind>(),
            Err(RoleError::UnknownRole("janitor".into()))
        );
    }

    #[test]
    fn sub_role_only_fits_the_teacher_family() {
        let sub = Some(TeacherSpecialization::ClassTeacher);

        let teacher = Role::from_parts(RoleKind::Teacher, sub).unwrap();
        assert_eq!(teacher.sub_role(), sub);

        let academic = Role::from_parts(RoleKind::AcademicTeacher, sub).unwrap();
        assert_eq!(academic.kind(), RoleKind::AcademicTeacher);

        assert_eq!(
            Role::from_parts(RoleKind::Admin, sub),
            Err(RoleError::SubRoleNotAllowed(RoleKind::Admin))
        );
        assert_eq!(Role::from_parts(RoleKind::Admin, None), Ok(Role::Admin));
    }

    #[test]
    fn serialized_form_keeps_role_and_sub_role_fields() {
        let role = Role::Teacher(Some(TeacherSpecialization::NormalTeacher));
        let json = serde_json::to_value(role).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "teacher", "sub_role": "normal_teacher"})
        );

        let admin = serde_json::to_value(Role::Admin).unwrap();
        assert_eq!(admin, serde_json::json!({"role": "admin"}));
    }

    #[test]
    fn display_includes_specialization() {
        let role = Role::Teacher(Some(TeacherSpecialization::SubjectTeacher));
        assert_eq!(role.to_string(), "teacher/subject_teacher");
        assert_eq!(Role::ViceHeadmaster.to_string(), "vice_headmaster");
    }
}
