//! Role capability table.
//!
//! Every role the identity provider can hand us is a row in [`ROLE_TABLE`]; adding a
//! role is a new row, not a new branch. The table is consulted once per request to turn
//! the raw role string into a [`Role`].

use serde::Serialize;
use std::fmt;

use super::domain::FacultyGroup;
use super::reference::FeeLiabilityType;

/// Broad family a role belongs to; rule visibility is expressed over these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleClass {
    Admin,
    Faculty,
    Recruitment,
}

/// What a role may see and do inside the planner.
#[derive(Debug, PartialEq, Eq)]
pub struct RoleCapabilities {
    pub identifier: &'static str,
    pub class: RoleClass,
    /// Faculty the role is confined to; `None` means every faculty.
    pub faculty: Option<FacultyGroup>,
    /// Fee-liability type the role may author rules for; `None` means unrestricted.
    pub fee_liability_type: Option<FeeLiabilityType>,
    /// Owner classes whose rules the role may apply when generating a scenario.
    pub applies_rules_from: &'static [RoleClass],
    pub can_author_rules: bool,
    pub can_generate: bool,
    pub can_edit: bool,
    pub can_finalize: bool,
}

const ADMIN_RULE_OWNERS: &[RoleClass] = &[RoleClass::Admin, RoleClass::Faculty, RoleClass::Recruitment];
const FACULTY_RULE_OWNERS: &[RoleClass] = &[RoleClass::Faculty, RoleClass::Recruitment];

const fn admin(identifier: &'static str) -> RoleCapabilities {
    RoleCapabilities {
        identifier,
        class: RoleClass::Admin,
        faculty: None,
        fee_liability_type: None,
        applies_rules_from: ADMIN_RULE_OWNERS,
        can_author_rules: true,
        can_generate: true,
        can_edit: true,
        can_finalize: true,
    }
}

const fn faculty(identifier: &'static str, group: FacultyGroup) -> RoleCapabilities {
    RoleCapabilities {
        identifier,
        class: RoleClass::Faculty,
        faculty: Some(group),
        fee_liability_type: None,
        applies_rules_from: FACULTY_RULE_OWNERS,
        can_author_rules: true,
        can_generate: true,
        can_edit: true,
        can_finalize: false,
    }
}

const fn recruitment(identifier: &'static str, kind: FeeLiabilityType) -> RoleCapabilities {
    RoleCapabilities {
        identifier,
        class: RoleClass::Recruitment,
        faculty: None,
        fee_liability_type: Some(kind),
        applies_rules_from: &[],
        can_author_rules: true,
        can_generate: false,
        can_edit: false,
        can_finalize: false,
    }
}

pub static ROLE_TABLE: [RoleCapabilities; 8] = [
    admin("ACCOUNTADMIN"),
    admin("G1_ADMIN"),
    faculty("G1_FACULTY_ARTS", FacultyGroup::Arts),
    faculty("G1_FACULTY_MQBS", FacultyGroup::Mqbs),
    faculty("G1_FACULTY_SCI", FacultyGroup::Sci),
    faculty("G1_FACULTY_FMHHS", FacultyGroup::Fmhhs),
    recruitment("G1_RECRUITMENT_INTERNATIONAL", FeeLiabilityType::International),
    recruitment("G1_RECRUITMENT_DOMESTIC", FeeLiabilityType::Domestic),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("role '{role}' is not recognized for {action}")]
    RoleNotRecognized { role: String, action: &'static str },
    #[error("role '{role}' is not permitted to {action}")]
    NotPermitted { role: String, action: &'static str },
    #[error("role '{role}' may not access rows owned by '{owning_faculty}'")]
    FacultyScopeViolation {
        role: String,
        owning_faculty: String,
    },
}

/// A resolved role; cheap to copy, backed by a [`ROLE_TABLE`] row.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Role(&'static RoleCapabilities);

impl Role {
    pub fn from_identifier(identifier: &str) -> Result<Self, RoleError> {
        let normalized = identifier.trim().trim_matches('"');
        ROLE_TABLE
            .iter()
            .find(|entry| entry.identifier.eq_ignore_ascii_case(normalized))
            .map(Role)
            .ok_or_else(|| RoleError::RoleNotRecognized {
                role: identifier.to_string(),
                action: "session",
            })
    }

    pub fn identifier(self) -> &'static str {
        self.0.identifier
    }

    pub fn capabilities(self) -> &'static RoleCapabilities {
        self.0
    }

    pub fn class(self) -> RoleClass {
        self.0.class
    }

    pub fn faculty(self) -> Option<FacultyGroup> {
        self.0.faculty
    }

    /// Whether facts owned by `owning_faculty` fall inside this role's view.
    pub fn covers_faculty(self, owning_faculty: &str) -> bool {
        match self.0.faculty {
            Some(group) => group.faculty_name() == owning_faculty,
            None => true,
        }
    }

    /// Whether a rule authored by `owner` may be applied by this role.
    pub fn may_apply_rules_of(self, owner: Role) -> bool {
        if !self.0.applies_rules_from.contains(&owner.class()) {
            return false;
        }
        match (owner.class(), self.faculty()) {
            (RoleClass::Faculty, Some(own)) => owner.faculty() == Some(own),
            _ => true,
        }
    }

    pub fn require(self, allowed: bool, action: &'static str) -> Result<(), RoleError> {
        if allowed {
            Ok(())
        } else {
            Err(RoleError::NotPermitted {
                role: self.identifier().to_string(),
                action,
            })
        }
    }

    pub fn require_faculty(self, owning_faculty: &str) -> Result<(), RoleError> {
        if self.covers_faculty(owning_faculty) {
            Ok(())
        } else {
            Err(RoleError::FacultyScopeViolation {
                role: self.identifier().to_string(),
                owning_faculty: owning_faculty.to_string(),
            })
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Role").field(&self.0.identifier).finish()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.identifier)
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.identifier)
    }
}

/// Caller identity handed to every service operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub role: Role,
    pub user: String,
}

impl RequestContext {
    pub fn new(role: Role, user: impl Into<String>) -> Self {
        Self {
            role,
            user: user.into(),
        }
    }

    pub fn from_identity(role: &str, user: impl Into<String>) -> Result<Self, RoleError> {
        Ok(Self::new(Role::from_identifier(role)?, user))
    }
}
