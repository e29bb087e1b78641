use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{FacultyGroup, Scenario, ScenarioId};
use super::roles::{Role, RoleClass, RoleError};

/// Approval state derived from a scenario header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Draft,
    PartiallyConfirmed,
    Final,
}

impl ScenarioState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::PartiallyConfirmed => "Confirmed by some faculties",
            Self::Final => "Final",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("scenario {scenario_id} ({label}) is final and can no longer change")]
    ScenarioFinalized {
        scenario_id: ScenarioId,
        label: String,
    },
    #[error(transparent)]
    Role(#[from] RoleError),
}

/// Result of a successful approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ApprovalEffect {
    FacultyConfirmed { faculty: FacultyGroup },
    Finalized,
}

impl Scenario {
    pub fn state(&self) -> ScenarioState {
        if self.is_final {
            ScenarioState::Final
        } else if self.confirmed_by.is_empty() {
            ScenarioState::Draft
        } else {
            ScenarioState::PartiallyConfirmed
        }
    }

    pub fn ensure_mutable(&self) -> Result<(), LifecycleError> {
        if self.is_final {
            return Err(LifecycleError::ScenarioFinalized {
                scenario_id: self.id,
                label: self.label(),
            });
        }
        Ok(())
    }

    /// Record an approval. Faculty roles confirm their own faculty; admin roles finalize.
    pub fn approve(&mut self, role: Role, at: DateTime<Utc>, user: &str) -> Result<ApprovalEffect, LifecycleError> {
        self.ensure_mutable()?;

        let effect = match (role.class(), role.faculty()) {
            (RoleClass::Faculty, Some(faculty)) => {
                self.confirmed_by.insert(faculty);
                ApprovalEffect::FacultyConfirmed { faculty }
            }
            (RoleClass::Admin, _) if role.capabilities().can_finalize => {
                self.is_final = true;
                ApprovalEffect::Finalized
            }
            _ => {
                return Err(RoleError::RoleNotRecognized {
                    role: role.identifier().to_string(),
                    action: "approval",
                }
                .into())
            }
        };

        self.touch(at, user);
        Ok(effect)
    }

    pub fn has_role_approved(&self, role: Role) -> Result<bool, LifecycleError> {
        match (role.class(), role.faculty()) {
            (RoleClass::Faculty, Some(faculty)) => Ok(self.is_confirmed_by(faculty)),
            (RoleClass::Admin, _) => Ok(self.is_final),
            _ => Err(RoleError::RoleNotRecognized {
                role: role.identifier().to_string(),
                action: "approval",
            }
            .into()),
        }
    }

    /// Append an audit line to the notes and refresh the update stamp.
    pub fn record_change(&mut self, note: &str, at: DateTime<Utc>, user: &str) {
        let line = audit_line(note, at, user);
        if self.notes.trim().is_empty() {
            self.notes = line;
        } else {
            self.notes = format!("{}\n{}", self.notes.trim_end(), line);
        }
        self.touch(at, user);
    }

    fn touch(&mut self, at: DateTime<Utc>, user: &str) {
        self.updated_at = at;
        self.updated_by = user.to_string();
    }
}

/// `[2025-04-02 14:30] user: note`
pub fn audit_line(note: &str, at: DateTime<Utc>, user: &str) -> String {
    format!("[{}] {}: {}", at.format("%Y-%m-%d %H:%M"), user, note.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::estimates::domain::NewScenario;
    use chrono::TimeZone;

    fn scenario() -> Scenario {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 28, 9, 0, 0).unwrap();
        NewScenario {
            scenario_name: "2025 Load Plan".to_string(),
            version_name: "init".to_string(),
            notes: String::new(),
            created_by: "analyst".to_string(),
            created_at,
        }
        .into_scenario(ScenarioId(7))
    }

    fn role(identifier: &str) -> Role {
        Role::from_identifier(identifier).expect("known role")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 14, 30, 0).unwrap()
    }

    #[test]
    fn new_scenarios_start_in_draft() {
        assert_eq!(scenario().state(), ScenarioState::Draft);
    }

    #[test]
    fn faculty_approval_confirms_only_that_faculty() {
        let mut scenario = scenario();
        let effect = scenario
            .approve(role("G1_FACULTY_SCI"), now(), "sci-lead")
            .expect("faculty can approve");

        assert_eq!(
            effect,
            ApprovalEffect::FacultyConfirmed {
                faculty: FacultyGroup::Sci
            }
        );
        assert_eq!(scenario.state(), ScenarioState::PartiallyConfirmed);
        assert!(scenario.is_confirmed_by(FacultyGroup::Sci));
        assert!(!scenario.is_confirmed_by(FacultyGroup::Arts));
        assert!(!scenario.is_final);
        assert_eq!(scenario.updated_by, "sci-lead");
    }

    #[test]
    fn admin_approval_finalizes_without_faculty_confirmations() {
        let mut scenario = scenario();
        let effect = scenario
            .approve(role("ACCOUNTADMIN"), now(), "bir")
            .expect("admin can approve");
        assert_eq!(effect, ApprovalEffect::Finalized);
        assert_eq!(scenario.state(), ScenarioState::Final);
    }

    #[test]
    fn recruitment_roles_have_no_approval_branch() {
        let mut scenario = scenario();
        match scenario.approve(role("G1_RECRUITMENT_INTERNATIONAL"), now(), "recruiter") {
            Err(LifecycleError::Role(RoleError::RoleNotRecognized { role, action })) => {
                assert_eq!(role, "G1_RECRUITMENT_INTERNATIONAL");
                assert_eq!(action, "approval");
            }
            other => panic!("expected RoleNotRecognized, got {other:?}"),
        }
        assert_eq!(scenario.state(), ScenarioState::Draft);
    }

    #[test]
    fn final_scenarios_reject_further_approvals() {
        let mut scenario = scenario();
        scenario
            .approve(role("G1_ADMIN"), now(), "bir")
            .expect("admin can approve");
        assert!(matches!(
            scenario.approve(role("G1_FACULTY_ARTS"), now(), "arts-lead"),
            Err(LifecycleError::ScenarioFinalized { .. })
        ));
        assert!(!scenario.is_confirmed_by(FacultyGroup::Arts));
    }

    #[test]
    fn has_role_approved_tracks_each_role() {
        let mut scenario = scenario();
        scenario
            .approve(role("G1_FACULTY_MQBS"), now(), "mqbs-lead")
            .expect("faculty can approve");
        assert_eq!(scenario.has_role_approved(role("G1_FACULTY_MQBS")), Ok(true));
        assert_eq!(scenario.has_role_approved(role("G1_FACULTY_FMHHS")), Ok(false));
        assert_eq!(scenario.has_role_approved(role("G1_ADMIN")), Ok(false));
        assert!(scenario
            .has_role_approved(role("G1_RECRUITMENT_DOMESTIC"))
            .is_err());
    }

    #[test]
    fn record_change_appends_audit_lines() {
        let mut scenario = scenario();
        scenario.notes = "March round".to_string();
        scenario.record_change("raised BA Session 2 to 60", now(), "arts-lead");
        assert_eq!(
            scenario.notes,
            "March round\n[2025-04-02 14:30] arts-lead: raised BA Session 2 to 60"
        );
        assert_eq!(scenario.updated_at, now());
    }
}
