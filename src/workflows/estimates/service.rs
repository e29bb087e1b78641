use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{
    EnrolmentFact, NewScenario, RowId, Scenario, ScenarioId, ScenarioRow, INITIAL_VERSION,
};
use super::lifecycle::{audit_line, ApprovalEffect, LifecycleError, ScenarioState};
use super::projection::{project, ProjectionError, ProjectionRequest, SkippedFact};
use super::reference::ReferenceError;
use super::repository::{EstimatesRepository, RepositoryError, RowEdit};
use super::roles::{RequestContext, RoleClass, RoleError};
use super::rules::{Rule, RuleDefinition, RuleError, RuleResolver};
use super::settings::PlanningSettings;
use super::summary::{compare, pivot_by_study_period, FactComparison, FactSummary, StudyPeriodPivotRow};

/// Inputs for generating a new scenario from an actuals snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateScenarioRequest {
    pub scenario_name: String,
    pub actual_name: String,
    pub base_scenario_id: ScenarioId,
    /// Rule names in priority order; a later rule overrides an earlier one.
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// Externally prepared scenario data (budgets, earlier load plans) loaded as a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportScenarioRequest {
    pub scenario_name: String,
    pub version_name: String,
    #[serde(default)]
    pub notes: String,
    pub facts: Vec<EnrolmentFact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEditsRequest {
    pub edits: Vec<RowEdit>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVersionRequest {
    /// Defaults to `v{n}` where `n` counts the existing versions.
    #[serde(default)]
    pub version_name: Option<String>,
    pub edits: Vec<RowEdit>,
    #[serde(default)]
    pub note: String,
}

/// A persisted scenario version and the number of rows stored with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredVersion {
    pub scenario: Scenario,
    pub rows_inserted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedScenario {
    pub scenario: Scenario,
    pub rows_inserted: usize,
    pub total_actual: u64,
    pub total_base_estimate: u64,
    pub scale: Decimal,
    pub skipped: Vec<SkippedFact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioSummaryView {
    pub scenario: Scenario,
    pub state: ScenarioState,
    pub approved_by_caller: Option<bool>,
    pub summary: FactSummary,
}

/// Service composing the store, rule resolver, projection engine and approval lifecycle.
pub struct EstimatesService<R> {
    repository: Arc<R>,
    settings: PlanningSettings,
}

impl<R> EstimatesService<R>
where
    R: EstimatesRepository + 'static,
{
    pub fn new(repository: Arc<R>, settings: PlanningSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    pub fn settings(&self) -> &PlanningSettings {
        &self.settings
    }

    /// Validate and store a rule authored by the caller.
    pub fn create_rule(
        &self,
        ctx: &RequestContext,
        definition: RuleDefinition,
        extra_comment: &str,
    ) -> Result<Rule, EstimatesError> {
        let role = ctx.role;
        role.require(role.capabilities().can_author_rules, "author rules")?;

        let reference = self.repository.reference_data()?;
        let rule = Rule::from_definition(definition, role)?
            .constrain_to_author(role, &reference)?
            .with_extra_comment(extra_comment);
        let stored = self.repository.insert_rule(rule)?;

        info!(rule = %stored.name, owner = %role, rate = %stored.increase_by, "rule created");
        Ok(stored)
    }

    /// Rules the caller may apply when generating a scenario, in creation order.
    pub fn applicable_rules(&self, ctx: &RequestContext) -> Result<Vec<Rule>, EstimatesError> {
        let role = ctx.role;
        Ok(self
            .repository
            .rules()?
            .into_iter()
            .filter(|rule| rule.owner().map_or(false, |owner| role.may_apply_rules_of(owner)))
            .collect())
    }

    /// Project a new scenario and persist it as version `init`.
    pub fn create_scenario(
        &self,
        ctx: &RequestContext,
        request: CreateScenarioRequest,
    ) -> Result<GeneratedScenario, EstimatesError> {
        let role = ctx.role;
        role.require(role.capabilities().can_generate, "generate estimates")?;

        let scenario_name = request.scenario_name.trim();
        if scenario_name.is_empty() {
            return Err(EstimatesError::InvalidRequest(
                "scenario_name must not be empty".to_string(),
            ));
        }

        let actual = self
            .repository
            .actual(&request.actual_name)?
            .ok_or_else(|| RepositoryError::not_found("actual", &request.actual_name))?;
        let base = self.require_scenario(request.base_scenario_id)?;
        let base_facts: Vec<EnrolmentFact> = self
            .repository
            .rows(base.id)?
            .into_iter()
            .map(|row| row.fact)
            .collect();

        let rules = self.selected_rules(ctx, &request.rules)?;
        let resolver = RuleResolver::new(rules, self.settings.default_rate);
        let reference = self.repository.reference_data()?;
        let current_period = self.settings.current_period();
        let horizon = self.settings.horizon();

        let outcome = project(&ProjectionRequest {
            actuals: &actual.facts,
            base: &base_facts,
            current_period: &current_period,
            horizon: &horizon,
            resolver: &resolver,
            reference: Some(&reference),
        })?;

        if !outcome.skipped.is_empty() {
            warn!(
                actual = %actual.actual_name,
                skipped = outcome.skipped.len(),
                "actual facts left out of the projection"
            );
        }

        let mut notes = vec![format!(
            "Generated from actual '{}' and base '{}' with rules [{}], default rate {}",
            actual.actual_name,
            base.label(),
            request.rules.join(", "),
            self.settings.default_rate
        )];
        if !request.notes.trim().is_empty() {
            notes.insert(0, request.notes.trim().to_string());
        }

        let header = NewScenario {
            scenario_name: scenario_name.to_string(),
            version_name: INITIAL_VERSION.to_string(),
            notes: notes.join("\n"),
            created_by: ctx.user.clone(),
            created_at: Utc::now(),
        };
        let stored = self.persist_version(header, outcome.facts)?;

        info!(
            scenario_id = %stored.scenario.id,
            scenario = %stored.scenario.label(),
            rows = stored.rows_inserted,
            by = %ctx.user,
            "scenario generated"
        );

        Ok(GeneratedScenario {
            scenario: stored.scenario,
            rows_inserted: stored.rows_inserted,
            total_actual: outcome.total_actual,
            total_base_estimate: outcome.total_base_estimate,
            scale: outcome.scale,
            skipped: outcome.skipped,
        })
    }

    /// Load externally prepared scenario data as a new version. Admin only.
    pub fn import_scenario(
        &self,
        ctx: &RequestContext,
        request: ImportScenarioRequest,
    ) -> Result<StoredVersion, EstimatesError> {
        let role = ctx.role;
        role.require(role.class() == RoleClass::Admin, "import scenarios")?;

        if request.scenario_name.trim().is_empty() || request.version_name.trim().is_empty() {
            return Err(EstimatesError::InvalidRequest(
                "scenario_name and version_name must not be empty".to_string(),
            ));
        }
        self.repository
            .reference_data()?
            .validate_facts(&request.facts)?;

        let header = NewScenario {
            scenario_name: request.scenario_name.trim().to_string(),
            version_name: request.version_name.trim().to_string(),
            notes: request.notes,
            created_by: ctx.user.clone(),
            created_at: Utc::now(),
        };
        let stored = self.persist_version(header, request.facts)?;
        info!(scenario_id = %stored.scenario.id, rows = stored.rows_inserted, "scenario imported");
        Ok(stored)
    }

    pub fn scenario_summary(
        &self,
        ctx: &RequestContext,
        id: ScenarioId,
    ) -> Result<ScenarioSummaryView, EstimatesError> {
        let scenario = self.require_scenario(id)?;
        let rows = self.visible_rows(ctx, id)?;
        let approved_by_caller = scenario.has_role_approved(ctx.role).ok();

        Ok(ScenarioSummaryView {
            state: scenario.state(),
            approved_by_caller,
            summary: FactSummary::from_facts(rows.iter().map(|row| &row.fact)),
            scenario,
        })
    }

    /// Period and faculty deltas from `baseline` to `candidate`, within the caller's view.
    pub fn compare_scenarios(
        &self,
        ctx: &RequestContext,
        baseline: ScenarioId,
        candidate: ScenarioId,
    ) -> Result<FactComparison, EstimatesError> {
        let summarize = |id: ScenarioId| -> Result<FactSummary, EstimatesError> {
            self.require_scenario(id)?;
            let rows = self.visible_rows(ctx, id)?;
            Ok(FactSummary::from_facts(rows.iter().map(|row| &row.fact)))
        };
        Ok(compare(&summarize(baseline)?, &summarize(candidate)?))
    }

    pub fn actual_pivot(&self, actual_name: &str) -> Result<Vec<StudyPeriodPivotRow>, EstimatesError> {
        let actual = self
            .repository
            .actual(actual_name)?
            .ok_or_else(|| RepositoryError::not_found("actual", actual_name))?;
        Ok(pivot_by_study_period(&actual.facts))
    }

    /// Rows the caller may edit. Faculty roles see their own faculty only; roles without
    /// edit rights and final versions yield nothing.
    pub fn editable_rows(
        &self,
        ctx: &RequestContext,
        id: ScenarioId,
    ) -> Result<Vec<ScenarioRow>, EstimatesError> {
        let scenario = self.require_scenario(id)?;
        if !ctx.role.capabilities().can_edit || scenario.is_final {
            return Ok(Vec::new());
        }
        self.visible_rows(ctx, id)
    }

    /// Write edits back into the version in place.
    pub fn save_to_current_version(
        &self,
        ctx: &RequestContext,
        id: ScenarioId,
        request: SaveEditsRequest,
    ) -> Result<Scenario, EstimatesError> {
        let role = ctx.role;
        role.require(role.capabilities().can_edit, "edit scenario rows")?;

        let read = self.require_scenario(id)?;
        read.ensure_mutable()?;
        let rows = self.repository.rows(id)?;
        self.check_edits(ctx, id, &rows, &request.edits)?;

        let mut scenario = read.clone();
        let note = change_note(&request.note, request.edits.len(), "updated");
        scenario.record_change(&note, Utc::now(), &ctx.user);
        self.repository.update_rows(&read, &scenario, &request.edits)?;

        info!(scenario_id = %id, rows = request.edits.len(), by = %ctx.user, "scenario version updated");
        Ok(scenario)
    }

    /// Copy every row of the version into a new version, then apply the edits there.
    pub fn save_to_new_version(
        &self,
        ctx: &RequestContext,
        id: ScenarioId,
        request: NewVersionRequest,
    ) -> Result<StoredVersion, EstimatesError> {
        let role = ctx.role;
        role.require(role.capabilities().can_edit, "edit scenario rows")?;

        let source = self.require_scenario(id)?;
        source.ensure_mutable()?;
        let rows = self.repository.rows(id)?;
        self.check_edits(ctx, id, &rows, &request.edits)?;

        let version_name = match request.version_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let existing = self.repository.scenario_versions(&source.scenario_name)?;
                format!("v{}", existing.len())
            }
        };

        let edits: BTreeMap<RowId, u64> = request
            .edits
            .iter()
            .map(|edit| (edit.row_id, edit.enrolment_count))
            .collect();
        let facts = rows
            .into_iter()
            .map(|row| {
                let mut fact = row.fact;
                if let Some(count) = edits.get(&row.id) {
                    fact.enrolment_count = *count;
                }
                fact
            })
            .collect();

        let now = Utc::now();
        let note = format!(
            "copied from {}; {}",
            source.label(),
            change_note(&request.note, edits.len(), "changed")
        );
        let header = NewScenario {
            scenario_name: source.scenario_name.clone(),
            version_name,
            notes: audit_line(&note, now, &ctx.user),
            created_by: ctx.user.clone(),
            created_at: now,
        };
        let stored = self.persist_version(header, facts)?;

        info!(
            source = %id,
            scenario_id = %stored.scenario.id,
            version = %stored.scenario.version_name,
            by = %ctx.user,
            "scenario version branched"
        );
        Ok(stored)
    }

    /// Faculty roles confirm their faculty; admin roles finalize.
    pub fn approve(&self, ctx: &RequestContext, id: ScenarioId) -> Result<Scenario, EstimatesError> {
        let read = self.require_scenario(id)?;
        let mut scenario = read.clone();
        let now = Utc::now();
        let effect = scenario.approve(ctx.role, now, &ctx.user)?;

        let note = match effect {
            ApprovalEffect::FacultyConfirmed { faculty } => {
                format!("confirmed for {}", faculty.short_label())
            }
            ApprovalEffect::Finalized => "marked final".to_string(),
        };
        scenario.record_change(&note, now, &ctx.user);
        self.repository.update_scenario(&read, &scenario)?;

        info!(scenario_id = %id, role = %ctx.role, state = scenario.state().label(), "scenario approved");
        Ok(scenario)
    }

    /// Delete a non-final version and its rows. Admin only.
    pub fn delete_scenario_version(&self, ctx: &RequestContext, id: ScenarioId) -> Result<(), EstimatesError> {
        let role = ctx.role;
        role.require(role.class() == RoleClass::Admin, "delete scenario versions")?;

        let scenario = self.require_scenario(id)?;
        scenario.ensure_mutable()?;
        self.repository.delete_scenario(id)?;

        info!(scenario_id = %id, scenario = %scenario.label(), by = %ctx.user, "scenario version deleted");
        Ok(())
    }

    fn require_scenario(&self, id: ScenarioId) -> Result<Scenario, EstimatesError> {
        self.repository
            .scenario(id)?
            .ok_or_else(|| RepositoryError::not_found("scenario", id).into())
    }

    fn visible_rows(&self, ctx: &RequestContext, id: ScenarioId) -> Result<Vec<ScenarioRow>, EstimatesError> {
        Ok(self
            .repository
            .rows(id)?
            .into_iter()
            .filter(|row| ctx.role.covers_faculty(&row.fact.owning_faculty))
            .collect())
    }

    fn selected_rules(&self, ctx: &RequestContext, names: &[String]) -> Result<Vec<Rule>, EstimatesError> {
        let stored = self.repository.rules()?;
        names
            .iter()
            .map(|name| -> Result<Rule, EstimatesError> {
                let rule = stored
                    .iter()
                    .find(|rule| &rule.name == name)
                    .ok_or_else(|| RepositoryError::not_found("rule", name))?;
                let allowed = rule
                    .owner()
                    .map_or(false, |owner| ctx.role.may_apply_rules_of(owner));
                ctx.role.require(allowed, "apply the selected rule")?;
                Ok(rule.clone())
            })
            .collect()
    }

    fn check_edits(
        &self,
        ctx: &RequestContext,
        id: ScenarioId,
        rows: &[ScenarioRow],
        edits: &[RowEdit],
    ) -> Result<(), EstimatesError> {
        if edits.is_empty() {
            return Err(EstimatesError::InvalidRequest("no row edits supplied".to_string()));
        }
        for edit in edits {
            let row = rows
                .iter()
                .find(|row| row.id == edit.row_id)
                .ok_or_else(|| RepositoryError::not_found("scenario row", format!("{} in {id}", edit.row_id.0)))?;
            ctx.role.require_faculty(&row.fact.owning_faculty)?;
        }
        Ok(())
    }

    fn persist_version(
        &self,
        header: NewScenario,
        facts: Vec<EnrolmentFact>,
    ) -> Result<StoredVersion, EstimatesError> {
        let scenario = self.repository.insert_scenario(header)?;
        match self.repository.insert_rows(scenario.id, facts) {
            Ok(rows_inserted) => Ok(StoredVersion {
                scenario,
                rows_inserted,
            }),
            Err(err) => {
                match self.repository.delete_scenario(scenario.id) {
                    Ok(()) => warn!(scenario_id = %scenario.id, error = %err, "row insert failed; scenario header rolled back"),
                    Err(rollback) => error!(
                        scenario_id = %scenario.id,
                        error = %err,
                        rollback_error = %rollback,
                        "row insert failed and scenario header could not be rolled back"
                    ),
                }
                Err(err.into())
            }
        }
    }
}

fn change_note(note: &str, rows: usize, verb: &str) -> String {
    let note = note.trim();
    if note.is_empty() {
        format!("{verb} {rows} row(s)")
    } else {
        format!("{verb} {rows} row(s): {note}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EstimatesError {
    #[error(transparent)]
    Role(#[from] RoleError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Lifecycle(LifecycleError),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<LifecycleError> for EstimatesError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Role(err) => Self::Role(err),
            other => Self::Lifecycle(other),
        }
    }
}

impl From<RepositoryError> for EstimatesError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Finalized { scenario_id, label } => {
                Self::Lifecycle(LifecycleError::ScenarioFinalized { scenario_id, label })
            }
            other => Self::Repository(other),
        }
    }
}
