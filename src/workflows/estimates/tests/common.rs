use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::workflows::estimates::domain::{
    Actual, EnrolmentFact, NewScenario, Scenario, ScenarioId, ScenarioRow, StudyPeriod,
};
use crate::workflows::estimates::reference::{FeeLiabilityType, ReferenceData};
use crate::workflows::estimates::repository::{
    EstimatesRepository, InMemoryEstimatesRepository, RepositoryError, RowEdit,
};
use crate::workflows::estimates::roles::RequestContext;
use crate::workflows::estimates::rules::Rule;
use crate::workflows::estimates::service::{EstimatesService, ImportScenarioRequest};
use crate::workflows::estimates::settings::PlanningSettings;

pub(super) const ARTS: &str = "Faculty of Arts";
pub(super) const MQBS: &str = "Macquarie Business School";
pub(super) const SCI: &str = "Faculty of Science and Engineering";
pub(super) const DOMESTIC: &str = "Domestic Fee Paying";
pub(super) const INTERNATIONAL: &str = "International Fee Paying";
pub(super) const ACTUAL_NAME: &str = "March 2025";

pub(super) fn reference() -> ReferenceData {
    ReferenceData::default()
        .with_course("Bachelor of Arts", ARTS)
        .with_course("Bachelor of Commerce", MQBS)
        .with_course("Bachelor of Engineering", SCI)
        .with_course_level("Undergraduate")
        .with_course_level("Postgraduate")
        .with_fee_liability_group(DOMESTIC, FeeLiabilityType::Domestic)
        .with_fee_liability_group(INTERNATIONAL, FeeLiabilityType::International)
}

pub(super) fn settings() -> PlanningSettings {
    PlanningSettings {
        default_rate: dec!(0.03),
        current_year: 2025,
        horizon_years: 2,
    }
}

pub(super) fn fact(
    course: &str,
    faculty: &str,
    study_period: StudyPeriod,
    fee_liability_group: &str,
    count: u64,
) -> EnrolmentFact {
    EnrolmentFact {
        course: course.to_string(),
        period: "2025".to_string(),
        commencing_study_period: study_period,
        owning_faculty: faculty.to_string(),
        course_level: "Undergraduate".to_string(),
        fee_liability_group: fee_liability_group.to_string(),
        enrolment_count: count,
    }
}

/// Session 1 estimates total 800; Bachelor of Arts Session 2 carries 400.
pub(super) fn base_facts() -> Vec<EnrolmentFact> {
    vec![
        fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 500),
        fact("Bachelor of Commerce", MQBS, StudyPeriod::Session1, DOMESTIC, 300),
        fact("Bachelor of Arts", ARTS, StudyPeriod::Session2, DOMESTIC, 400),
        fact("Bachelor of Commerce", MQBS, StudyPeriod::Term1, INTERNATIONAL, 40),
    ]
}

/// Session 1 actuals total 1000.
pub(super) fn actual_facts() -> Vec<EnrolmentFact> {
    vec![
        fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 600),
        fact("Bachelor of Commerce", MQBS, StudyPeriod::Session1, DOMESTIC, 400),
    ]
}

pub(super) fn ctx(role: &str) -> RequestContext {
    RequestContext::from_identity(role, role.to_ascii_lowercase()).expect("known role")
}

pub(super) fn admin() -> RequestContext {
    ctx("G1_ADMIN")
}

pub(super) struct Seeded {
    pub(super) service: EstimatesService<InMemoryEstimatesRepository>,
    pub(super) repository: Arc<InMemoryEstimatesRepository>,
    pub(super) base_id: ScenarioId,
}

/// Store with reference data, one actual snapshot and an imported base scenario.
pub(super) fn seeded() -> Seeded {
    let repository = Arc::new(InMemoryEstimatesRepository::new(reference()));
    repository
        .load_actual(Actual {
            actual_name: ACTUAL_NAME.to_string(),
            facts: actual_facts(),
        })
        .expect("actual loads");

    let service = EstimatesService::new(repository.clone(), settings());
    let base = service
        .import_scenario(
            &admin(),
            ImportScenarioRequest {
                scenario_name: "2025 Budget".to_string(),
                version_name: "published".to_string(),
                notes: String::new(),
                facts: base_facts(),
            },
        )
        .expect("base imports");

    Seeded {
        service,
        repository,
        base_id: base.scenario.id,
    }
}

pub(super) fn row_for<'a>(rows: &'a [ScenarioRow], course: &str, period: &str, study_period: StudyPeriod) -> &'a ScenarioRow {
    rows.iter()
        .find(|row| {
            row.fact.course == course
                && row.fact.period == period
                && row.fact.commencing_study_period == study_period
        })
        .expect("row present")
}

/// Delegates to the in-memory store but refuses bulk row inserts.
pub(super) struct FailingRowsRepository {
    pub(super) inner: InMemoryEstimatesRepository,
    pub(super) fail_rollback: bool,
}

impl FailingRowsRepository {
    pub(super) fn new(fail_rollback: bool) -> Self {
        Self {
            inner: InMemoryEstimatesRepository::new(reference()),
            fail_rollback,
        }
    }
}

impl EstimatesRepository for FailingRowsRepository {
    fn reference_data(&self) -> Result<ReferenceData, RepositoryError> {
        self.inner.reference_data()
    }

    fn actual(&self, actual_name: &str) -> Result<Option<Actual>, RepositoryError> {
        self.inner.actual(actual_name)
    }

    fn insert_scenario(&self, header: NewScenario) -> Result<Scenario, RepositoryError> {
        self.inner.insert_scenario(header)
    }

    fn update_scenario(&self, expected: &Scenario, updated: &Scenario) -> Result<(), RepositoryError> {
        self.inner.update_scenario(expected, updated)
    }

    fn delete_scenario(&self, id: ScenarioId) -> Result<(), RepositoryError> {
        if self.fail_rollback {
            return Err(RepositoryError::Unavailable("delete rejected".to_string()));
        }
        self.inner.delete_scenario(id)
    }

    fn scenario(&self, id: ScenarioId) -> Result<Option<Scenario>, RepositoryError> {
        self.inner.scenario(id)
    }

    fn scenario_versions(&self, scenario_name: &str) -> Result<Vec<Scenario>, RepositoryError> {
        self.inner.scenario_versions(scenario_name)
    }

    fn insert_rows(&self, _id: ScenarioId, _facts: Vec<EnrolmentFact>) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable("bulk insert timed out".to_string()))
    }

    fn rows(&self, id: ScenarioId) -> Result<Vec<ScenarioRow>, RepositoryError> {
        self.inner.rows(id)
    }

    fn update_rows(
        &self,
        expected: &Scenario,
        updated: &Scenario,
        edits: &[RowEdit],
    ) -> Result<(), RepositoryError> {
        self.inner.update_rows(expected, updated, edits)
    }

    fn insert_rule(&self, rule: Rule) -> Result<Rule, RepositoryError> {
        self.inner.insert_rule(rule)
    }

    fn rules(&self) -> Result<Vec<Rule>, RepositoryError> {
        self.inner.rules()
    }
}

pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn offline<T>() -> Result<T, RepositoryError> {
        Err(RepositoryError::Unavailable("warehouse offline".to_string()))
    }
}

impl EstimatesRepository for UnavailableRepository {
    fn reference_data(&self) -> Result<ReferenceData, RepositoryError> {
        Self::offline()
    }

    fn actual(&self, _actual_name: &str) -> Result<Option<Actual>, RepositoryError> {
        Self::offline()
    }

    fn insert_scenario(&self, _header: NewScenario) -> Result<Scenario, RepositoryError> {
        Self::offline()
    }

    fn update_scenario(&self, _expected: &Scenario, _updated: &Scenario) -> Result<(), RepositoryError> {
        Self::offline()
    }

    fn delete_scenario(&self, _id: ScenarioId) -> Result<(), RepositoryError> {
        Self::offline()
    }

    fn scenario(&self, _id: ScenarioId) -> Result<Option<Scenario>, RepositoryError> {
        Self::offline()
    }

    fn scenario_versions(&self, _scenario_name: &str) -> Result<Vec<Scenario>, RepositoryError> {
        Self::offline()
    }

    fn insert_rows(&self, _id: ScenarioId, _facts: Vec<EnrolmentFact>) -> Result<usize, RepositoryError> {
        Self::offline()
    }

    fn rows(&self, _id: ScenarioId) -> Result<Vec<ScenarioRow>, RepositoryError> {
        Self::offline()
    }

    fn update_rows(
        &self,
        _expected: &Scenario,
        _updated: &Scenario,
        _edits: &[RowEdit],
    ) -> Result<(), RepositoryError> {
        Self::offline()
    }

    fn insert_rule(&self, _rule: Rule) -> Result<Rule, RepositoryError> {
        Self::offline()
    }

    fn rules(&self) -> Result<Vec<Rule>, RepositoryError> {
        Self::offline()
    }
}

/// What another writer does to a header between the service reading and writing it.
#[derive(Debug, Clone, Copy)]
pub(super) enum Interference {
    Finalize,
    AddNote,
}

/// Delegates to the in-memory store, letting a second writer change the stored header
/// just before every header write.
pub(super) struct RacingRepository {
    pub(super) inner: InMemoryEstimatesRepository,
    interference: Interference,
}

impl RacingRepository {
    pub(super) fn new(interference: Interference) -> Self {
        Self {
            inner: InMemoryEstimatesRepository::new(reference()),
            interference,
        }
    }

    fn interfere(&self, id: ScenarioId) -> Result<(), RepositoryError> {
        let stored = self
            .inner
            .scenario(id)?
            .ok_or_else(|| RepositoryError::not_found("scenario", id))?;
        let mut changed = stored.clone();
        match self.interference {
            Interference::Finalize => changed.is_final = true,
            Interference::AddNote => changed.record_change("reviewed offline", Utc::now(), "other-planner"),
        }
        self.inner.update_scenario(&stored, &changed)
    }
}

impl EstimatesRepository for RacingRepository {
    fn reference_data(&self) -> Result<ReferenceData, RepositoryError> {
        self.inner.reference_data()
    }

    fn actual(&self, actual_name: &str) -> Result<Option<Actual>, RepositoryError> {
        self.inner.actual(actual_name)
    }

    fn insert_scenario(&self, header: NewScenario) -> Result<Scenario, RepositoryError> {
        self.inner.insert_scenario(header)
    }

    fn update_scenario(&self, expected: &Scenario, updated: &Scenario) -> Result<(), RepositoryError> {
        self.interfere(expected.id)?;
        self.inner.update_scenario(expected, updated)
    }

    fn delete_scenario(&self, id: ScenarioId) -> Result<(), RepositoryError> {
        self.inner.delete_scenario(id)
    }

    fn scenario(&self, id: ScenarioId) -> Result<Option<Scenario>, RepositoryError> {
        self.inner.scenario(id)
    }

    fn scenario_versions(&self, scenario_name: &str) -> Result<Vec<Scenario>, RepositoryError> {
        self.inner.scenario_versions(scenario_name)
    }

    fn insert_rows(&self, id: ScenarioId, facts: Vec<EnrolmentFact>) -> Result<usize, RepositoryError> {
        self.inner.insert_rows(id, facts)
    }

    fn rows(&self, id: ScenarioId) -> Result<Vec<ScenarioRow>, RepositoryError> {
        self.inner.rows(id)
    }

    fn update_rows(
        &self,
        expected: &Scenario,
        updated: &Scenario,
        edits: &[RowEdit],
    ) -> Result<(), RepositoryError> {
        self.interfere(expected.id)?;
        self.inner.update_rows(expected, updated, edits)
    }

    fn insert_rule(&self, rule: Rule) -> Result<Rule, RepositoryError> {
        self.inner.insert_rule(rule)
    }

    fn rules(&self) -> Result<Vec<Rule>, RepositoryError> {
        self.inner.rules()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
