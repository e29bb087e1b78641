use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::domain::{Actual, EnrolmentFact, NewScenario, RowId, Scenario, ScenarioId, ScenarioRow};
use super::reference::ReferenceData;
use super::rules::Rule;

/// A new enrolment count for one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEdit {
    pub row_id: RowId,
    pub enrolment_count: u64,
}

/// Storage abstraction over actuals, scenario versions, their rows and rules.
pub trait EstimatesRepository: Send + Sync {
    fn reference_data(&self) -> Result<ReferenceData, RepositoryError>;
    fn actual(&self, actual_name: &str) -> Result<Option<Actual>, RepositoryError>;

    fn insert_scenario(&self, header: NewScenario) -> Result<Scenario, RepositoryError>;
    /// Replace the header read as `expected` with `updated`.
    ///
    /// Fails with `Finalized` once the stored header is final and with `Conflict` when it no
    /// longer equals `expected`.
    fn update_scenario(&self, expected: &Scenario, updated: &Scenario) -> Result<(), RepositoryError>;
    /// Remove a non-final version together with every row it owns.
    fn delete_scenario(&self, id: ScenarioId) -> Result<(), RepositoryError>;
    fn scenario(&self, id: ScenarioId) -> Result<Option<Scenario>, RepositoryError>;
    /// Every version of `scenario_name`, oldest first.
    fn scenario_versions(&self, scenario_name: &str) -> Result<Vec<Scenario>, RepositoryError>;

    /// Bulk insert; either every fact is stored or none is.
    fn insert_rows(&self, id: ScenarioId, facts: Vec<EnrolmentFact>) -> Result<usize, RepositoryError>;
    fn rows(&self, id: ScenarioId) -> Result<Vec<ScenarioRow>, RepositoryError>;
    /// Apply row edits and the header change as one unit, guarded like [`update_scenario`].
    ///
    /// [`update_scenario`]: EstimatesRepository::update_scenario
    fn update_rows(
        &self,
        expected: &Scenario,
        updated: &Scenario,
        edits: &[RowEdit],
    ) -> Result<(), RepositoryError>;

    fn insert_rule(&self, rule: Rule) -> Result<Rule, RepositoryError>;
    /// Stored rules in creation order.
    fn rules(&self) -> Result<Vec<Rule>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{entity} '{key}' already exists")]
    Conflict { entity: &'static str, key: String },
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },
    #[error("scenario {scenario_id} ({label}) is final and can no longer change")]
    Finalized { scenario_id: ScenarioId, label: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, key: impl ToString) -> Self {
        Self::Conflict {
            entity,
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    reference: ReferenceData,
    actuals: BTreeMap<String, Actual>,
    scenarios: BTreeMap<ScenarioId, Scenario>,
    rows: BTreeMap<RowId, ScenarioRow>,
    rules: Vec<Rule>,
    last_scenario_id: u64,
    last_row_id: u64,
}

/// Process-local store guarding every table with one mutex.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEstimatesRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryEstimatesRepository {
    pub fn new(reference: ReferenceData) -> Self {
        let repository = Self::default();
        if let Ok(mut tables) = repository.tables.lock() {
            tables.reference = reference;
        }
        repository
    }

    /// Load an actuals snapshot. Snapshots are immutable, so a second load of the same name conflicts.
    pub fn load_actual(&self, actual: Actual) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        if tables.actuals.contains_key(&actual.actual_name) {
            return Err(RepositoryError::conflict("actual", &actual.actual_name));
        }
        tables.actuals.insert(actual.actual_name.clone(), actual);
        Ok(())
    }

    pub fn row_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.rows.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl Tables {
    fn writable_scenario(&self, id: ScenarioId) -> Result<&Scenario, RepositoryError> {
        let stored = self
            .scenarios
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found("scenario", id))?;
        if stored.is_final {
            return Err(RepositoryError::Finalized {
                scenario_id: id,
                label: stored.label(),
            });
        }
        Ok(stored)
    }

    fn check_unchanged(&self, expected: &Scenario) -> Result<(), RepositoryError> {
        if self.writable_scenario(expected.id)? != expected {
            return Err(RepositoryError::conflict(
                "scenario",
                format!("{} changed since it was read", expected.label()),
            ));
        }
        Ok(())
    }
}

impl EstimatesRepository for InMemoryEstimatesRepository {
    fn reference_data(&self) -> Result<ReferenceData, RepositoryError> {
        Ok(self.lock()?.reference.clone())
    }

    fn actual(&self, actual_name: &str) -> Result<Option<Actual>, RepositoryError> {
        Ok(self.lock()?.actuals.get(actual_name).cloned())
    }

    fn insert_scenario(&self, header: NewScenario) -> Result<Scenario, RepositoryError> {
        let mut tables = self.lock()?;
        let taken = tables.scenarios.values().any(|existing| {
            existing.scenario_name == header.scenario_name && existing.version_name == header.version_name
        });
        if taken {
            return Err(RepositoryError::conflict(
                "scenario",
                format!("{} ({})", header.scenario_name, header.version_name),
            ));
        }

        tables.last_scenario_id += 1;
        let scenario = header.into_scenario(ScenarioId(tables.last_scenario_id));
        tables.scenarios.insert(scenario.id, scenario.clone());
        Ok(scenario)
    }

    fn update_scenario(&self, expected: &Scenario, updated: &Scenario) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        tables.check_unchanged(expected)?;
        tables.scenarios.insert(expected.id, updated.clone());
        Ok(())
    }

    fn delete_scenario(&self, id: ScenarioId) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        tables.writable_scenario(id)?;
        tables.scenarios.remove(&id);
        tables.rows.retain(|_, row| row.scenario_id != id);
        Ok(())
    }

    fn scenario(&self, id: ScenarioId) -> Result<Option<Scenario>, RepositoryError> {
        Ok(self.lock()?.scenarios.get(&id).cloned())
    }

    fn scenario_versions(&self, scenario_name: &str) -> Result<Vec<Scenario>, RepositoryError> {
        Ok(self
            .lock()?
            .scenarios
            .values()
            .filter(|scenario| scenario.scenario_name == scenario_name)
            .cloned()
            .collect())
    }

    fn insert_rows(&self, id: ScenarioId, facts: Vec<EnrolmentFact>) -> Result<usize, RepositoryError> {
        let mut tables = self.lock()?;
        tables.writable_scenario(id)?;

        let mut keys: BTreeSet<_> = tables
            .rows
            .values()
            .filter(|row| row.scenario_id == id)
            .map(|row| row.fact.key())
            .collect();
        for fact in &facts {
            if !keys.insert(fact.key()) {
                return Err(RepositoryError::conflict("scenario row", fact.key()));
            }
        }

        let inserted = facts.len();
        for fact in facts {
            tables.last_row_id += 1;
            let row = ScenarioRow {
                id: RowId(tables.last_row_id),
                scenario_id: id,
                fact,
            };
            tables.rows.insert(row.id, row);
        }
        Ok(inserted)
    }

    fn rows(&self, id: ScenarioId) -> Result<Vec<ScenarioRow>, RepositoryError> {
        Ok(self
            .lock()?
            .rows
            .values()
            .filter(|row| row.scenario_id == id)
            .cloned()
            .collect())
    }

    fn update_rows(
        &self,
        expected: &Scenario,
        updated: &Scenario,
        edits: &[RowEdit],
    ) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        tables.check_unchanged(expected)?;
        let id = expected.id;
        let unknown = edits.iter().find(|edit| {
            tables
                .rows
                .get(&edit.row_id)
                .map_or(true, |row| row.scenario_id != id)
        });
        if let Some(edit) = unknown {
            return Err(RepositoryError::not_found("scenario row", edit.row_id.0));
        }

        for edit in edits {
            if let Some(row) = tables.rows.get_mut(&edit.row_id) {
                row.fact.enrolment_count = edit.enrolment_count;
            }
        }
        tables.scenarios.insert(id, updated.clone());
        Ok(())
    }

    fn insert_rule(&self, rule: Rule) -> Result<Rule, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.rules.iter().any(|existing| existing.name == rule.name) {
            return Err(RepositoryError::conflict("rule", &rule.name));
        }
        tables.rules.push(rule.clone());
        Ok(rule)
    }

    fn rules(&self) -> Result<Vec<Rule>, RepositoryError> {
        Ok(self.lock()?.rules.clone())
    }
}
