//! Commencing enrolment estimates.
//!
//! Actual snapshots and a base scenario feed the projection engine, which re-estimates the
//! current year and rolls it forward through the planning horizon using growth-rate rules.
//! The result is stored as a scenario version that faculties confirm and an admin finalizes.

pub mod domain;
pub mod import;
pub mod lifecycle;
pub mod projection;
pub mod reference;
pub mod repository;
pub mod roles;
pub mod router;
pub mod rules;
pub mod service;
pub mod settings;
pub mod summary;

#[cfg(test)]
mod tests;

pub use domain::{
    Actual, DimensionalKey, EnrolmentFact, FacultyGroup, NewScenario, RowId, Scenario, ScenarioId,
    ScenarioRow, StudyPeriod, INITIAL_VERSION,
};
pub use import::{parse_actuals, parse_facts, write_facts, ImportError};
pub use lifecycle::{ApprovalEffect, LifecycleError, ScenarioState};
pub use projection::{project, ProjectionError, ProjectionOutcome, ProjectionRequest, SkipReason};
pub use reference::{FeeLiabilityType, ReferenceData, ReferenceError};
pub use repository::{EstimatesRepository, InMemoryEstimatesRepository, RepositoryError, RowEdit};
pub use roles::{RequestContext, Role, RoleError};
pub use router::estimates_router;
pub use rules::{resolve_rate, Rule, RuleDefinition, RuleError, RuleResolver, RuleScope};
pub use service::{
    CreateScenarioRequest, EstimatesError, EstimatesService, GeneratedScenario,
    ImportScenarioRequest, NewVersionRequest, SaveEditsRequest, StoredVersion,
};
pub use settings::PlanningSettings;
pub use summary::{FactComparison, FactSummary};
