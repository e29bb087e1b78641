mod resolver;
mod scope;

pub use resolver::{resolve_rate, RuleResolver};
pub use scope::RuleScope;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::domain::StudyPeriod;
use super::reference::{ReferenceData, ReferenceError};
use super::roles::{Role, RoleClass};

/// Validation errors raised while turning a rule record into a [`Rule`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("invalid rule '{rule_name}': {reason}")]
    InvalidRule { rule_name: String, reason: String },
    #[error("rule '{rule_name}': {source}")]
    Reference {
        rule_name: String,
        #[source]
        source: ReferenceError,
    },
}

impl RuleError {
    fn invalid(rule_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule_name: rule_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Structured rule record exchanged with the store and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub rule_name: String,
    pub increase_by: Decimal,
    #[serde(default)]
    pub periods: Vec<String>,
    #[serde(default)]
    pub commencing_study_periods: Vec<String>,
    #[serde(default)]
    pub owning_faculties: Vec<String>,
    #[serde(default)]
    pub fee_liability_groups: Vec<String>,
    #[serde(default)]
    pub course_level_names: Vec<String>,
    #[serde(default)]
    pub courses: Vec<String>,
}

impl RuleDefinition {
    /// Parse a JSON rule record, reporting malformed shapes as [`RuleError::InvalidRule`].
    pub fn from_json(raw: &str) -> Result<Self, RuleError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| RuleError::invalid("<unparsed>", err.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a JSON array of rule records, as kept in rule files.
    pub fn list_from_json(raw: &str) -> Result<Vec<Self>, RuleError> {
        let values: Vec<Value> = serde_json::from_str(raw)
            .map_err(|err| RuleError::invalid("<rule file>", err.to_string()))?;
        values.into_iter().map(Self::from_value).collect()
    }

    pub fn from_value(value: Value) -> Result<Self, RuleError> {
        let rule_name = value
            .get("rule_name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();
        serde_json::from_value(value).map_err(|err| RuleError::invalid(&rule_name, err.to_string()))
    }
}

/// A validated, immutable growth-rate override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub name: String,
    pub owner_role: String,
    pub increase_by: Decimal,
    pub scope: RuleScope,
    pub description: String,
    pub extra_comment: String,
}

impl Rule {
    /// Validate a record authored by `owner`.
    pub fn from_definition(definition: RuleDefinition, owner: Role) -> Result<Self, RuleError> {
        let RuleDefinition {
            rule_name,
            increase_by,
            periods,
            commencing_study_periods,
            owning_faculties,
            fee_liability_groups,
            course_level_names,
            courses,
        } = definition;

        let name = rule_name.trim().to_string();
        if name.is_empty() {
            return Err(RuleError::invalid(&rule_name, "rule_name must not be empty"));
        }
        validate_rate(&name, increase_by)?;

        let study_periods = commencing_study_periods
            .iter()
            .map(|raw| raw.parse::<StudyPeriod>())
            .collect::<Result<_, _>>()
            .map_err(|err| RuleError::invalid(&name, err.to_string()))?;

        let scope = RuleScope {
            periods: collect(periods),
            commencing_study_periods: study_periods,
            owning_faculties: collect(owning_faculties),
            fee_liability_groups: collect(fee_liability_groups),
            course_levels: collect(course_level_names),
            courses: collect(courses),
        };

        let description = scope.describe(increase_by);
        Ok(Self {
            name,
            owner_role: owner.identifier().to_string(),
            increase_by,
            scope,
            description,
            extra_comment: String::new(),
        })
    }

    pub fn with_extra_comment(mut self, comment: impl Into<String>) -> Self {
        self.extra_comment = comment.into();
        self
    }

    /// Check scope values against reference data and narrow empty dimensions to what
    /// the author is allowed to touch.
    pub fn constrain_to_author(
        mut self,
        author: Role,
        reference: &ReferenceData,
    ) -> Result<Self, RuleError> {
        let name = self.name.clone();
        let wrap = |source: ReferenceError| RuleError::Reference {
            rule_name: name.clone(),
            source,
        };

        for period in &self.scope.periods {
            reference.require_period(period).map_err(wrap)?;
        }
        for faculty in &self.scope.owning_faculties {
            reference.require_faculty(faculty).map_err(wrap)?;
        }
        for level in &self.scope.course_levels {
            reference.require_course_level(level).map_err(wrap)?;
        }
        for group in &self.scope.fee_liability_groups {
            reference.require_fee_liability_group(group).map_err(wrap)?;
        }

        let capabilities = author.capabilities();
        if let Some(group) = capabilities.faculty {
            let own = group.faculty_name();
            if self.scope.owning_faculties.is_empty() {
                self.scope.owning_faculties.insert(own.to_string());
            } else if self.scope.owning_faculties.iter().any(|faculty| faculty != own) {
                return Err(RuleError::invalid(
                    &self.name,
                    format!("{author} may only author rules for {own}"),
                ));
            }
        }

        if let Some(kind) = capabilities.fee_liability_type {
            let allowed = reference.fee_liability_groups_of(kind);
            if self.scope.fee_liability_groups.is_empty() {
                self.scope.fee_liability_groups = allowed;
            } else if !self.scope.fee_liability_groups.is_subset(&allowed) {
                return Err(RuleError::invalid(
                    &self.name,
                    format!("{author} may only author rules for {kind:?} fee liability groups"),
                ));
            }
        }

        for course in &self.scope.courses {
            let owner = reference.require_course(course).map_err(wrap)?;
            if !self.scope.owning_faculties.is_empty() && !self.scope.owning_faculties.contains(owner) {
                return Err(RuleError::invalid(
                    &self.name,
                    format!("course '{course}' is not owned by any selected faculty"),
                ));
            }
        }

        self.description = self.scope.describe(self.increase_by);
        Ok(self)
    }

    pub fn owner(&self) -> Option<Role> {
        Role::from_identifier(&self.owner_role).ok()
    }

    pub fn owner_class(&self) -> Option<RoleClass> {
        self.owner().map(Role::class)
    }

    pub fn definition(&self) -> RuleDefinition {
        RuleDefinition {
            rule_name: self.name.clone(),
            increase_by: self.increase_by,
            periods: self.scope.periods.iter().cloned().collect(),
            commencing_study_periods: self
                .scope
                .commencing_study_periods
                .iter()
                .map(|period| period.label().to_string())
                .collect(),
            owning_faculties: self.scope.owning_faculties.iter().cloned().collect(),
            fee_liability_groups: self.scope.fee_liability_groups.iter().cloned().collect(),
            course_level_names: self.scope.course_levels.iter().cloned().collect(),
            courses: self.scope.courses.iter().cloned().collect(),
        }
    }
}

/// Largest accepted growth rate (+1000% per year).
pub const MAX_RATE: Decimal = Decimal::TEN;

/// Rates below -100% would produce negative enrolments.
pub fn validate_rate(rule_name: &str, rate: Decimal) -> Result<(), RuleError> {
    if rate < Decimal::NEGATIVE_ONE {
        return Err(RuleError::invalid(
            rule_name,
            format!("increase_by {rate} is below -1"),
        ));
    }
    if rate > MAX_RATE {
        return Err(RuleError::invalid(
            rule_name,
            format!("increase_by {rate} is above {MAX_RATE}"),
        ));
    }
    Ok(())
}

pub fn rate_in_range(rate: Decimal) -> bool {
    (Decimal::NEGATIVE_ONE..=MAX_RATE).contains(&rate)
}

fn collect<T: Ord>(values: Vec<T>) -> BTreeSet<T> {
    values.into_iter().collect()
}
