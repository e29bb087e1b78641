use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::domain::{DimensionalKey, EnrolmentFact};

/// Fee-liability classification used to scope recruitment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeLiabilityType {
    Domestic,
    International,
}

/// Dimension names as they appear in rule records and error reports.
pub mod dimension {
    pub const PERIOD: &str = "periods";
    pub const STUDY_PERIOD: &str = "commencing_study_periods";
    pub const FACULTY: &str = "owning_faculties";
    pub const FEE_LIABILITY_GROUP: &str = "fee_liability_groups";
    pub const COURSE_LEVEL: &str = "course_level_names";
    pub const COURSE: &str = "courses";
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("{dimension} value '{value}' is not present in reference data")]
    KeyNotFound {
        dimension: &'static str,
        value: String,
    },
    #[error("course '{course}' is owned by '{expected}', not '{found}'")]
    FacultyMismatch {
        course: String,
        expected: String,
        found: String,
    },
}

/// Read-only lookup tables maintained outside the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    /// Course name to owning faculty.
    pub courses: BTreeMap<String, String>,
    pub faculties: BTreeSet<String>,
    pub course_levels: BTreeSet<String>,
    pub fee_liability_groups: BTreeMap<String, FeeLiabilityType>,
    pub periods: BTreeSet<String>,
}

impl ReferenceData {
    pub fn with_course(mut self, course: &str, faculty: &str) -> Self {
        self.faculties.insert(faculty.to_string());
        self.courses.insert(course.to_string(), faculty.to_string());
        self
    }

    pub fn with_course_level(mut self, level: &str) -> Self {
        self.course_levels.insert(level.to_string());
        self
    }

    pub fn with_fee_liability_group(mut self, group: &str, kind: FeeLiabilityType) -> Self {
        self.fee_liability_groups.insert(group.to_string(), kind);
        self
    }

    pub fn with_periods<I, S>(mut self, periods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.periods.extend(periods.into_iter().map(Into::into));
        self
    }

    pub fn fee_liability_type(&self, group: &str) -> Option<FeeLiabilityType> {
        self.fee_liability_groups.get(group).copied()
    }

    pub fn fee_liability_groups_of(&self, kind: FeeLiabilityType) -> BTreeSet<String> {
        self.fee_liability_groups
            .iter()
            .filter(|(_, group_kind)| **group_kind == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn courses_of_faculty(&self, faculty: &str) -> BTreeSet<String> {
        self.courses
            .iter()
            .filter(|(_, owner)| owner.as_str() == faculty)
            .map(|(course, _)| course.clone())
            .collect()
    }

    pub fn require_course(&self, course: &str) -> Result<&str, ReferenceError> {
        self.courses
            .get(course)
            .map(String::as_str)
            .ok_or_else(|| missing(dimension::COURSE, course))
    }

    pub fn require_faculty(&self, faculty: &str) -> Result<(), ReferenceError> {
        require(&self.faculties, dimension::FACULTY, faculty)
    }

    pub fn require_course_level(&self, level: &str) -> Result<(), ReferenceError> {
        require(&self.course_levels, dimension::COURSE_LEVEL, level)
    }

    pub fn require_fee_liability_group(&self, group: &str) -> Result<(), ReferenceError> {
        if self.fee_liability_groups.contains_key(group) {
            Ok(())
        } else {
            Err(missing(dimension::FEE_LIABILITY_GROUP, group))
        }
    }

    /// Periods are free-form years; only checked when the table is populated.
    pub fn require_period(&self, period: &str) -> Result<(), ReferenceError> {
        if self.periods.is_empty() {
            return Ok(());
        }
        require(&self.periods, dimension::PERIOD, period)
    }

    pub fn validate_key(&self, key: &DimensionalKey) -> Result<(), ReferenceError> {
        let owner = self.require_course(&key.course)?;
        if owner != key.owning_faculty {
            return Err(ReferenceError::FacultyMismatch {
                course: key.course.clone(),
                expected: owner.to_string(),
                found: key.owning_faculty.clone(),
            });
        }
        self.require_faculty(&key.owning_faculty)?;
        self.require_course_level(&key.course_level)?;
        self.require_fee_liability_group(&key.fee_liability_group)
    }

    pub fn validate_facts<'a, I>(&self, facts: I) -> Result<(), ReferenceError>
    where
        I: IntoIterator<Item = &'a EnrolmentFact>,
    {
        facts
            .into_iter()
            .try_for_each(|fact| self.validate_key(&fact.key()))
    }
}

fn require(
    table: &BTreeSet<String>,
    dimension: &'static str,
    value: &str,
) -> Result<(), ReferenceError> {
    if table.contains(value) {
        Ok(())
    } else {
        Err(missing(dimension, value))
    }
}

fn missing(dimension: &'static str, value: &str) -> ReferenceError {
    ReferenceError::KeyNotFound {
        dimension,
        value: value.to_string(),
    }
}
