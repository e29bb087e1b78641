use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;

use super::super::domain::{DimensionalKey, StudyPeriod};

/// Set-valued filter over the six fact dimensions. An empty set is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleScope {
    pub periods: BTreeSet<String>,
    pub commencing_study_periods: BTreeSet<StudyPeriod>,
    pub owning_faculties: BTreeSet<String>,
    pub fee_liability_groups: BTreeSet<String>,
    pub course_levels: BTreeSet<String>,
    pub courses: BTreeSet<String>,
}

impl RuleScope {
    pub fn matches(&self, key: &DimensionalKey) -> bool {
        admits(&self.periods, &key.period)
            && admits(&self.commencing_study_periods, &key.commencing_study_period)
            && admits(&self.owning_faculties, &key.owning_faculty)
            && admits(&self.fee_liability_groups, &key.fee_liability_group)
            && admits(&self.course_levels, &key.course_level)
            && admits(&self.courses, &key.course)
    }

    /// Human-readable summary stored alongside the rule.
    pub fn describe(&self, increase_by: Decimal) -> String {
        let percent = (increase_by * Decimal::ONE_HUNDRED).normalize();
        let mut lines = vec![format!("Increase by {percent}%, applying on")];
        lines.push(format!("Period: {}", join_or_all(self.periods.iter())));
        lines.push(format!(
            "Owning Faculty: {}",
            join_or_all(self.owning_faculties.iter())
        ));
        lines.push(format!(
            "Fee Liability: {}",
            join_or_all(self.fee_liability_groups.iter())
        ));
        lines.push(format!(
            "Course Level: {}",
            join_or_all(self.course_levels.iter())
        ));
        lines.push(format!(
            "Commencing Study Period: {}",
            join_or_all(self.commencing_study_periods.iter().map(|period| period.label()))
        ));
        lines.push(format!("Course: {}", join_or_all(self.courses.iter())));
        lines.join("\n")
    }
}

fn admits<T: Ord>(allowed: &BTreeSet<T>, value: &T) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

fn join_or_all<I, S>(values: I) -> String
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let joined: Vec<String> = values.map(|value| value.as_ref().to_string()).collect();
    if joined.is_empty() {
        "all".to_string()
    } else {
        joined.join("; ")
    }
}
