use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{EnrolmentFact, StudyPeriod};

/// Enrolment totals for one scenario version or actuals snapshot. Sums saturate at
/// `u64::MAX`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactSummary {
    pub total: u64,
    pub by_period: BTreeMap<String, u64>,
    /// Period, then owning faculty.
    pub by_faculty: BTreeMap<String, BTreeMap<String, u64>>,
    /// Period, then commencing study period.
    pub by_study_period: BTreeMap<String, BTreeMap<StudyPeriod, u64>>,
}

impl FactSummary {
    pub fn from_facts<'a, I>(facts: I) -> Self
    where
        I: IntoIterator<Item = &'a EnrolmentFact>,
    {
        let mut summary = Self::default();
        for fact in facts {
            let count = fact.enrolment_count;
            summary.total = summary.total.saturating_add(count);
            add(summary.by_period.entry(fact.period.clone()).or_default(), count);
            add(
                summary
                    .by_faculty
                    .entry(fact.period.clone())
                    .or_default()
                    .entry(fact.owning_faculty.clone())
                    .or_default(),
                count,
            );
            add(
                summary
                    .by_study_period
                    .entry(fact.period.clone())
                    .or_default()
                    .entry(fact.commencing_study_period)
                    .or_default(),
                count,
            );
        }
        summary
    }

    pub fn period_total(&self, period: &str) -> u64 {
        self.by_period.get(period).copied().unwrap_or(0)
    }

    pub fn faculty_total(&self, period: &str, faculty: &str) -> u64 {
        self.by_faculty
            .get(period)
            .and_then(|faculties| faculties.get(faculty))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub baseline: u64,
    pub candidate: u64,
    pub change: i128,
}

impl Delta {
    fn between(baseline: u64, candidate: u64) -> Self {
        Self {
            baseline,
            candidate,
            change: i128::from(candidate) - i128::from(baseline),
        }
    }
}

/// Period and faculty deltas between two fact sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactComparison {
    pub total: Delta,
    pub by_period: BTreeMap<String, Delta>,
    pub by_faculty: BTreeMap<String, BTreeMap<String, Delta>>,
}

pub fn compare(baseline: &FactSummary, candidate: &FactSummary) -> FactComparison {
    let mut by_period = BTreeMap::new();
    for period in baseline.by_period.keys().chain(candidate.by_period.keys()) {
        by_period.entry(period.clone()).or_insert_with(|| {
            Delta::between(baseline.period_total(period), candidate.period_total(period))
        });
    }

    let mut by_faculty: BTreeMap<String, BTreeMap<String, Delta>> = BTreeMap::new();
    for (period, faculties) in baseline.by_faculty.iter().chain(candidate.by_faculty.iter()) {
        let entry = by_faculty.entry(period.clone()).or_default();
        for faculty in faculties.keys() {
            entry.entry(faculty.clone()).or_insert_with(|| {
                Delta::between(
                    baseline.faculty_total(period, faculty),
                    candidate.faculty_total(period, faculty),
                )
            });
        }
    }

    FactComparison {
        total: Delta::between(baseline.total, candidate.total),
        by_period,
        by_faculty,
    }
}

/// One line of an actuals snapshot laid out with a column per study period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyPeriodPivotRow {
    pub owning_faculty: String,
    pub course: String,
    pub course_level: String,
    pub fee_liability_group: String,
    pub counts: BTreeMap<StudyPeriod, u64>,
}

impl StudyPeriodPivotRow {
    pub fn count(&self, period: StudyPeriod) -> u64 {
        self.counts.get(&period).copied().unwrap_or(0)
    }
}

/// Sum counts per course line across every period, sorted by faculty then course.
pub fn pivot_by_study_period(facts: &[EnrolmentFact]) -> Vec<StudyPeriodPivotRow> {
    let mut lines: BTreeMap<(String, String, String, String), BTreeMap<StudyPeriod, u64>> =
        BTreeMap::new();
    for fact in facts {
        let line = (
            fact.owning_faculty.clone(),
            fact.course.clone(),
            fact.course_level.clone(),
            fact.fee_liability_group.clone(),
        );
        add(
            lines
                .entry(line)
                .or_default()
                .entry(fact.commencing_study_period)
                .or_default(),
            fact.enrolment_count,
        );
    }

    lines
        .into_iter()
        .map(
            |((owning_faculty, course, course_level, fee_liability_group), counts)| StudyPeriodPivotRow {
                owning_faculty,
                course,
                course_level,
                fee_liability_group,
                counts,
            },
        )
        .collect()
}

fn add(total: &mut u64, count: u64) {
    *total = total.saturating_add(count);
}
