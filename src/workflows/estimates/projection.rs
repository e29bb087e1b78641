//! Multi-year projection of commencing enrolments.
//!
//! A run has two stages. The current year is re-estimated from an actuals snapshot:
//! Session 1 counts are taken from the actuals and every other study period of the base
//! scenario is pro-rated by `total_actual / total_base_estimate`. Each horizon year is
//! then grown from the year before it, compounding, with the rate resolved per fact.
//! All counts are rounded up.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::domain::{DimensionalKey, EnrolmentFact};
use super::reference::{ReferenceData, ReferenceError};
use super::rules::RuleResolver;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("base scenario has no Session 1 estimate for {period}; cannot derive a recalibration scale")]
    DivisionByZero { period: String },
    #[error("duplicate {source_name} fact for key {key}")]
    DuplicateKey {
        source_name: &'static str,
        key: DimensionalKey,
    },
    #[error("horizon year '{period}' is repeated or overlaps the current year")]
    InvalidHorizon { period: String },
    #[error("count overflow projecting {key}")]
    Overflow { key: DimensionalKey },
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Why an actual fact did not make it into the recalibrated year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No base estimate exists for the key; new courses are estimated by hand.
    NoBaseline,
    /// The fact belongs to a period other than the one being recalibrated.
    OutsideCurrentPeriod,
    /// Only Session 1 actuals replace estimates; later periods are pro-rated instead.
    NotSessionOne,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFact {
    pub fact: EnrolmentFact,
    pub reason: SkipReason,
}

/// Inputs for one projection run.
pub struct ProjectionRequest<'a> {
    pub actuals: &'a [EnrolmentFact],
    pub base: &'a [EnrolmentFact],
    pub current_period: &'a str,
    pub horizon: &'a [String],
    pub resolver: &'a RuleResolver,
    pub reference: Option<&'a ReferenceData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionOutcome {
    pub facts: Vec<EnrolmentFact>,
    pub total_actual: u64,
    pub total_base_estimate: u64,
    pub scale: Decimal,
    pub skipped: Vec<SkippedFact>,
}

impl ProjectionOutcome {
    pub fn facts_for_period<'a>(&'a self, period: &'a str) -> impl Iterator<Item = &'a EnrolmentFact> {
        self.facts.iter().filter(move |fact| fact.period == period)
    }

    pub fn skipped_with(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|skipped| skipped.reason == reason).count()
    }
}

type FactSet = BTreeMap<DimensionalKey, u64>;

/// Run the projection. Pure: identical inputs always produce identical outcomes.
pub fn project(request: &ProjectionRequest<'_>) -> Result<ProjectionOutcome, ProjectionError> {
    validate_horizon(request.current_period, request.horizon)?;
    if let Some(reference) = request.reference {
        reference.validate_facts(request.actuals)?;
        reference.validate_facts(request.base)?;
    }

    let base = index_facts("base scenario", request.base)?;
    let actuals = index_facts("actuals", request.actuals)?;

    let recalibrated = recalibrate(request.current_period, &actuals, &base)?;
    let mut facts = recalibrated.facts.clone();
    let mut previous = recalibrated.facts;

    for period in request.horizon {
        let next = roll_forward(&previous, period, request.resolver)?;
        facts.extend(next.iter().map(|(key, count)| (key.clone(), *count)));
        previous = next;
    }

    let outcome = ProjectionOutcome {
        facts: facts
            .into_iter()
            .map(|(key, count)| EnrolmentFact::from_key(key, count))
            .collect(),
        total_actual: recalibrated.total_actual,
        total_base_estimate: recalibrated.total_base_estimate,
        scale: recalibrated.scale,
        skipped: recalibrated.skipped,
    };

    info!(
        current_period = request.current_period,
        horizon_years = request.horizon.len(),
        rules = request.resolver.rules().len(),
        default_rate = %request.resolver.default_rate(),
        scale = %outcome.scale,
        facts = outcome.facts.len(),
        skipped = outcome.skipped.len(),
        "projection complete"
    );

    Ok(outcome)
}

/// `ceil(count * (1 + rate))`.
pub fn grow(count: u64, rate: Decimal) -> Option<u64> {
    let factor = Decimal::ONE.checked_add(rate)?;
    ceil_to_count(Decimal::from(count).checked_mul(factor)?)
}

/// `ceil(count * numerator / denominator)`, multiplying first so exact ratios stay exact.
pub fn pro_rate(count: u64, numerator: u64, denominator: u64) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    let scaled = Decimal::from(count).checked_mul(Decimal::from(numerator))?;
    ceil_to_count(scaled / Decimal::from(denominator))
}

fn ceil_to_count(value: Decimal) -> Option<u64> {
    let ceiled = value.ceil();
    if ceiled.is_sign_negative() {
        return Some(0);
    }
    ceiled.to_u64()
}

struct Recalibration {
    facts: FactSet,
    total_actual: u64,
    total_base_estimate: u64,
    scale: Decimal,
    skipped: Vec<SkippedFact>,
}

fn recalibrate(
    current_period: &str,
    actuals: &FactSet,
    base: &FactSet,
) -> Result<Recalibration, ProjectionError> {
    let is_current_session_one = |key: &DimensionalKey| {
        key.period == current_period && key.commencing_study_period.is_session_one()
    };

    let mut skipped = Vec::new();
    let mut session_one_actuals = FactSet::new();

    for (key, count) in actuals {
        let reason = if key.period != current_period {
            Some(SkipReason::OutsideCurrentPeriod)
        } else if !key.commencing_study_period.is_session_one() {
            Some(SkipReason::NotSessionOne)
        } else if !base.contains_key(key) {
            Some(SkipReason::NoBaseline)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(%key, ?reason, "actual fact skipped");
                skipped.push(SkippedFact {
                    fact: EnrolmentFact::from_key(key.clone(), *count),
                    reason,
                });
            }
            None => {
                session_one_actuals.insert(key.clone(), *count);
            }
        }
    }

    let total_actual = actuals
        .iter()
        .filter(|(key, _)| is_current_session_one(key))
        .fold(0u64, |total, (_, count)| total.saturating_add(*count));
    let total_base_estimate = base
        .iter()
        .filter(|(key, _)| is_current_session_one(key))
        .fold(0u64, |total, (_, count)| total.saturating_add(*count));

    if total_base_estimate == 0 {
        return Err(ProjectionError::DivisionByZero {
            period: current_period.to_string(),
        });
    }
    let scale = Decimal::from(total_actual) / Decimal::from(total_base_estimate);

    let mut facts = FactSet::new();
    for (key, count) in base.iter().filter(|(key, _)| key.period == current_period) {
        let recalibrated = if key.commencing_study_period.is_session_one() {
            session_one_actuals.get(key).copied().unwrap_or(0)
        } else {
            pro_rate(*count, total_actual, total_base_estimate)
                .ok_or_else(|| ProjectionError::Overflow { key: key.clone() })?
        };
        facts.insert(key.clone(), recalibrated);
    }

    Ok(Recalibration {
        facts,
        total_actual,
        total_base_estimate,
        scale,
        skipped,
    })
}

fn roll_forward(
    previous: &FactSet,
    period: &str,
    resolver: &RuleResolver,
) -> Result<FactSet, ProjectionError> {
    previous
        .iter()
        .map(|(key, count)| {
            let key = key.with_period(period);
            let rate = resolver.resolve(&key);
            let grown = grow(*count, rate).ok_or_else(|| ProjectionError::Overflow { key: key.clone() })?;
            Ok((key, grown))
        })
        .collect()
}

fn index_facts(
    source_name: &'static str,
    facts: &[EnrolmentFact],
) -> Result<FactSet, ProjectionError> {
    let mut indexed = FactSet::new();
    for fact in facts {
        let key = fact.key();
        if indexed.insert(key.clone(), fact.enrolment_count).is_some() {
            return Err(ProjectionError::DuplicateKey { source_name, key });
        }
    }
    Ok(indexed)
}

fn validate_horizon(current_period: &str, horizon: &[String]) -> Result<(), ProjectionError> {
    let mut seen = BTreeSet::new();
    for period in horizon {
        if period == current_period || !seen.insert(period.as_str()) {
            return Err(ProjectionError::InvalidHorizon {
                period: period.clone(),
            });
        }
    }
    Ok(())
}
