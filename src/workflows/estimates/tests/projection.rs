use super::common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::workflows::estimates::domain::{EnrolmentFact, StudyPeriod};
use crate::workflows::estimates::projection::{
    project, ProjectionError, ProjectionOutcome, ProjectionRequest, SkipReason,
};
use crate::workflows::estimates::reference::{ReferenceData, ReferenceError};
use crate::workflows::estimates::rules::{Rule, RuleResolver, RuleScope};

fn horizon(years: &[&str]) -> Vec<String> {
    years.iter().map(|year| year.to_string()).collect()
}

fn run(
    actuals: &[EnrolmentFact],
    base: &[EnrolmentFact],
    years: &[&str],
    resolver: &RuleResolver,
    reference: Option<&ReferenceData>,
) -> Result<ProjectionOutcome, ProjectionError> {
    let horizon = horizon(years);
    project(&ProjectionRequest {
        actuals,
        base,
        current_period: "2025",
        horizon: &horizon,
        resolver,
        reference,
    })
}

fn count(outcome: &ProjectionOutcome, course: &str, period: &str, study_period: StudyPeriod) -> u64 {
    outcome
        .facts
        .iter()
        .find(|fact| {
            fact.course == course && fact.period == period && fact.commencing_study_period == study_period
        })
        .map(|fact| fact.enrolment_count)
        .expect("fact present")
}

fn admin_rule(name: &str, rate: Decimal, scope: RuleScope) -> Rule {
    Rule {
        name: name.to_string(),
        owner_role: "G1_ADMIN".to_string(),
        increase_by: rate,
        description: scope.describe(rate),
        scope,
        extra_comment: String::new(),
    }
}

#[test]
fn recalibration_scales_later_periods_by_actual_over_estimate() {
    let base = vec![
        fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 800),
        fact("Bachelor of Arts", ARTS, StudyPeriod::Term2, DOMESTIC, 40),
    ];
    let actuals = vec![fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 1000)];
    let resolver = RuleResolver::new(Vec::new(), dec!(0.03));

    let outcome = run(&actuals, &base, &[], &resolver, None).expect("projection runs");

    assert_eq!(outcome.scale, dec!(1.25));
    assert_eq!(count(&outcome, "Bachelor of Arts", "2025", StudyPeriod::Session1), 1000);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2025", StudyPeriod::Term2), 50);
}

#[test]
fn recalibrated_year_rolls_forward_with_matching_rule() {
    let resolver = RuleResolver::new(
        vec![admin_rule("five percent", dec!(0.05), RuleScope::default())],
        dec!(0.03),
    );

    let outcome = run(&actual_facts(), &base_facts(), &["2026"], &resolver, Some(&reference()))
        .expect("projection runs");

    assert_eq!(outcome.total_actual, 1000);
    assert_eq!(outcome.total_base_estimate, 800);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2025", StudyPeriod::Session2), 500);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2026", StudyPeriod::Session2), 525);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2026", StudyPeriod::Session1), 630);
}

#[test]
fn horizon_years_compound_from_the_prior_year() {
    let base = vec![fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 100)];
    let resolver = RuleResolver::new(Vec::new(), dec!(0.10));

    let outcome = run(&base, &base, &["2026", "2027"], &resolver, None).expect("projection runs");

    assert_eq!(count(&outcome, "Bachelor of Arts", "2026", StudyPeriod::Session1), 110);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2027", StudyPeriod::Session1), 121);
}

#[test]
fn rules_are_resolved_against_the_year_being_projected() {
    let base = vec![fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 100)];
    let only_2027 = RuleScope {
        periods: ["2027".to_string()].into_iter().collect(),
        ..RuleScope::default()
    };
    let resolver = RuleResolver::new(vec![admin_rule("2027 freeze", dec!(0), only_2027)], dec!(0.03));

    let outcome = run(&base, &base, &["2026", "2027"], &resolver, None).expect("projection runs");

    assert_eq!(count(&outcome, "Bachelor of Arts", "2026", StudyPeriod::Session1), 103);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2027", StudyPeriod::Session1), 103);
}

#[test]
fn actuals_without_baseline_are_reported_not_dropped() {
    let mut actuals = actual_facts();
    actuals.push(fact("Bachelor of Engineering", SCI, StudyPeriod::Session1, DOMESTIC, 25));
    actuals.push(fact("Bachelor of Arts", ARTS, StudyPeriod::Session3, DOMESTIC, 7));
    let mut last_year = fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 480);
    last_year.period = "2024".to_string();
    actuals.push(last_year);
    let resolver = RuleResolver::new(Vec::new(), dec!(0.03));

    let outcome = run(&actuals, &base_facts(), &["2026"], &resolver, Some(&reference()))
        .expect("projection runs");

    assert_eq!(outcome.skipped_with(SkipReason::NoBaseline), 1);
    assert_eq!(outcome.skipped_with(SkipReason::NotSessionOne), 1);
    assert_eq!(outcome.skipped_with(SkipReason::OutsideCurrentPeriod), 1);
    assert!(outcome
        .facts
        .iter()
        .all(|fact| fact.course != "Bachelor of Engineering"));
    assert_eq!(outcome.total_actual, 1025);
}

#[test]
fn session_one_rows_missing_from_actuals_fall_to_zero() {
    let actuals = vec![fact("Bachelor of Arts", ARTS, StudyPeriod::Session1, DOMESTIC, 800)];
    let resolver = RuleResolver::new(Vec::new(), dec!(0.03));

    let outcome = run(&actuals, &base_facts(), &[], &resolver, None).expect("projection runs");

    assert_eq!(count(&outcome, "Bachelor of Commerce", "2025", StudyPeriod::Session1), 0);
    assert_eq!(count(&outcome, "Bachelor of Arts", "2025", StudyPeriod::Session2), 400);
}

#[test]
fn zero_base_estimate_is_a_division_by_zero() {
    let base = vec![fact("Bachelor of Arts", ARTS, StudyPeriod::Session2, DOMESTIC, 400)];
    let resolver = RuleResolver::new(Vec::new(), dec!(0.03));

    match run(&actual_facts(), &base, &["2026"], &resolver, None) {
        Err(ProjectionError::DivisionByZero { period }) => assert_eq!(period, "2025"),
        other => panic!("expected DivisionByZero, got {other:?}"),
    }
}

#[test]
fn duplicate_keys_in_inputs_are_rejected() {
    let mut base = base_facts();
    base.push(fact("Bachelor of Arts", ARTS, StudyPeriod::Session2, DOMESTIC, 1));
    let resolver = RuleResolver::new(Vec::new(), dec!(0.03));

    assert!(matches!(
        run(&actual_facts(), &base, &[], &resolver, None),
        Err(ProjectionError::DuplicateKey {
            source_name: "base scenario",
            ..
        })
    ));
}

#[test]
fn inputs_outside_reference_data_report_key_not_found() {
    let mut actuals = actual_facts();
    actuals.push(fact("Bachelor of Laws", "Macquarie Law School", StudyPeriod::Session1, DOMESTIC, 3));
    let resolver = RuleResolver::new(Vec::new(), dec!(0.03));

    match run(&actuals, &base_facts(), &[], &resolver, Some(&reference())) {
        Err(ProjectionError::Reference(ReferenceError::KeyNotFound { dimension, value })) => {
            assert_eq!(dimension, "courses");
            assert_eq!(value, "Bachelor of Laws");
        }
        other => panic!("expected KeyNotFound, got {other:?}"),
    }
}

#[test]
fn identical_inputs_produce_identical_ordered_output() {
    let resolver = RuleResolver::new(
        vec![admin_rule(
            "arts",
            dec!(0.07),
            RuleScope {
                owning_faculties: [ARTS.to_string()].into_iter().collect(),
                ..RuleScope::default()
            },
        )],
        dec!(0.03),
    );
    let mut shuffled = base_facts();
    shuffled.reverse();

    let first = run(&actual_facts(), &base_facts(), &["2026", "2027"], &resolver, None)
        .expect("projection runs");
    let second = run(&actual_facts(), &shuffled, &["2026", "2027"], &resolver, None)
        .expect("projection runs");

    assert_eq!(first, second);
    let keys: Vec<_> = first.facts.iter().map(EnrolmentFact::key).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(first.facts.len(), 12);
}
