use rust_decimal::Decimal;

use super::super::domain::DimensionalKey;
use super::Rule;

/// Effective growth rate for `key`.
///
/// Later rules overwrite earlier ones, so the last matching rule in caller order wins.
/// No match yields `default_rate`.
pub fn resolve_rate(key: &DimensionalKey, ordered_rules: &[Rule], default_rate: Decimal) -> Decimal {
    ordered_rules
        .iter()
        .rev()
        .find(|rule| rule.scope.matches(key))
        .map(|rule| rule.increase_by)
        .unwrap_or(default_rate)
}

/// Ordered rule list bound to a default rate, shared across a projection run.
#[derive(Debug, Clone)]
pub struct RuleResolver {
    rules: Vec<Rule>,
    default_rate: Decimal,
}

impl RuleResolver {
    pub fn new(rules: Vec<Rule>, default_rate: Decimal) -> Self {
        Self {
            rules,
            default_rate,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_rate(&self) -> Decimal {
        self.default_rate
    }

    pub fn resolve(&self, key: &DimensionalKey) -> Decimal {
        resolve_rate(key, &self.rules, self.default_rate)
    }

    /// Rule that decides `key`, if any.
    pub fn deciding_rule(&self, key: &DimensionalKey) -> Option<&Rule> {
        self.rules.iter().rev().find(|rule| rule.scope.matches(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::estimates::domain::StudyPeriod;
    use crate::workflows::estimates::rules::RuleScope;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn key(period: &str, faculty: &str, study_period: StudyPeriod) -> DimensionalKey {
        DimensionalKey {
            period: period.to_string(),
            owning_faculty: faculty.to_string(),
            course: "Bachelor of Arts".to_string(),
            commencing_study_period: study_period,
            course_level: "Undergraduate".to_string(),
            fee_liability_group: "Domestic Fee Paying".to_string(),
        }
    }

    fn rule(name: &str, rate: Decimal, scope: RuleScope) -> Rule {
        Rule {
            name: name.to_string(),
            owner_role: "G1_ADMIN".to_string(),
            increase_by: rate,
            description: scope.describe(rate),
            scope,
            extra_comment: String::new(),
        }
    }

    fn set<const N: usize>(values: [&str; N]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn arts_only() -> RuleScope {
        RuleScope {
            owning_faculties: set(["Faculty of Arts"]),
            ..RuleScope::default()
        }
    }

    fn year_2026() -> RuleScope {
        RuleScope {
            periods: set(["2026"]),
            ..RuleScope::default()
        }
    }

    #[test]
    fn empty_rule_list_yields_default() {
        let key = key("2026", "Faculty of Arts", StudyPeriod::Session1);
        assert_eq!(resolve_rate(&key, &[], dec!(0.03)), dec!(0.03));
    }

    #[test]
    fn single_match_wins_regardless_of_position() {
        let key = key("2026", "Faculty of Arts", StudyPeriod::Session2);
        let matching = rule("arts", dec!(0.10), arts_only());
        let other = rule(
            "mqbs",
            dec!(0.20),
            RuleScope {
                owning_faculties: set(["Macquarie Business School"]),
                ..RuleScope::default()
            },
        );

        let first = [matching.clone(), other.clone()];
        let last = [other, matching];
        assert_eq!(resolve_rate(&key, &first, dec!(0.03)), dec!(0.10));
        assert_eq!(resolve_rate(&key, &last, dec!(0.03)), dec!(0.10));
    }

    #[test]
    fn later_match_overrides_earlier_match() {
        let key = key("2026", "Faculty of Arts", StudyPeriod::Session1);
        let arts = rule("arts", dec!(0.10), arts_only());
        let year = rule("2026", dec!(-0.02), year_2026());

        assert_eq!(
            resolve_rate(&key, &[arts.clone(), year.clone()], dec!(0.03)),
            dec!(-0.02)
        );
        assert_eq!(resolve_rate(&key, &[year, arts], dec!(0.03)), dec!(0.10));
    }

    #[test]
    fn empty_dimension_is_a_wildcard() {
        let wildcard = rule("everything", dec!(0.07), RuleScope::default());
        for study_period in StudyPeriod::ordered() {
            let key = key("2029", "Faculty of Science and Engineering", study_period);
            assert_eq!(
                resolve_rate(&key, std::slice::from_ref(&wildcard), dec!(0.03)),
                dec!(0.07)
            );
        }
    }

    #[test]
    fn non_matching_rules_fall_back_to_default() {
        let key = key("2027", "Faculty of Arts", StudyPeriod::Term1);
        let resolver = RuleResolver::new(vec![rule("2026", dec!(0.5), year_2026())], dec!(0.04));
        assert_eq!(resolver.resolve(&key), dec!(0.04));
        assert!(resolver.deciding_rule(&key).is_none());
    }

    #[test]
    fn every_dimension_must_match() {
        let scope = RuleScope {
            owning_faculties: set(["Faculty of Arts"]),
            commencing_study_periods: [StudyPeriod::Session2].into_iter().collect(),
            ..RuleScope::default()
        };
        let resolver = RuleResolver::new(vec![rule("arts s2", dec!(0.15), scope)], dec!(0.03));

        let session_two = key("2026", "Faculty of Arts", StudyPeriod::Session2);
        let session_one = key("2026", "Faculty of Arts", StudyPeriod::Session1);
        assert_eq!(resolver.resolve(&session_two), dec!(0.15));
        assert_eq!(resolver.resolve(&session_one), dec!(0.03));
        assert_eq!(
            resolver.deciding_rule(&session_two).map(|rule| rule.name.as_str()),
            Some("arts s2")
        );
    }
}
