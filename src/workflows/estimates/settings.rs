use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Planning-round parameters shared by every projection the service runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningSettings {
    /// Growth rate applied when no rule matches a fact.
    pub default_rate: Decimal,
    /// Calendar year being recalibrated from actuals.
    pub current_year: i32,
    /// Number of years projected after the current one.
    pub horizon_years: u32,
}

impl PlanningSettings {
    pub const DEFAULT_RATE: Decimal = dec!(0.03);
    pub const DEFAULT_HORIZON_YEARS: u32 = 4;

    pub fn for_year(current_year: i32) -> Self {
        Self {
            default_rate: Self::DEFAULT_RATE,
            current_year,
            horizon_years: Self::DEFAULT_HORIZON_YEARS,
        }
    }

    pub fn current_period(&self) -> String {
        self.current_year.to_string()
    }

    /// Years following the current one, e.g. `2026..=2029` for 2025 with four years.
    ///
    /// Stops at the last representable year; [`last_projected_year`] reports whether the
    /// whole horizon fits.
    ///
    /// [`last_projected_year`]: PlanningSettings::last_projected_year
    pub fn horizon(&self) -> Vec<String> {
        (1..=self.horizon_years)
            .map_while(|offset| self.year_after(offset))
            .map(|year| year.to_string())
            .collect()
    }

    /// `None` when the horizon runs past `i32::MAX`.
    pub fn last_projected_year(&self) -> Option<i32> {
        self.year_after(self.horizon_years)
    }

    fn year_after(&self, offset: u32) -> Option<i32> {
        i32::try_from(offset)
            .ok()
            .and_then(|offset| self.current_year.checked_add(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_follows_current_year() {
        let settings = PlanningSettings::for_year(2025);
        assert_eq!(settings.current_period(), "2025");
        assert_eq!(settings.horizon(), vec!["2026", "2027", "2028", "2029"]);
        assert_eq!(settings.default_rate, dec!(0.03));
    }

    #[test]
    fn zero_horizon_projects_current_year_only() {
        let settings = PlanningSettings {
            horizon_years: 0,
            ..PlanningSettings::for_year(2025)
        };
        assert!(settings.horizon().is_empty());
    }

    #[test]
    fn horizons_past_the_last_year_are_detected() {
        let near_the_end = PlanningSettings {
            horizon_years: 3,
            ..PlanningSettings::for_year(i32::MAX - 1)
        };
        assert_eq!(near_the_end.last_projected_year(), None);
        assert_eq!(near_the_end.horizon(), vec![i32::MAX.to_string()]);

        let oversized = PlanningSettings {
            horizon_years: u32::MAX,
            ..PlanningSettings::for_year(2025)
        };
        assert_eq!(oversized.last_projected_year(), None);
        assert_eq!(PlanningSettings::for_year(2025).last_projected_year(), Some(2029));
    }
}
