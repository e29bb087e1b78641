use crate::demo::{render_skipped, render_summary};
use clap::Args;
use commence_planner::config::AppConfig;
use commence_planner::error::AppError;
use commence_planner::workflows::estimates::import::{facts_from_path, write_facts_to_path};
use commence_planner::workflows::estimates::{
    project, EstimatesError, FactSummary, PlanningSettings, ProjectionOutcome, ProjectionRequest,
    Role, Rule, RuleDefinition, RuleResolver,
};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub(crate) struct ProjectArgs {
    /// Actuals snapshot CSV (warehouse export headers)
    #[arg(long)]
    pub(crate) actuals: PathBuf,
    /// Base scenario CSV holding the published estimates
    #[arg(long)]
    pub(crate) base: PathBuf,
    /// JSON file with an ordered array of rule definitions; later rules win
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Role the rule file is authored under
    #[arg(long, default_value = "G1_ADMIN")]
    pub(crate) rules_owner: String,
    /// Year to recalibrate (overrides APP_CURRENT_YEAR)
    #[arg(long)]
    pub(crate) year: Option<i32>,
    /// Years to project after the current one (overrides APP_HORIZON_YEARS)
    #[arg(long)]
    pub(crate) horizon: Option<u32>,
    /// Growth rate when no rule matches (overrides APP_DEFAULT_INCREASE)
    #[arg(long)]
    pub(crate) default_rate: Option<Decimal>,
    /// Write the projected facts to this CSV
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Print every projected fact
    #[arg(long)]
    pub(crate) show_facts: bool,
}

pub(crate) fn run_projection(args: ProjectArgs) -> Result<(), AppError> {
    run_projection_with(args, AppConfig::load()?.planning)
}

fn run_projection_with(args: ProjectArgs, planning: PlanningSettings) -> Result<(), AppError> {
    let settings = settings_for(&args, planning);
    if settings.last_projected_year().is_none() {
        return Err(EstimatesError::InvalidRequest(format!(
            "a {} year horizon from {} runs past the last representable year",
            settings.horizon_years, settings.current_year
        ))
        .into());
    }
    let rules = match &args.rules {
        Some(path) => load_rules(path, &args.rules_owner)?,
        None => Vec::new(),
    };

    let outcome = project_files(&args.actuals, &args.base, rules, &settings)?;

    println!(
        "Recalibrated {} from {}: actual {} vs estimate {} (scale {})",
        settings.current_period(),
        args.actuals.display(),
        outcome.total_actual,
        outcome.total_base_estimate,
        outcome.scale.round_dp(4)
    );
    render_skipped(&outcome.skipped);
    render_summary(&FactSummary::from_facts(outcome.facts.iter()));

    if args.show_facts {
        println!("\nProjected facts");
        for fact in &outcome.facts {
            println!(
                "- {} {} {} ({}, {}): {}",
                fact.period,
                fact.course,
                fact.commencing_study_period,
                fact.course_level,
                fact.fee_liability_group,
                fact.enrolment_count
            );
        }
    }

    if let Some(output) = &args.output {
        write_facts_to_path(output, &outcome.facts)?;
        println!("\nWrote {} fact(s) to {}", outcome.facts.len(), output.display());
    }

    Ok(())
}

fn settings_for(args: &ProjectArgs, mut settings: PlanningSettings) -> PlanningSettings {
    if let Some(year) = args.year {
        settings.current_year = year;
    }
    if let Some(horizon) = args.horizon {
        settings.horizon_years = horizon;
    }
    if let Some(rate) = args.default_rate {
        settings.default_rate = rate;
    }
    settings
}

fn load_rules(path: &Path, owner: &str) -> Result<Vec<Rule>, AppError> {
    let raw = fs::read_to_string(path)?;
    let owner = Role::from_identifier(owner).map_err(EstimatesError::from)?;
    let definitions = RuleDefinition::list_from_json(&raw).map_err(EstimatesError::from)?;
    let rules = definitions
        .into_iter()
        .map(|definition| Rule::from_definition(definition, owner))
        .collect::<Result<Vec<_>, _>>()
        .map_err(EstimatesError::from)?;
    Ok(rules)
}

/// Projection without reference validation; files are trusted to carry known keys.
fn project_files(
    actuals: &Path,
    base: &Path,
    rules: Vec<Rule>,
    settings: &PlanningSettings,
) -> Result<ProjectionOutcome, AppError> {
    let actuals = facts_from_path(actuals)?;
    let base = facts_from_path(base)?;
    let resolver = RuleResolver::new(rules, settings.default_rate);
    let current_period = settings.current_period();
    let horizon = settings.horizon();

    let outcome = project(&ProjectionRequest {
        actuals: &actuals,
        base: &base,
        current_period: &current_period,
        horizon: &horizon,
        resolver: &resolver,
        reference: None,
    })
    .map_err(EstimatesError::from)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use commence_planner::workflows::estimates::import::parse_facts;
    use std::env;
    use std::process;

    const HEADER: &str = "COURSE,PERIOD,COMMENCING_STUDY_PERIOD,OWNING_FACULTY,COURSE_LEVEL_NAME,FEE_LIABILITY_GROUP,COURSE_ENROLMENT_COUNT\n";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("commence-planner-{name}-{}", process::id()));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn args(dir: &Path) -> ProjectArgs {
        ProjectArgs {
            actuals: dir.join("actuals.csv"),
            base: dir.join("base.csv"),
            rules: None,
            rules_owner: "G1_ADMIN".to_string(),
            year: Some(2025),
            horizon: Some(1),
            default_rate: None,
            output: None,
            show_facts: false,
        }
    }

    fn write_inputs(dir: &Path) {
        fs::write(
            dir.join("base.csv"),
            format!(
                "{HEADER}Bachelor of Arts,2025,Session 1,Faculty of Arts,Undergraduate,Commonwealth Supported,400\n\
                 Bachelor of Arts,2025,Session 2,Faculty of Arts,Undergraduate,Commonwealth Supported,100\n"
            ),
        )
        .expect("base written");
        fs::write(
            dir.join("actuals.csv"),
            format!("{HEADER}Bachelor of Arts,2025,Session 1,Faculty of Arts,Undergraduate,Commonwealth Supported,500\n"),
        )
        .expect("actuals written");
    }

    #[test]
    fn arguments_override_configured_planning() {
        let dir = scratch_dir("settings");
        let mut args = args(&dir);
        args.default_rate = Some(Decimal::new(5, 2));

        let settings = settings_for(&args, PlanningSettings::for_year(2031));

        assert_eq!(settings.current_year, 2025);
        assert_eq!(settings.horizon_years, 1);
        assert_eq!(settings.default_rate, Decimal::new(5, 2));
    }

    #[test]
    fn rule_files_are_applied_in_order() {
        let dir = scratch_dir("rules");
        write_inputs(&dir);
        let rules_path = dir.join("rules.json");
        fs::write(
            &rules_path,
            r#"[
                {"rule_name": "everyone", "increase_by": 0.5},
                {"rule_name": "arts", "increase_by": 0.1, "owning_faculties": ["Faculty of Arts"]}
            ]"#,
        )
        .expect("rules written");

        let rules = load_rules(&rules_path, "G1_ADMIN").expect("rules load");
        assert_eq!(rules.len(), 2);

        let args = args(&dir);
        let settings = settings_for(&args, PlanningSettings::for_year(2025));
        let outcome = project_files(&args.actuals, &args.base, rules, &settings).expect("projects");

        let counts: Vec<(String, u64)> = outcome
            .facts
            .iter()
            .map(|fact| (format!("{} {}", fact.period, fact.commencing_study_period), fact.enrolment_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("2025 Session 1".to_string(), 500),
                ("2025 Session 2".to_string(), 125),
                ("2026 Session 1".to_string(), 550),
                ("2026 Session 2".to_string(), 138),
            ]
        );
    }

    #[test]
    fn unknown_rule_owner_is_rejected() {
        let dir = scratch_dir("owner");
        let rules_path = dir.join("rules.json");
        fs::write(&rules_path, "[]").expect("rules written");

        assert!(matches!(
            load_rules(&rules_path, "G1_VISITOR"),
            Err(AppError::Estimates(EstimatesError::Role(_)))
        ));
    }

    #[test]
    fn projections_can_be_written_out() {
        let dir = scratch_dir("output");
        write_inputs(&dir);
        let mut args = args(&dir);
        let output = dir.join("projected.csv");
        args.output = Some(output.clone());

        run_projection_with(args, PlanningSettings::for_year(2025)).expect("projection runs");

        let written = parse_facts(fs::File::open(&output).expect("output exists")).expect("parses");
        assert_eq!(written.len(), 4);
        assert_eq!(written.iter().map(|fact| fact.enrolment_count).sum::<u64>(), 500 + 125 + 515 + 129);
    }

    #[test]
    fn horizons_past_the_last_year_are_refused() {
        let dir = scratch_dir("horizon");
        write_inputs(&dir);
        let mut args = args(&dir);
        args.horizon = Some(u32::MAX);

        assert!(matches!(
            run_projection_with(args, PlanningSettings::for_year(2025)),
            Err(AppError::Estimates(EstimatesError::InvalidRequest(_)))
        ));
    }
}
