use crate::infra::{seeded_store, DemoStore, ARTS, DEMO_ACTUAL, INTERNATIONAL_FEE, MQBS};
use chrono::{Datelike, Local};
use clap::Args;
use commence_planner::error::AppError;
use commence_planner::workflows::estimates::projection::SkippedFact;
use commence_planner::workflows::estimates::{
    CreateScenarioRequest, EstimatesError, FactComparison, FactSummary, NewVersionRequest,
    PlanningSettings, RequestContext, RowEdit, RuleDefinition, StudyPeriod,
};
use rust_decimal::Decimal;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Year to recalibrate from the seeded actuals (defaults to the current year)
    #[arg(long)]
    pub(crate) year: Option<i32>,
    /// Number of years to project after the current one
    #[arg(long)]
    pub(crate) horizon: Option<u32>,
    /// Growth rate applied when no rule matches (e.g. 0.03)
    #[arg(long)]
    pub(crate) default_rate: Option<Decimal>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut settings = PlanningSettings::for_year(args.year.unwrap_or_else(|| Local::now().year()));
    if let Some(horizon) = args.horizon {
        settings.horizon_years = horizon;
    }
    if let Some(rate) = args.default_rate {
        settings.default_rate = rate;
    }

    println!("Commencing enrolment planner demo");
    println!(
        "Recalibrating {} from '{}', projecting {} year(s) at a default rate of {}",
        settings.current_period(),
        DEMO_ACTUAL,
        settings.horizon_years,
        settings.default_rate
    );

    let DemoStore { service, base_id } = seeded_store(settings)?;
    let admin = identity("G1_ADMIN", "planning-office")?;
    let mqbs = identity("G1_FACULTY_MQBS", "mqbs-planner")?;
    let arts = identity("G1_FACULTY_ARTS", "arts-planner")?;
    let recruitment = identity("G1_RECRUITMENT_INTERNATIONAL", "intl-recruitment")?;

    println!("\nRules");
    let authored = [
        (&admin, r#"{"rule_name":"Sector growth","increase_by":0.02}"#, "university-wide planning assumption"),
        (
            &recruitment,
            r#"{"rule_name":"International recovery","increase_by":0.08}"#,
            "agent pipeline recovering",
        ),
        (
            &mqbs,
            r#"{"rule_name":"MQBS postgraduate push","increase_by":0.06,"course_level_names":["Postgraduate"]}"#,
            "",
        ),
    ];
    for (ctx, raw, comment) in authored {
        let definition = RuleDefinition::from_json(raw).map_err(EstimatesError::from)?;
        let rule = service.create_rule(ctx, definition, comment)?;
        println!("- {} [{}]: {}", rule.name, rule.owner_role, rule.description);
    }

    let generated = service.create_scenario(
        &admin,
        CreateScenarioRequest {
            scenario_name: format!("{} Load Plan", service.settings().current_period()),
            actual_name: DEMO_ACTUAL.to_string(),
            base_scenario_id: base_id,
            rules: vec![
                "Sector growth".to_string(),
                "International recovery".to_string(),
                "MQBS postgraduate push".to_string(),
            ],
            notes: String::new(),
        },
    )?;
    println!(
        "\nGenerated {}: {} rows, actual {} vs estimate {} (scale {})",
        generated.scenario.label(),
        generated.rows_inserted,
        generated.total_actual,
        generated.total_base_estimate,
        generated.scale.round_dp(4)
    );
    render_skipped(&generated.skipped);
    let summary = service.scenario_summary(&admin, generated.scenario.id)?;
    render_summary(&summary.summary);

    let mqbs_rows = service.editable_rows(&mqbs, generated.scenario.id)?;
    let next_year = service
        .settings()
        .horizon()
        .first()
        .cloned()
        .unwrap_or_else(|| service.settings().current_period());
    let edits: Vec<RowEdit> = mqbs_rows
        .iter()
        .filter(|row| {
            row.fact.period == next_year
                && row.fact.fee_liability_group == INTERNATIONAL_FEE
                && row.fact.commencing_study_period == StudyPeriod::Session1
        })
        .map(|row| RowEdit {
            row_id: row.id,
            enrolment_count: row.fact.enrolment_count.saturating_sub(25),
        })
        .collect();
    println!(
        "\n{} can edit {} of the generated rows; trimming {} international Session 1 line(s) for {}",
        mqbs.role,
        mqbs_rows.len(),
        edits.len(),
        next_year
    );
    let revised = service.save_to_new_version(
        &mqbs,
        generated.scenario.id,
        NewVersionRequest {
            version_name: None,
            edits,
            note: "visa processing delays".to_string(),
        },
    )?;
    println!("Saved {} ({} rows)", revised.scenario.label(), revised.rows_inserted);

    let comparison = service.compare_scenarios(&admin, generated.scenario.id, revised.scenario.id)?;
    render_comparison(&comparison, MQBS);

    let arts_rows = service.editable_rows(&arts, revised.scenario.id)?;

    println!("\nApproval");
    for ctx in [&arts, &mqbs, &admin] {
        let scenario = service.approve(ctx, revised.scenario.id)?;
        println!("- {} approved: {}", ctx.role, scenario.state().label());
    }
    println!(
        "{} editable row(s) left for {ARTS}",
        service.editable_rows(&arts, revised.scenario.id)?.len()
    );

    match arts_rows.first() {
        Some(row) => {
            let attempt = service.save_to_new_version(
                &arts,
                revised.scenario.id,
                NewVersionRequest {
                    version_name: None,
                    edits: vec![RowEdit {
                        row_id: row.id,
                        enrolment_count: row.fact.enrolment_count + 10,
                    }],
                    note: String::new(),
                },
            );
            match attempt {
                Ok(_) => println!("Unexpected: {ARTS} edited a final scenario"),
                Err(err) => println!("Edit after finalization rejected: {err}"),
            }
        }
        None => println!("No {ARTS} rows to edit"),
    }

    Ok(())
}

fn identity(role: &str, user: &str) -> Result<RequestContext, EstimatesError> {
    Ok(RequestContext::from_identity(role, user)?)
}

pub(crate) fn render_skipped(skipped: &[SkippedFact]) {
    if skipped.is_empty() {
        return;
    }
    println!("Actual facts left out of the projection");
    for entry in skipped {
        println!(
            "- {} {} {} ({}): {} [{:?}]",
            entry.fact.course,
            entry.fact.period,
            entry.fact.commencing_study_period,
            entry.fact.fee_liability_group,
            entry.fact.enrolment_count,
            entry.reason
        );
    }
}

pub(crate) fn render_summary(summary: &FactSummary) {
    println!("\nCommencing load by period");
    for (period, total) in &summary.by_period {
        println!("{period}: {total}");
        if let Some(faculties) = summary.by_faculty.get(period) {
            for (faculty, count) in faculties {
                println!("  - {faculty}: {count}");
            }
        }
    }
    println!("Total: {}", summary.total);
}

fn render_comparison(comparison: &FactComparison, faculty: &str) {
    println!("Changes for {faculty}");
    for (period, faculties) in &comparison.by_faculty {
        if let Some(delta) = faculties.get(faculty) {
            if delta.change != 0 {
                println!(
                    "- {period}: {} -> {} ({:+})",
                    delta.baseline, delta.candidate, delta.change
                );
            }
        }
    }
}
