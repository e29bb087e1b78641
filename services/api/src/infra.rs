use commence_planner::config::DataConfig;
use commence_planner::error::AppError;
use commence_planner::workflows::estimates::import::{
    actuals_from_path, facts_from_path, reference_from_path,
};
use commence_planner::workflows::estimates::{
    Actual, EnrolmentFact, EstimatesError, EstimatesService, FeeLiabilityType,
    ImportScenarioRequest, InMemoryEstimatesRepository, PlanningSettings, ReferenceData,
    RequestContext, ScenarioId, StudyPeriod,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const ARTS: &str = "Faculty of Arts";
pub(crate) const MQBS: &str = "Macquarie Business School";
pub(crate) const SCI: &str = "Faculty of Science and Engineering";
pub(crate) const FMHHS: &str = "Faculty of Medicine, Health and Human Sciences";

pub(crate) const CSP: &str = "Commonwealth Supported";
pub(crate) const DOMESTIC_FEE: &str = "Domestic Fee Paying";
pub(crate) const INTERNATIONAL_FEE: &str = "International Fee Paying";

const UNDERGRADUATE: &str = "Undergraduate";
const POSTGRADUATE: &str = "Postgraduate";

pub(crate) const DEMO_ACTUAL: &str = "March snapshot";
pub(crate) const DEMO_BASE_SCENARIO: &str = "Budget";

/// Course lines: (course, faculty, level, fee group, Session 1 estimate, Session 1 actual,
/// later study period, later estimate).
type CourseLine = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    u64,
    u64,
    StudyPeriod,
    u64,
);

const COURSE_LINES: [CourseLine; 8] = [
    ("Bachelor of Arts", ARTS, UNDERGRADUATE, CSP, 820, 790, StudyPeriod::Session2, 310),
    ("Bachelor of Arts", ARTS, UNDERGRADUATE, INTERNATIONAL_FEE, 95, 112, StudyPeriod::Session2, 40),
    ("Bachelor of Media and Communications", ARTS, UNDERGRADUATE, CSP, 260, 248, StudyPeriod::Session3, 25),
    ("Bachelor of Commerce", MQBS, UNDERGRADUATE, CSP, 1150, 1212, StudyPeriod::Session2, 420),
    ("Bachelor of Commerce", MQBS, UNDERGRADUATE, INTERNATIONAL_FEE, 610, 565, StudyPeriod::Session2, 280),
    ("Master of Applied Finance", MQBS, POSTGRADUATE, INTERNATIONAL_FEE, 180, 201, StudyPeriod::Term3, 60),
    ("Bachelor of Engineering (Honours)", SCI, UNDERGRADUATE, CSP, 540, 552, StudyPeriod::Session2, 130),
    ("Bachelor of Clinical Science", FMHHS, UNDERGRADUATE, DOMESTIC_FEE, 300, 318, StudyPeriod::Session2, 90),
];

/// Offered for the first time this year, so the base scenario has no estimate for it.
const NEW_COURSE: (&str, &str, u64) = ("Bachelor of Cyber Security", SCI, 45);

pub(crate) fn demo_reference(settings: &PlanningSettings) -> ReferenceData {
    let mut reference = ReferenceData::default()
        .with_course_level(UNDERGRADUATE)
        .with_course_level(POSTGRADUATE)
        .with_fee_liability_group(CSP, FeeLiabilityType::Domestic)
        .with_fee_liability_group(DOMESTIC_FEE, FeeLiabilityType::Domestic)
        .with_fee_liability_group(INTERNATIONAL_FEE, FeeLiabilityType::International)
        .with_course(NEW_COURSE.0, NEW_COURSE.1);
    for (course, faculty, ..) in COURSE_LINES {
        reference = reference.with_course(course, faculty);
    }

    reference
        .with_periods([settings.current_period()])
        .with_periods(settings.horizon())
}

fn fact(
    period: &str,
    (course, faculty, level, fee_group): (&str, &str, &str, &str),
    study_period: StudyPeriod,
    count: u64,
) -> EnrolmentFact {
    EnrolmentFact {
        course: course.to_string(),
        period: period.to_string(),
        commencing_study_period: study_period,
        owning_faculty: faculty.to_string(),
        course_level: level.to_string(),
        fee_liability_group: fee_group.to_string(),
        enrolment_count: count,
    }
}

pub(crate) fn demo_base_facts(period: &str) -> Vec<EnrolmentFact> {
    COURSE_LINES
        .iter()
        .flat_map(|&(course, faculty, level, fee, estimate, _, later, later_estimate)| {
            let line = (course, faculty, level, fee);
            [
                fact(period, line, StudyPeriod::Session1, estimate),
                fact(period, line, later, later_estimate),
            ]
        })
        .collect()
}

pub(crate) fn demo_actual(period: &str) -> Actual {
    let mut facts: Vec<EnrolmentFact> = COURSE_LINES
        .iter()
        .map(|&(course, faculty, level, fee, _, actual, _, _)| {
            fact(period, (course, faculty, level, fee), StudyPeriod::Session1, actual)
        })
        .collect();
    let (course, faculty, count) = NEW_COURSE;
    facts.push(fact(
        period,
        (course, faculty, UNDERGRADUATE, CSP),
        StudyPeriod::Session1,
        count,
    ));

    Actual {
        actual_name: DEMO_ACTUAL.to_string(),
        facts,
    }
}

pub(crate) struct DemoStore {
    pub(crate) service: Arc<EstimatesService<InMemoryEstimatesRepository>>,
    pub(crate) base_id: ScenarioId,
}

/// In-memory store holding the demo reference data, an actual snapshot and the budget
/// scenario for the configured year.
pub(crate) fn seeded_store(settings: PlanningSettings) -> Result<DemoStore, EstimatesError> {
    let period = settings.current_period();
    let repository = Arc::new(InMemoryEstimatesRepository::new(demo_reference(&settings)));
    repository.load_actual(demo_actual(&period))?;

    let service = Arc::new(EstimatesService::new(repository, settings));
    let loader = RequestContext::from_identity("ACCOUNTADMIN", "seed-loader")?;
    let base = service.import_scenario(
        &loader,
        ImportScenarioRequest {
            scenario_name: format!("{period} {DEMO_BASE_SCENARIO}"),
            version_name: "published".to_string(),
            notes: "Budget estimates loaded at startup".to_string(),
            facts: demo_base_facts(&period),
        },
    )?;

    Ok(DemoStore {
        service,
        base_id: base.scenario.id,
    })
}

pub(crate) struct LoadedStore {
    pub(crate) service: Arc<EstimatesService<InMemoryEstimatesRepository>>,
    pub(crate) snapshots: usize,
    pub(crate) base_id: Option<ScenarioId>,
}

/// In-memory store filled from the configured planning files. Without any files the store
/// starts empty.
pub(crate) fn configured_store(data: &DataConfig, settings: PlanningSettings) -> Result<LoadedStore, AppError> {
    let reference = match &data.reference_path {
        Some(path) => reference_from_path(path)?,
        None => ReferenceData::default(),
    };
    let repository = Arc::new(InMemoryEstimatesRepository::new(reference));

    let mut snapshots = 0;
    if let Some(path) = &data.actuals_path {
        for actual in actuals_from_path(path)? {
            repository.load_actual(actual).map_err(EstimatesError::from)?;
            snapshots += 1;
        }
    }

    let service = Arc::new(EstimatesService::new(repository, settings));
    let base_id = match &data.base_scenario_path {
        Some(path) => {
            let loader = RequestContext::from_identity("ACCOUNTADMIN", "startup-loader")
                .map_err(EstimatesError::from)?;
            let base = service.import_scenario(
                &loader,
                ImportScenarioRequest {
                    scenario_name: data.base_scenario_name.clone(),
                    version_name: data.base_version_name.clone(),
                    notes: format!("Loaded at startup from {}", path.display()),
                    facts: facts_from_path(path)?,
                },
            )?;
            Some(base.scenario.id)
        }
        None => None,
    };

    Ok(LoadedStore {
        service,
        snapshots,
        base_id,
    })
}
