use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Teaching period in which a cohort commences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StudyPeriod {
    #[serde(rename = "Session 1")]
    Session1,
    #[serde(rename = "Session 2")]
    Session2,
    #[serde(rename = "Session 3")]
    Session3,
    #[serde(rename = "Term 1")]
    Term1,
    #[serde(rename = "Term 2")]
    Term2,
    #[serde(rename = "Term 3")]
    Term3,
    #[serde(rename = "Term 4")]
    Term4,
    #[serde(rename = "Term 5")]
    Term5,
    #[serde(rename = "Term 6")]
    Term6,
}

impl StudyPeriod {
    pub const fn ordered() -> [Self; 9] {
        [
            Self::Session1,
            Self::Session2,
            Self::Session3,
            Self::Term1,
            Self::Term2,
            Self::Term3,
            Self::Term4,
            Self::Term5,
            Self::Term6,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Session1 => "Session 1",
            Self::Session2 => "Session 2",
            Self::Session3 => "Session 3",
            Self::Term1 => "Term 1",
            Self::Term2 => "Term 2",
            Self::Term3 => "Term 3",
            Self::Term4 => "Term 4",
            Self::Term5 => "Term 5",
            Self::Term6 => "Term 6",
        }
    }

    pub const fn is_session_one(self) -> bool {
        matches!(self, Self::Session1)
    }
}

impl fmt::Display for StudyPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized commencing study period '{0}'")]
pub struct UnknownStudyPeriod(pub String);

impl FromStr for StudyPeriod {
    type Err = UnknownStudyPeriod;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ordered()
            .into_iter()
            .find(|period| period.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStudyPeriod(value.to_string()))
    }
}

/// Faculty groups that carry their own confirmation flag on a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacultyGroup {
    Arts,
    Mqbs,
    Sci,
    Fmhhs,
}

impl FacultyGroup {
    pub const fn ordered() -> [Self; 4] {
        [Self::Arts, Self::Mqbs, Self::Sci, Self::Fmhhs]
    }

    /// Owning faculty name as it appears on enrolment facts.
    pub const fn faculty_name(self) -> &'static str {
        match self {
            Self::Arts => "Faculty of Arts",
            Self::Mqbs => "Macquarie Business School",
            Self::Sci => "Faculty of Science and Engineering",
            Self::Fmhhs => "Faculty of Medicine, Health and Human Sciences",
        }
    }

    pub const fn short_label(self) -> &'static str {
        match self {
            Self::Arts => "ARTS",
            Self::Mqbs => "MQBS",
            Self::Sci => "SCI",
            Self::Fmhhs => "FMHHS",
        }
    }

    pub fn from_faculty_name(name: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|group| group.faculty_name() == name.trim())
    }
}

/// Natural key of an enrolment fact within one scenario.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionalKey {
    pub period: String,
    pub owning_faculty: String,
    pub course: String,
    pub commencing_study_period: StudyPeriod,
    pub course_level: String,
    pub fee_liability_group: String,
}

impl DimensionalKey {
    pub fn with_period(&self, period: &str) -> Self {
        Self {
            period: period.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for DimensionalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {} / {} / {} / {}",
            self.course,
            self.period,
            self.commencing_study_period,
            self.owning_faculty,
            self.course_level,
            self.fee_liability_group
        )
    }
}

/// One commencing enrolment count for a dimensional key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolmentFact {
    pub course: String,
    pub period: String,
    pub commencing_study_period: StudyPeriod,
    pub owning_faculty: String,
    pub course_level: String,
    pub fee_liability_group: String,
    pub enrolment_count: u64,
}

impl EnrolmentFact {
    pub fn key(&self) -> DimensionalKey {
        DimensionalKey {
            period: self.period.clone(),
            owning_faculty: self.owning_faculty.clone(),
            course: self.course.clone(),
            commencing_study_period: self.commencing_study_period,
            course_level: self.course_level.clone(),
            fee_liability_group: self.fee_liability_group.clone(),
        }
    }

    pub fn from_key(key: DimensionalKey, enrolment_count: u64) -> Self {
        Self {
            course: key.course,
            period: key.period,
            commencing_study_period: key.commencing_study_period,
            owning_faculty: key.owning_faculty,
            course_level: key.course_level,
            fee_liability_group: key.fee_liability_group,
            enrolment_count,
        }
    }

    pub fn is_session_one(&self) -> bool {
        self.commencing_study_period.is_session_one()
    }
}

/// Immutable capture of actual commencements for one round (e.g. "March 2025").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actual {
    pub actual_name: String,
    pub facts: Vec<EnrolmentFact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub u64);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

/// Version name given to the first version produced by the projection engine.
pub const INITIAL_VERSION: &str = "init";

/// Scenario version header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub scenario_name: String,
    pub version_name: String,
    pub is_final: bool,
    pub confirmed_by: BTreeSet<FacultyGroup>,
    pub notes: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Scenario {
    /// Display label used by pickers, e.g. `2025 Load Plan (init)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.scenario_name, self.version_name)
    }

    pub fn is_confirmed_by(&self, faculty: FacultyGroup) -> bool {
        self.confirmed_by.contains(&faculty)
    }
}

/// Header fields supplied when a new version is persisted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScenario {
    pub scenario_name: String,
    pub version_name: String,
    pub notes: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl NewScenario {
    pub fn into_scenario(self, id: ScenarioId) -> Scenario {
        Scenario {
            id,
            scenario_name: self.scenario_name,
            version_name: self.version_name,
            is_final: false,
            confirmed_by: BTreeSet::new(),
            notes: self.notes,
            updated_by: self.created_by.clone(),
            updated_at: self.created_at,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

/// Enrolment fact owned by a scenario version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub id: RowId,
    pub scenario_id: ScenarioId,
    #[serde(flatten)]
    pub fact: EnrolmentFact,
}
