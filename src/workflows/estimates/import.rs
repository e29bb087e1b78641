//! CSV loading for actual snapshots and scenario data exports, and the matching writer.
//!
//! Files use the warehouse column names (`COURSE`, `PERIOD`, `COMMENCING_STUDY_PERIOD`,
//! `OWNING_FACULTY`, `COURSE_LEVEL_NAME`, `FEE_LIABILITY_GROUP`, `COURSE_ENROLMENT_COUNT`);
//! actual snapshots add `ACTUAL_NAME`. Reference tables are read from JSON.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::{Actual, EnrolmentFact, StudyPeriod, UnknownStudyPeriod};
use super::reference::ReferenceData;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("line {line}: {source}")]
    StudyPeriod {
        line: usize,
        #[source]
        source: UnknownStudyPeriod,
    },
    #[error("line {line}: ACTUAL_NAME is required for actual snapshots")]
    MissingActualName { line: usize },
    #[error("reference data in {path} is malformed: {source}")]
    Reference {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct FactRow {
    #[serde(rename = "ACTUAL_NAME", default)]
    actual_name: Option<String>,
    #[serde(rename = "COURSE")]
    course: String,
    #[serde(rename = "PERIOD")]
    period: String,
    #[serde(rename = "COMMENCING_STUDY_PERIOD")]
    commencing_study_period: String,
    #[serde(rename = "OWNING_FACULTY")]
    owning_faculty: String,
    #[serde(rename = "COURSE_LEVEL_NAME")]
    course_level: String,
    #[serde(rename = "FEE_LIABILITY_GROUP")]
    fee_liability_group: String,
    #[serde(rename = "COURSE_ENROLMENT_COUNT")]
    enrolment_count: u64,
}

impl FactRow {
    fn into_fact(self, line: usize) -> Result<EnrolmentFact, ImportError> {
        let commencing_study_period = self
            .commencing_study_period
            .parse::<StudyPeriod>()
            .map_err(|source| ImportError::StudyPeriod { line, source })?;
        Ok(EnrolmentFact {
            course: self.course,
            period: self.period,
            commencing_study_period,
            owning_faculty: self.owning_faculty,
            course_level: self.course_level,
            fee_liability_group: self.fee_liability_group,
            enrolment_count: self.enrolment_count,
        })
    }
}

#[derive(Serialize)]
struct FactRecord<'a> {
    #[serde(rename = "COURSE")]
    course: &'a str,
    #[serde(rename = "PERIOD")]
    period: &'a str,
    #[serde(rename = "COMMENCING_STUDY_PERIOD")]
    commencing_study_period: &'static str,
    #[serde(rename = "OWNING_FACULTY")]
    owning_faculty: &'a str,
    #[serde(rename = "COURSE_LEVEL_NAME")]
    course_level: &'a str,
    #[serde(rename = "FEE_LIABILITY_GROUP")]
    fee_liability_group: &'a str,
    #[serde(rename = "COURSE_ENROLMENT_COUNT")]
    enrolment_count: u64,
}

impl<'a> From<&'a EnrolmentFact> for FactRecord<'a> {
    fn from(fact: &'a EnrolmentFact) -> Self {
        Self {
            course: &fact.course,
            period: &fact.period,
            commencing_study_period: fact.commencing_study_period.label(),
            owning_faculty: &fact.owning_faculty,
            course_level: &fact.course_level,
            fee_liability_group: &fact.fee_liability_group,
            enrolment_count: fact.enrolment_count,
        }
    }
}

fn rows<R: Read>(reader: R) -> impl Iterator<Item = Result<(usize, FactRow), ImportError>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_deserialize::<FactRow>()
        .enumerate()
        // line 1 is the header
        .map(|(index, row)| row.map(|row| (index + 2, row)).map_err(ImportError::from))
}

/// Parse a scenario data export. `ACTUAL_NAME`, when present, is ignored.
pub fn parse_facts<R: Read>(reader: R) -> Result<Vec<EnrolmentFact>, ImportError> {
    rows(reader)
        .map(|row| row.and_then(|(line, row)| row.into_fact(line)))
        .collect()
}

/// Parse an actuals export holding one or more named snapshots, ordered by name.
pub fn parse_actuals<R: Read>(reader: R) -> Result<Vec<Actual>, ImportError> {
    let mut snapshots: BTreeMap<String, Vec<EnrolmentFact>> = BTreeMap::new();
    for row in rows(reader) {
        let (line, mut row) = row?;
        let actual_name = row
            .actual_name
            .take()
            .filter(|name| !name.is_empty())
            .ok_or(ImportError::MissingActualName { line })?;
        snapshots
            .entry(actual_name)
            .or_default()
            .push(row.into_fact(line)?);
    }

    Ok(snapshots
        .into_iter()
        .map(|(actual_name, facts)| Actual { actual_name, facts })
        .collect())
}

pub fn facts_from_path(path: impl AsRef<Path>) -> Result<Vec<EnrolmentFact>, ImportError> {
    parse_facts(open(path.as_ref())?)
}

pub fn actuals_from_path(path: impl AsRef<Path>) -> Result<Vec<Actual>, ImportError> {
    parse_actuals(open(path.as_ref())?)
}

/// Reference tables as serialized by [`ReferenceData`]; missing tables are empty.
pub fn reference_from_path(path: impl AsRef<Path>) -> Result<ReferenceData, ImportError> {
    let path = path.as_ref();
    serde_json::from_reader(open(path)?).map_err(|source| ImportError::Reference {
        path: path.display().to_string(),
        source,
    })
}

/// Write facts in the scenario data export layout read by [`parse_facts`].
pub fn write_facts<W: Write>(writer: W, facts: &[EnrolmentFact]) -> Result<(), ImportError> {
    let mut writer = csv::Writer::from_writer(writer);
    for fact in facts {
        writer.serialize(FactRecord::from(fact))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_facts_to_path(path: impl AsRef<Path>, facts: &[EnrolmentFact]) -> Result<(), ImportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_facts(file, facts)
}

fn open(path: &Path) -> Result<File, ImportError> {
    File::open(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })
}
