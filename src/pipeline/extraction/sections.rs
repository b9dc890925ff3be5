use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::CodeSystem;

/// Named report sections recognised by header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    ChiefComplaint,
    HistoryOfPresentIllness,
    ReviewOfSystems,
    PhysicalExamination,
    AssessmentAndPlan,
    Procedures,
    Diagnoses,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::ChiefComplaint,
        Section::HistoryOfPresentIllness,
        Section::ReviewOfSystems,
        Section::PhysicalExamination,
        Section::AssessmentAndPlan,
        Section::Procedures,
        Section::Diagnoses,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::ChiefComplaint => "chief_complaint",
            Self::HistoryOfPresentIllness => "history_of_present_illness",
            Self::ReviewOfSystems => "review_of_systems",
            Self::PhysicalExamination => "physical_examination",
            Self::AssessmentAndPlan => "assessment_and_plan",
            Self::Procedures => "procedures",
            Self::Diagnoses => "diagnoses",
        }
    }

    /// Lowercase marker of the header that usually follows this section.
    fn stop_marker(&self) -> Option<&'static str> {
        match self {
            Self::ChiefComplaint => Some("\nhistory"),
            Self::HistoryOfPresentIllness => Some("\nreview"),
            Self::ReviewOfSystems => Some("\nphysical"),
            Self::PhysicalExamination => Some("\nassessment"),
            Self::AssessmentAndPlan => Some("\nprocedure"),
            Self::Procedures => Some("\ndiagnosis"),
            Self::Diagnoses => None,
        }
    }

    fn header_pattern(&self) -> &'static str {
        match self {
            Self::ChiefComplaint => r"(?i)\b(?:chief complaint|cc)\b:?\s*",
            Self::HistoryOfPresentIllness => r"(?i)\b(?:history of present illness|hpi)\b:?\s*",
            Self::ReviewOfSystems => r"(?i)\b(?:review of systems|ros)\b:?\s*",
            Self::PhysicalExamination => r"(?i)\b(?:physical examination|pe|exam)\b:?\s*",
            Self::AssessmentAndPlan => r"(?i)\b(?:assessment and plan|a&p|assessment)\b:?\s*",
            Self::Procedures => r"(?i)\b(?:procedures performed|procedures?)\b:?\s*",
            Self::Diagnoses => r"(?i)\b(?:final diagnosis|diagnoses|diagnosis)\b:?\s*",
        }
    }

    fn header(&self) -> &'static Regex {
        &SECTION_HEADERS[*self as usize]
    }

    /// Sections whose text feeds the retrieval query for `system`.
    pub fn context_for(system: CodeSystem) -> &'static [Section] {
        match system {
            CodeSystem::Icd => &[
                Section::ChiefComplaint,
                Section::HistoryOfPresentIllness,
                Section::AssessmentAndPlan,
                Section::Diagnoses,
            ],
            CodeSystem::Cpt => &[
                Section::Procedures,
                Section::PhysicalExamination,
                Section::AssessmentAndPlan,
            ],
        }
    }
}

/// Header regexes, indexed like `Section::ALL`.
static SECTION_HEADERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    Section::ALL
        .iter()
        .map(|s| Regex::new(s.header_pattern()).unwrap())
        .collect()
});

/// Section texts of one report. Missing sections read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSections {
    found: BTreeMap<Section, String>,
}

impl ReportSections {
    pub fn get(&self, section: Section) -> &str {
        self.found.get(&section).map(String::as_str).unwrap_or("")
    }

    /// Space-joined text of `sections`, in the given order.
    pub fn joined(&self, sections: &[Section]) -> String {
        sections
            .iter()
            .map(|s| self.get(*s))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All seven keys, empty strings for sections not found.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        Section::ALL
            .iter()
            .map(|s| (s.key().to_string(), self.get(*s).to_string()))
            .collect()
    }
}

/// Locate each section's first header and take the text after it up to the
/// first blank line or the section's stop marker, whitespace-collapsed.
pub fn extract_sections(text: &str) -> ReportSections {
    let lower = text.to_ascii_lowercase();
    let mut found = BTreeMap::new();

    for section in Section::ALL {
        let Some(header) = section.header().find(text) else {
            continue;
        };
        let start = header.end();
        let rest = &lower[start..];

        let mut end = rest.find("\n\n").unwrap_or(rest.len());
        if let Some(marker) = section.stop_marker() {
            if let Some(pos) = rest.find(marker) {
                end = end.min(pos);
            }
        }

        let content = collapse_whitespace(&text[start..start + end]);
        if !content.is_empty() {
            found.insert(section, content);
        }
    }

    ReportSections { found }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
