use std::sync::LazyLock;

use regex::Regex;

use crate::models::PatientInfo;

static PATIENT_ID: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:patient id|patientid|mrn|medical record number)[:\s]+([A-Z0-9\-]+)")
            .unwrap(),
        Regex::new(r"(?i)\b(?:id|mrn)[:\s]+([A-Z0-9\-]+)").unwrap(),
    ]
});

/// Labelled names only; the name itself must be two capitalised words.
static PATIENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:patient name|name)[:\s]+([A-Z][a-z]+ [A-Z][a-z]+)").unwrap()
});

static DATE_OF_BIRTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:dob|date of birth|birth date)[:\s]+(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})")
        .unwrap()
});

static VISIT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:visit date|date of service|dos|date)[:\s]+(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})",
    )
    .unwrap()
});

/// Unlabelled `MM/DD/YYYY`, used when no labelled date exists.
static ANY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{4})\b").unwrap());

static AGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bage[:\s]+(\d+)").unwrap());

static GENDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:gender|sex)[:\s]+(male|female|m|f)\b").unwrap()
});

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Header fields of a report. Anything not found stays `None`.
pub fn extract_patient_info(text: &str) -> PatientInfo {
    let patient_id = PATIENT_ID.iter().find_map(|p| first_capture(p, text));

    let date_of_birth =
        first_capture(&DATE_OF_BIRTH, text).or_else(|| first_capture(&ANY_DATE, text));
    let visit_date =
        first_capture(&VISIT_DATE, text).or_else(|| first_capture(&ANY_DATE, text));

    PatientInfo {
        patient_id,
        name: first_capture(&PATIENT_NAME, text),
        date_of_birth,
        age: first_capture(&AGE, text).and_then(|a| a.parse().ok()),
        gender: first_capture(&GENDER, text),
        visit_date,
    }
}
