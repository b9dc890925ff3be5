use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::code::ReconciledCodeSet;

/// Final per-report output. Field order and key names are the public schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCodes {
    #[serde(rename = "Clinical Terms")]
    pub clinical_terms: Vec<String>,
    #[serde(rename = "Anatomical Locations")]
    pub anatomical_locations: Vec<String>,
    #[serde(rename = "Diagnosis")]
    pub diagnosis: Vec<String>,
    #[serde(rename = "Procedures")]
    pub procedures: Vec<String>,
    #[serde(rename = "ICD-10")]
    pub icd10: Vec<String>,
    #[serde(rename = "CPT")]
    pub cpt: Vec<String>,
    #[serde(rename = "HCPCS")]
    pub hcpcs: Vec<String>,
}

/// Header fields found in the report text. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub visit_date: Option<String>,
}

/// Richer per-report record keeping candidate descriptions and sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedReport {
    pub report_id: String,
    pub patient_info: PatientInfo,
    pub icd_codes: ReconciledCodeSet,
    pub cpt_codes: ReconciledCodeSet,
    pub hcpcs_codes: Vec<String>,
    pub sections: BTreeMap<String, String>,
    pub raw_text_length: usize,
}
