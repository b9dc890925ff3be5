use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::CodeSystem;

/// Letter, two digits, optional dot and 1-4 digits (`K64.8`, `Z86.0100`, `I10`).
static ICD_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]\d{2}(?:\.\d{1,4})?\b").unwrap());

/// Any standalone five-digit number.
static CPT_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").unwrap());

/// Letter followed by four digits.
static HCPCS_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]\d{4}\b").unwrap());

/// Leading letters accepted for HCPCS Level II codes.
const HCPCS_LEADING: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'G', 'H', 'J', 'K', 'L', 'M', 'P', 'Q', 'R', 'S', 'T', 'V',
];

/// Distinct explicit codes of `system`, in order of first appearance.
pub fn find_explicit_codes(system: CodeSystem, text: &str) -> Vec<String> {
    let pattern = match system {
        CodeSystem::Icd => &*ICD_CODE,
        CodeSystem::Cpt => &*CPT_CODE,
    };

    let mut seen = HashSet::new();
    pattern
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|code| seen.insert(*code))
        .map(str::to_string)
        .collect()
}

/// HCPCS codes, sorted and unique.
pub fn find_hcpcs_codes(text: &str) -> Vec<String> {
    HCPCS_CODE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|code| code.starts_with(HCPCS_LEADING))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
