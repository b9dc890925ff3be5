use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Clinical term patterns; capture group 1 is the term.
static TERM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(colon polyps|polyps?)\b",
        r"(?i)\b(internal hemorrhoids?|hemorrhoids?)\b",
        r"(?i)\b(diverticulosis|diverticulitis)\b",
        r"(?i)\b(melanosis coli)\b",
        r"(?i)\b(rectal (?:exam|examination|erosion|proctitis))\b",
        r"(?i)\b(bowel preparation|preparation)\b",
        r"(?i)\b(no polyps?|polyps? found|polyps? revealed)\b",
        r"(?i)\b(no complications|complications)\b",
        r"(?i)\b(colonoscopy|colonoscope)\b",
        r"(?i)\b(sigmoid diverticulosis)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Phrases picked up when they appear inside the impression.
const IMPRESSION_TERMS: &[&str] = &[
    "colon polyps",
    "history of colon polyps",
    "colonic polyps",
    "internal hemorrhoids",
    "hemorrhoids",
    "diverticulosis",
    "sigmoid diverticulosis",
    "melanosis coli",
    "no polyps",
    "rectal erosion",
    "good bowel preparation",
    "no complications",
];

/// Anatomical patterns, matched against lowercased text.
static LOCATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(rectum|rectal)\b",
        r"\b(sigmoid(?: colon)?)\b",
        r"\b(cecum|caecum)\b",
        r"\b(proximal colon)\b",
        r"\b(ileocecal valve)\b",
        r"\b(appendiceal orifice|appendix orifice)\b",
        r"\b(distal rectum)\b",
        r"\b(anal verge)\b",
        r"\b(colon|colonic)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Impression phrases reported verbatim as diagnoses.
const IMPRESSION_DIAGNOSES: &[&str] = &[
    "Personal history of colonic polyps",
    "Internal hemorrhoids",
    "Diverticulosis",
    "Melanosis coli",
    "No new polyps",
    "No polyps seen",
];

/// (mention anywhere in the report, diagnosis it implies)
const MENTION_DIAGNOSES: &[(&str, &str)] = &[
    ("diverticulosis", "Diverticulosis (sigmoid)"),
    ("melanosis coli", "Melanosis coli"),
    ("internal hemorrhoids", "Internal hemorrhoids"),
    ("no polyps", "No new polyps seen in this examination"),
];

/// Procedure keywords and the label each one maps to.
static PROCEDURE_KEYWORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bcolonoscopy\b", "Colonoscopy"),
        (r"(?i)\brectal exam(?:ination)?\b", "Rectal examination"),
        (r"(?i)\b(?:scope passage|colonoscope)\b", "Scope passage to cecum"),
        (r"(?i)\bretroflexion\b", "Retroflexion in rectum"),
        (
            r"(?i)\b(?:monitored anesthesia care|mac)\b",
            "Monitored Anesthesia Care (MAC)",
        ),
        (
            r"(?i)\b(?:intravenous|iv)\b",
            "Intravenous medication administration (Lidocaine, Propofol, Lactated Ringer's)",
        ),
    ]
    .into_iter()
    .map(|(p, label)| (Regex::new(p).unwrap(), label))
    .collect()
});

static IMPRESSION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)impression[:\s]+").unwrap());

/// Text of the first impression, up to a blank line, `plan:` or the end.
pub fn impression_text(text: &str) -> Option<&str> {
    let header = IMPRESSION_HEADER.find(text)?;
    let rest = &text[header.end()..];
    let lower = rest.to_ascii_lowercase();

    let end = [lower.find("\n\n"), lower.find("plan:")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());

    let body = &rest[..end];
    (!body.is_empty()).then_some(body)
}

/// Clinical terms, sorted and capitalised ("No ..." phrases keep a capital
/// on the following word).
pub fn clinical_terms(text: &str) -> Vec<String> {
    let mut terms = BTreeSet::new();

    for pattern in TERM_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            if let Some(term) = caps.get(1) {
                terms.insert(term.as_str().trim().to_lowercase());
            }
        }
    }

    if let Some(impression) = impression_text(text) {
        let impression = impression.to_lowercase();
        for phrase in IMPRESSION_TERMS {
            if impression.contains(phrase) {
                terms.insert((*phrase).to_string());
            }
        }
    }

    terms.into_iter().map(|t| format_term(&t)).collect()
}

fn format_term(term: &str) -> String {
    match term.strip_prefix("no ") {
        Some(rest) => format!("No {}", capitalize(rest)),
        None => capitalize(term),
    }
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Anatomical locations, normalised and sorted.
pub fn anatomical_locations(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut locations = BTreeSet::new();

    for pattern in LOCATION_PATTERNS.iter() {
        for caps in pattern.captures_iter(&lower) {
            let Some(found) = caps.get(1) else { continue };
            let location = match found.as_str().trim() {
                "" => continue,
                "rectal" => "Rectum".to_string(),
                "colonic" => "Colon".to_string(),
                "sigmoid" => "Sigmoid colon".to_string(),
                other => capitalize(other),
            };
            locations.insert(location);
        }
    }

    locations.into_iter().collect()
}

/// Diagnosis descriptions: the given catalog descriptions plus phrases
/// found in the impression or anywhere in the report. Sorted, unique.
pub fn diagnosis_descriptions<'a>(
    text: &str,
    code_descriptions: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut diagnoses: BTreeSet<String> = code_descriptions
        .into_iter()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(impression) = impression_text(text) {
        let impression = impression.to_lowercase();
        for phrase in IMPRESSION_DIAGNOSES {
            if impression.contains(&phrase.to_lowercase()) {
                diagnoses.insert((*phrase).to_string());
            }
        }
    }

    let lower = text.to_lowercase();
    for (mention, diagnosis) in MENTION_DIAGNOSES {
        if lower.contains(mention) {
            diagnoses.insert((*diagnosis).to_string());
        }
    }

    diagnoses.into_iter().collect()
}

/// Procedure labels for every keyword found (whole words only).
pub fn procedure_descriptions(text: &str) -> Vec<String> {
    PROCEDURE_KEYWORDS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(text))
        .map(|(_, label)| (*label).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
