//! Document-level driver: split a document into reports, extract each one,
//! serialize the results.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::config::ExtractionConfig;

/// Two or more consecutive blank lines separate reports.
static REPORT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\n\n+").unwrap());

#[derive(Error, Debug)]
pub enum DocumentReadError {
    #[error("Input document not found: {0}")]
    NotFound(PathBuf),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of report text. PDF and OCR readers live outside this crate.
pub trait DocumentReader {
    fn read_text(&self, path: &Path) -> Result<String, DocumentReadError>;
}

/// Reads a file as UTF-8, replacing invalid sequences.
pub struct PlainTextReader;

impl DocumentReader for PlainTextReader {
    fn read_text(&self, path: &Path) -> Result<String, DocumentReadError> {
        if !path.exists() {
            return Err(DocumentReadError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|source| DocumentReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Trimmed segments longer than `min_chars` characters.
pub fn split_reports(text: &str, min_chars: usize) -> Vec<&str> {
    REPORT_SEPARATOR
        .split(text)
        .map(str::trim)
        .filter(|segment| segment.chars().count() > min_chars)
        .collect()
}

/// Reports to process: the split segments (at most `max_reports`), or the
/// whole document when no segment qualifies.
pub fn select_reports<'t>(text: &'t str, config: &ExtractionConfig) -> Vec<&'t str> {
    let mut reports = split_reports(text, config.min_report_chars);
    if reports.is_empty() {
        tracing::info!("No report separators found, processing as a single report");
        return vec![text];
    }

    if reports.len() > config.max_reports {
        tracing::warn!(
            found = reports.len(),
            max = config.max_reports,
            "Extra reports ignored"
        );
        reports.truncate(config.max_reports);
    }
    reports
}

/// Identifier of the report at zero-based `index`.
pub fn report_id(index: usize) -> String {
    format!("report_{}", index + 1)
}

/// Run `extract` on every report. A failing report is logged and skipped;
/// the rest of the batch continues.
pub fn process_batch<T, E, F>(reports: &[&str], mut extract: F) -> Vec<T>
where
    E: std::fmt::Display,
    F: FnMut(&str, &str) -> Result<T, E>,
{
    let mut results = Vec::with_capacity(reports.len());

    for (index, &text) in reports.iter().enumerate() {
        let id = report_id(index);
        match extract(text, &id) {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!(
                report = index + 1,
                error = %e,
                "Report extraction failed, skipping"
            ),
        }
    }

    tracing::info!(
        reports = reports.len(),
        succeeded = results.len(),
        "Batch complete"
    );
    results
}

/// One result serializes as a bare object, any other count as an array.
pub fn serialize_reports<T: Serialize>(results: &[T]) -> serde_json::Result<String> {
    match results {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    }
}
