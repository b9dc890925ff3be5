use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use sha2::{Digest, Sha256};

use super::columns::detect_columns;
use super::CatalogLoadError;
use crate::models::CatalogEntry;

/// Load (code, description) rows from a CSV or TSV catalog.
///
/// The first row is the header. `.tsv` / `.tab` files are tab-delimited,
/// everything else comma-delimited. Short rows yield empty cells.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>, CatalogLoadError> {
    if !path.exists() {
        return Err(CatalogLoadError::NotFound(path.to_path_buf()));
    }

    let unreadable = |e: csv::Error| CatalogLoadError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .flexible(true)
        .from_path(path)
        .map_err(unreadable)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(unreadable)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let layout = match detect_columns(&headers) {
        Some(layout) if !(headers.len() == 1 && headers[0].is_empty()) => layout,
        _ => return Err(CatalogLoadError::NoColumns(path.to_path_buf())),
    };

    let mut entries = Vec::new();
    for row in reader.records() {
        let row = row.map_err(unreadable)?;
        entries.push(CatalogEntry::new(
            cell(&row, layout.code),
            cell(&row, layout.description),
        ));
    }

    if entries.is_empty() {
        return Err(CatalogLoadError::Empty(path.to_path_buf()));
    }

    tracing::debug!(
        path = %path.display(),
        rows = entries.len(),
        code_column = %headers[layout.code],
        description_column = %headers[layout.description],
        "Catalog loaded"
    );

    Ok(entries)
}

/// SHA-256 over the ordered rows. Changes whenever a code, a description
/// or the row order changes.
pub fn catalog_fingerprint(entries: &[CatalogEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.code.as_bytes());
        hasher.update([0x1f]);
        hasher.update(entry.description.as_bytes());
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}

fn delimiter_for(path: &Path) -> u8 {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

fn cell(row: &StringRecord, idx: usize) -> String {
    row.get(idx).unwrap_or_default().trim().to_string()
}
