/// Header keywords that mark the code column.
const CODE_KEYWORDS: &[&str] = &["code", "icd", "cpt"];

/// Header keywords that mark the description column.
const DESCRIPTION_KEYWORDS: &[&str] = &["description", "desc", "name"];

/// Positions of the code and description columns in a catalog header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub code: usize,
    pub description: usize,
}

/// Pick the code and description columns by case-insensitive substring match.
///
/// When several headers match, the last one wins. If either column is not
/// found, falls back to column 0 for codes and column 1 for descriptions
/// (column 0 when there is only one column). Returns `None` for an empty header.
pub fn detect_columns<S: AsRef<str>>(headers: &[S]) -> Option<ColumnLayout> {
    if headers.is_empty() {
        return None;
    }

    let mut code = None;
    let mut description = None;

    for (idx, header) in headers.iter().enumerate() {
        let lower = header.as_ref().to_lowercase();
        if CODE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            code = Some(idx);
        }
        if DESCRIPTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            description = Some(idx);
        }
    }

    match (code, description) {
        (Some(code), Some(description)) => Some(ColumnLayout { code, description }),
        _ => Some(ColumnLayout {
            code: 0,
            description: if headers.len() > 1 { 1 } else { 0 },
        }),
    }
}
