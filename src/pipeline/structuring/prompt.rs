pub const CODING_SYSTEM_PROMPT: &str = r#"
You are a medical coding assistant. You read one clinical report and list the
billing codes and clinical facts it supports.

RULES:
1. Report codes written in the document, plus the most likely CPT code for a
   procedure that is clearly described but not coded.
2. Use the exact code formats: ICD-10 (letter, two digits, optional decimal
   part), CPT (five digits), HCPCS (letter and four digits).
3. Every field is a JSON array of strings. Use [] when nothing applies.
4. Output the JSON object only. No prose, no Markdown.
"#;

/// JSON shape the model must return.
const RESPONSE_SCHEMA: &str = r#"{
  "ICD-10": ["K64.8"],
  "CPT": ["45378"],
  "HCPCS": ["J3490"],
  "Clinical_Terms": ["internal hemorrhoids"],
  "Anatomical_Locations": ["sigmoid colon"],
  "Diagnosis": ["Internal hemorrhoids"],
  "Procedures": ["Colonoscopy"]
}"#;

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build the coding prompt for one report.
pub fn build_coding_prompt(report_text: &str, max_chars: usize) -> String {
    let excerpt = truncate_chars(report_text, max_chars);

    format!(
        r#"Extract the medical codes and structured facts from the clinical report below.

Fields:
- "ICD-10": every ICD-10 diagnosis code (e.g. Z86.0100, K57.90, I10)
- "CPT": every CPT procedure code. Check procedure, billing and "Procedure Code" lines;
  for a described colonoscopy consider 45378, 45380, 45385.
- "HCPCS": HCPCS Level II codes (e.g. J3490, A4216, G0121)
- "Clinical_Terms": key conditions and findings
- "Anatomical_Locations": body structures examined or affected
- "Diagnosis": full diagnosis descriptions
- "Procedures": procedure descriptions

Return exactly this structure:
{RESPONSE_SCHEMA}

<report>
{excerpt}
</report>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_report_and_schema() {
        let prompt = build_coding_prompt("Diagnosis: K64.8", 30_000);
        assert!(prompt.contains("Diagnosis: K64.8"));
        assert!(prompt.contains("\"Anatomical_Locations\""));
        assert!(prompt.contains("<report>"));
    }

    #[test]
    fn long_reports_are_cut_without_summary() {
        let text = "a".repeat(40_000);
        let prompt = build_coding_prompt(&text, 30_000);
        assert!(prompt.contains(&"a".repeat(30_000)));
        assert!(!prompt.contains(&"a".repeat(30_001)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn system_prompt_demands_json_only() {
        assert!(CODING_SYSTEM_PROMPT.contains("JSON object only"));
    }
}
