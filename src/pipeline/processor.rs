//! Per-report extraction.
//!
//! Deterministic path: explicit codes and retrieval matches reconciled per
//! code system, plus pattern-based mentions. With an external model
//! configured, its suggestions are adopted as a whole or, on any failure,
//! discarded in favour of the deterministic path. A failing embedding
//! model only costs the catalog evidence: explicit codes still come out.

use std::path::Path;

use crate::config::ExtractionConfig;
use crate::models::{CodeSystem, DetailedReport, ReconciledCodeSet, ReportCodes};
use crate::pipeline::diagnostic::{self, DiagnosticRun};
use crate::pipeline::extraction::{
    anatomical_locations, clinical_terms, diagnosis_descriptions, explicit_matches,
    extract_patient_info, extract_sections, find_hcpcs_codes, lookup_description,
    procedure_descriptions, retrieval_matches, ReportSections,
};
use crate::pipeline::reconcile::reconcile;
use crate::pipeline::retrieval::{CodeSearcher, RetrievalError};
use crate::pipeline::storage::{CodeIndexSet, EmbeddingModel};
use crate::pipeline::structuring::{
    build_coding_prompt, parse_code_suggestions, LlmClient, ModelCodeSuggestions,
    StructuringError, CODING_SYSTEM_PROMPT,
};

/// Failure of the external-model path, answered by the deterministic fallback.
#[derive(Debug, thiserror::Error)]
pub enum ReportExtractionError {
    #[error("Code retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("External model failed: {0}")]
    Structuring(#[from] StructuringError),
}

/// External generative model used as an extra evidence source.
pub struct ExternalModel<'a> {
    client: &'a dyn LlmClient,
    model: String,
}

impl<'a> ExternalModel<'a> {
    pub fn new(client: &'a dyn LlmClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

/// Extracts [`ReportCodes`] from report text against a fixed set of indices.
pub struct ReportExtractor<'a> {
    searcher: CodeSearcher<'a>,
    config: ExtractionConfig,
    model: Option<ExternalModel<'a>>,
    diagnostics: Option<DiagnosticRun>,
}

impl<'a> ReportExtractor<'a> {
    pub fn new(
        indices: &'a CodeIndexSet,
        embedder: &'a dyn EmbeddingModel,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            searcher: CodeSearcher::new(indices, embedder),
            config,
            model: None,
            diagnostics: None,
        }
    }

    pub fn with_external_model(mut self, model: ExternalModel<'a>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_diagnostics(mut self, run: Option<DiagnosticRun>) -> Self {
        self.diagnostics = run;
        self
    }

    /// Final output for one report. External-model failures fall back to
    /// the deterministic path; search failures leave the explicit codes.
    pub fn extract_report(&self, text: &str, report_id: &str) -> ReportCodes {
        let _span = tracing::info_span!("extract_report", report_id).entered();
        let dump_dir = self
            .diagnostics
            .as_ref()
            .and_then(|run| run.report_dir(report_id));

        let codes = match &self.model {
            Some(model) => match self.extract_with_model(model, text, dump_dir.as_deref()) {
                Ok(codes) => codes,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "External model extraction failed, using deterministic path"
                    );
                    self.extract_deterministic(text)
                }
            },
            None => self.extract_deterministic(text),
        };

        tracing::info!(
            icd = codes.icd10.len(),
            cpt = codes.cpt.len(),
            hcpcs = codes.hcpcs.len(),
            "Report extracted"
        );

        if let Some(dir) = &dump_dir {
            diagnostic::dump_json(dir, "04-final-result.json", &codes);
        }

        codes
    }

    /// Regex, section and retrieval evidence only.
    pub fn extract_deterministic(&self, text: &str) -> ReportCodes {
        let sections = extract_sections(text);
        let icd = self.code_set(CodeSystem::Icd, text, &sections);
        let cpt = self.code_set(CodeSystem::Cpt, text, &sections);

        ReportCodes {
            clinical_terms: clinical_terms(text),
            anatomical_locations: anatomical_locations(text),
            diagnosis: diagnosis_descriptions(text, icd.descriptions()),
            procedures: procedure_descriptions(text),
            icd10: icd.codes(),
            cpt: cpt.codes(),
            hcpcs: find_hcpcs_codes(text),
        }
    }

    /// Richer record with candidate details, patient header and sections.
    pub fn extract_detailed(&self, text: &str, report_id: &str) -> DetailedReport {
        let _span = tracing::info_span!("extract_detailed", report_id).entered();
        let sections = extract_sections(text);

        DetailedReport {
            report_id: report_id.to_string(),
            patient_info: extract_patient_info(text),
            icd_codes: self.code_set(CodeSystem::Icd, text, &sections),
            cpt_codes: self.code_set(CodeSystem::Cpt, text, &sections),
            hcpcs_codes: find_hcpcs_codes(text),
            sections: sections.to_map(),
            raw_text_length: text.chars().count(),
        }
    }

    /// Explicit and retrieval evidence for `system`, reconciled.
    pub fn code_set(
        &self,
        system: CodeSystem,
        text: &str,
        sections: &ReportSections,
    ) -> ReconciledCodeSet {
        let explicit = explicit_matches(system, text, &self.searcher, &self.config);
        let retrieval = retrieval_matches(system, text, sections, &self.searcher, &self.config);
        reconcile(explicit, retrieval, self.config.max_codes)
    }

    fn extract_with_model(
        &self,
        model: &ExternalModel<'_>,
        text: &str,
        dump_dir: Option<&Path>,
    ) -> Result<ReportCodes, ReportExtractionError> {
        let prompt = build_coding_prompt(text, self.config.max_prompt_chars);
        if let Some(dir) = dump_dir {
            diagnostic::dump_text(dir, "01-model-prompt.txt", &prompt);
        }

        let response = model
            .client
            .generate(&model.model, &prompt, CODING_SYSTEM_PROMPT)?;
        if let Some(dir) = dump_dir {
            diagnostic::dump_text(dir, "02-model-response.txt", &response);
        }

        let suggestions = parse_code_suggestions(&response)?;
        if let Some(dir) = dump_dir {
            diagnostic::dump_json(dir, "03-model-suggestions.json", &suggestions);
        }

        tracing::info!(
            model = %model.model,
            icd = suggestions.icd10.len(),
            cpt = suggestions.cpt.len(),
            "External model suggestions received"
        );

        self.adopt_suggestions(suggestions, text)
    }

    /// Take the model's lists as the output, filling an empty diagnosis list
    /// from the catalog and an empty CPT list from the deterministic path.
    fn adopt_suggestions(
        &self,
        suggestions: ModelCodeSuggestions,
        text: &str,
    ) -> Result<ReportCodes, ReportExtractionError> {
        let ModelCodeSuggestions {
            icd10,
            mut cpt,
            hcpcs,
            clinical_terms,
            anatomical_locations,
            mut diagnosis,
            procedures,
        } = suggestions;

        if diagnosis.is_empty() {
            for code in &icd10 {
                if let Some(description) = lookup_description(
                    &self.searcher,
                    CodeSystem::Icd,
                    code,
                    self.config.explicit_lookup_threshold,
                )? {
                    diagnosis.push(description);
                }
            }
            if diagnosis.is_empty() {
                diagnosis = diagnosis_descriptions(text, std::iter::empty());
            }
        }

        if cpt.is_empty() {
            tracing::info!("External model found no CPT codes, supplementing from patterns");
            let sections = extract_sections(text);
            for code in self.code_set(CodeSystem::Cpt, text, &sections).codes() {
                if !cpt.contains(&code) {
                    cpt.push(code);
                }
            }
        }

        Ok(ReportCodes {
            clinical_terms,
            anatomical_locations,
            diagnosis,
            procedures,
            icd10,
            cpt,
            hcpcs,
        })
    }
}
