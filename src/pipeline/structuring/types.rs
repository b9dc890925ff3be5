use serde::{Deserialize, Serialize};

use super::StructuringError;

/// Codes and descriptions proposed by the external model for one report.
///
/// Every list is trimmed and free of empty entries and duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCodeSuggestions {
    pub icd10: Vec<String>,
    pub cpt: Vec<String>,
    pub hcpcs: Vec<String>,
    pub clinical_terms: Vec<String>,
    pub anatomical_locations: Vec<String>,
    pub diagnosis: Vec<String>,
    pub procedures: Vec<String>,
}

/// Ollama LLM client abstraction (allows mocking)
pub trait LlmClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, StructuringError>;

    fn list_models(&self) -> Result<Vec<String>, StructuringError>;

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }
}
