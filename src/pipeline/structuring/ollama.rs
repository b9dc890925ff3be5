use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::StructuringError;

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a new OllamaClient pointing at a local Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> StructuringError {
        if e.is_connect() {
            StructuringError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            StructuringError::HttpClient(format!(
                "Request timed out after {}s",
                self.timeout_secs
            ))
        } else {
            StructuringError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerationOptions,
}

/// Sampling kept near-deterministic for extraction.
#[derive(Serialize)]
struct GenerationOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, StructuringError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: GenerationOptions::default(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Mock LLM client for testing. Returns a configurable response, or fails
/// like an unreachable server.
pub struct MockLlmClient {
    response: Option<String>,
    available_models: Vec<String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            available_models: vec!["medgemma:latest".to_string()],
        }
    }

    /// Every `generate` call fails with a connection error.
    pub fn unreachable() -> Self {
        Self {
            response: None,
            available_models: Vec::new(),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _system: &str,
    ) -> Result<String, StructuringError> {
        self.response
            .clone()
            .ok_or_else(|| StructuringError::OllamaConnection("mock://offline".to_string()))
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        Ok(self.available_models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 30).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn request_serializes_low_temperature_options() {
        let body = OllamaGenerateRequest {
            model: "medgemma",
            prompt: "p",
            system: "s",
            stream: false,
            options: GenerationOptions::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(json["options"]["top_k"], 40);
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let client = OllamaClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.generate("medgemma", "p", "s").unwrap_err();
        assert!(matches!(
            err,
            StructuringError::OllamaConnection(_) | StructuringError::HttpClient(_)
        ));
    }

    #[test]
    fn mock_returns_configured_response() {
        let client = MockLlmClient::new("{\"CPT\": []}");
        assert_eq!(client.generate("m", "p", "s").unwrap(), "{\"CPT\": []}");
        assert!(client.is_model_available("medgemma").unwrap());
    }

    #[test]
    fn unreachable_mock_fails() {
        let client = MockLlmClient::unreachable();
        assert!(client.generate("m", "p", "s").is_err());
        assert!(!client.is_model_available("medgemma").unwrap());
    }
}
