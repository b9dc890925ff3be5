use std::path::PathBuf;

use serde::Serialize;

/// Application-level constants
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment override for the data directory.
pub const HOME_ENV: &str = "MEDCODER_HOME";

/// Default Ollama endpoint for both embeddings and generation.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Endpoint base URL with a scheme, defaulting to `http://` for a bare
/// `host:port`. Trailing slashes are dropped.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Default generative model for code suggestions.
pub const DEFAULT_LLM_MODEL: &str = "medgemma";

/// Default sentence-embedding model (all-MiniLM-L6-v2, served by Ollama as `all-minilm`).
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Get the application data directory.
/// `$MEDCODER_HOME` when set, otherwise `~/.medcoder`, otherwise `./.medcoder`.
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medcoder")
}

/// Directory holding the persisted code indices.
pub fn vector_db_dir() -> PathBuf {
    app_data_dir().join("vector_db")
}

/// SQLite file holding one persisted index per code system.
pub fn index_db_path() -> PathBuf {
    vector_db_dir().join("code_index.db")
}

/// Get the embedding model directory (all-MiniLM-L6-v2 ONNX export)
pub fn embedding_model_dir() -> PathBuf {
    app_data_dir().join("models").join("all-MiniLM-L6-v2")
}

/// Debug builds log at debug level for this crate.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "medcoder=debug,medcoder_lib=debug"
    } else {
        "medcoder=info,medcoder_lib=info"
    }
}

/// Tunables of the extraction pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionConfig {
    /// Retrieval candidates fetched per query before thresholding.
    pub top_k: usize,
    /// Minimum cosine similarity for a retrieval match.
    pub similarity_threshold: f32,
    /// Threshold for the description lookup of explicit codes.
    pub explicit_lookup_threshold: f32,
    /// Cap of a reconciled code set.
    pub max_codes: usize,
    /// Report text budget sent to the external model.
    pub max_prompt_chars: usize,
    /// Reports processed per input document.
    pub max_reports: usize,
    /// Segments shorter than this are not treated as reports.
    pub min_report_chars: usize,
    /// Catalog rows embedded per model call.
    pub embed_batch_size: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.5,
            explicit_lookup_threshold: 0.1,
            max_codes: 10,
            max_prompt_chars: 30_000,
            max_reports: 4,
            min_report_chars: 200,
            embed_batch_size: 64,
        }
    }
}

/// External generative model settings.
#[derive(Debug, Clone, Serialize)]
pub struct LlmSettings {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout_secs: 300,
        }
    }
}
