use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use medcoder_lib::app::{self, CatalogPaths, EmbedderKind, EmbedderSettings, RunOptions};
use medcoder_lib::config::{self, ExtractionConfig, LlmSettings};

/// Extract ICD-10, CPT and HCPCS codes from clinical report text.
#[derive(Parser, Debug)]
#[command(name = "medcoder", version, about)]
struct Cli {
    /// Plain-text report document.
    #[arg(short, long)]
    input: PathBuf,

    /// Output JSON file (stdout when omitted).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// ICD-10 catalog (CSV or TSV with code and description columns).
    #[arg(long, env = "MEDCODER_ICD_CATALOG")]
    icd_catalog: Option<PathBuf>,

    /// CPT catalog (CSV or TSV with code and description columns).
    #[arg(long, env = "MEDCODER_CPT_CATALOG")]
    cpt_catalog: Option<PathBuf>,

    /// SQLite file holding the persisted indices.
    #[arg(long, env = "MEDCODER_INDEX_DB")]
    index_db: Option<PathBuf>,

    /// Rebuild the indices from the catalogs even when current.
    #[arg(long)]
    rebuild_index: bool,

    /// Retrieval candidates per query before thresholding.
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Minimum cosine similarity of a retrieval match.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Reports processed per document.
    #[arg(long, default_value_t = 4)]
    max_reports: usize,

    /// Ask a local Ollama model for code suggestions.
    #[arg(long, env = "MEDCODER_USE_LLM")]
    use_llm: bool,

    /// Ollama endpoint; a bare `host:port` is taken as `http://host:port`.
    #[arg(long, env = "MEDCODER_OLLAMA_URL", default_value = config::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    #[arg(long, env = "MEDCODER_LLM_MODEL", default_value = config::DEFAULT_LLM_MODEL)]
    llm_model: String,

    #[arg(long, value_enum, default_value_t = EmbedderKind::Ollama)]
    embedder: EmbedderKind,

    /// Ollama embedding model.
    #[arg(long, env = "MEDCODER_EMBEDDING_MODEL", default_value = config::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Directory with `model.onnx` and `tokenizer.json` for `--embedder onnx`.
    #[arg(long)]
    onnx_model_dir: Option<PathBuf>,

    /// Emit per-report candidate details instead of the code lists.
    #[arg(long)]
    detailed: bool,
}

impl Cli {
    fn into_options(self) -> RunOptions {
        let ollama_url = config::normalize_base_url(&self.ollama_url);
        let mut opts = RunOptions::new(self.input);
        opts.output = self.output;
        opts.catalogs = CatalogPaths {
            icd: self.icd_catalog,
            cpt: self.cpt_catalog,
        };
        if let Some(index_db) = self.index_db {
            opts.index_db = index_db;
        }
        opts.rebuild_index = self.rebuild_index;
        opts.detailed = self.detailed;
        opts.extraction = ExtractionConfig {
            top_k: self.top_k,
            similarity_threshold: self.threshold,
            max_reports: self.max_reports,
            ..ExtractionConfig::default()
        };
        opts.embedder = EmbedderSettings {
            kind: self.embedder,
            base_url: ollama_url.clone(),
            model: self.embedding_model,
            onnx_model_dir: self
                .onnx_model_dir
                .unwrap_or_else(config::embedding_model_dir),
            ..EmbedderSettings::default()
        };
        opts.llm = LlmSettings {
            enabled: self.use_llm,
            base_url: ollama_url,
            model: self.llm_model,
            ..LlmSettings::default()
        };
        opts
    }
}

fn main() -> ExitCode {
    medcoder_lib::init_tracing();
    let opts = Cli::parse().into_options();

    tracing::info!("medcoder v{}", config::APP_VERSION);
    match app::run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Extraction failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
