//! Application shell: index build-or-load, model wiring and the document run.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{self, ExtractionConfig, LlmSettings};
use crate::models::CodeSystem;
use crate::pipeline::batch::{
    process_batch, select_reports, serialize_reports, DocumentReadError, DocumentReader,
    PlainTextReader,
};
use crate::pipeline::catalog::{catalog_fingerprint, load_catalog};
use crate::pipeline::diagnostic::DiagnosticRun;
use crate::pipeline::processor::{ExternalModel, ReportExtractor};
use crate::pipeline::storage::{
    index_fingerprint, CodeIndex, CodeIndexSet, EmbeddingModel, IndexStore, OllamaEmbedder,
    SqliteIndexStore, StorageError,
};
use crate::pipeline::structuring::{LlmClient, OllamaClient};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    DocumentRead(#[from] DocumentReadError),

    #[error("Cannot write output to {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding model unavailable: {0}")]
    Embedder(#[from] StorageError),
}

/// Which embedding backend builds and queries the indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EmbedderKind {
    #[default]
    Ollama,
    Onnx,
}

#[derive(Debug, Clone)]
pub struct EmbedderSettings {
    pub kind: EmbedderKind,
    pub base_url: String,
    pub model: String,
    pub onnx_model_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Ollama,
            base_url: config::DEFAULT_OLLAMA_URL.to_string(),
            model: config::DEFAULT_EMBEDDING_MODEL.to_string(),
            onnx_model_dir: config::embedding_model_dir(),
            timeout_secs: 60,
        }
    }
}

/// Catalog files per code system. A missing path keeps whatever index is persisted.
#[derive(Debug, Clone, Default)]
pub struct CatalogPaths {
    pub icd: Option<PathBuf>,
    pub cpt: Option<PathBuf>,
}

impl CatalogPaths {
    pub fn get(&self, system: CodeSystem) -> Option<&Path> {
        match system {
            CodeSystem::Icd => self.icd.as_deref(),
            CodeSystem::Cpt => self.cpt.as_deref(),
        }
    }
}

/// Everything one invocation needs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    /// `None` writes to stdout.
    pub output: Option<PathBuf>,
    pub catalogs: CatalogPaths,
    pub index_db: PathBuf,
    pub rebuild_index: bool,
    pub detailed: bool,
    pub extraction: ExtractionConfig,
    pub embedder: EmbedderSettings,
    pub llm: LlmSettings,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            catalogs: CatalogPaths::default(),
            index_db: config::index_db_path(),
            rebuild_index: false,
            detailed: false,
            extraction: ExtractionConfig::default(),
            embedder: EmbedderSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

/// Read the input, extract every report, write the JSON result.
pub fn run(opts: &RunOptions) -> Result<(), AppError> {
    let _span = tracing::info_span!("run", input = %opts.input.display()).entered();

    let text = PlainTextReader.read_text(&opts.input)?;
    tracing::info!(chars = text.chars().count(), "Input document read");

    let embedder = create_embedder(&opts.embedder)?;
    let store = SqliteIndexStore::new(&opts.index_db);
    let indices = load_or_build_indices(
        &store,
        &opts.catalogs,
        embedder.as_ref(),
        opts.rebuild_index,
        opts.extraction.embed_batch_size,
    )?;

    let client = connect_llm(&opts.llm);
    let model = client
        .as_ref()
        .map(|client| ExternalModel::new(client, &opts.llm.model));

    let json = extract_document(
        &text,
        &indices,
        embedder.as_ref(),
        model,
        &opts.extraction,
        opts.detailed,
    )?;

    write_output(opts.output.as_deref(), &json)
}

/// Split `text` into reports, extract each, serialize the results.
pub fn extract_document(
    text: &str,
    indices: &CodeIndexSet,
    embedder: &dyn EmbeddingModel,
    model: Option<ExternalModel<'_>>,
    config: &ExtractionConfig,
    detailed: bool,
) -> Result<String, AppError> {
    let mut extractor = ReportExtractor::new(indices, embedder, config.clone())
        .with_diagnostics(DiagnosticRun::from_env());
    if let Some(model) = model {
        extractor = extractor.with_external_model(model);
    }

    let reports = select_reports(text, config);
    tracing::info!(reports = reports.len(), detailed, "Processing reports");

    let json = if detailed {
        let results = process_batch(&reports, |report, id| {
            Ok::<_, Infallible>(extractor.extract_detailed(report, id))
        });
        serialize_reports(&results)?
    } else {
        let results = process_batch(&reports, |report, id| {
            Ok::<_, Infallible>(extractor.extract_report(report, id))
        });
        serialize_reports(&results)?
    };
    Ok(json)
}

/// Persisted index per system, rebuilt from its catalog when missing, stale
/// or `rebuild` is set. Catalog and build failures degrade to the persisted
/// index, else an empty one.
pub fn load_or_build_indices(
    store: &dyn IndexStore,
    catalogs: &CatalogPaths,
    embedder: &dyn EmbeddingModel,
    rebuild: bool,
    batch_size: usize,
) -> Result<CodeIndexSet, StorageError> {
    let build = |system| {
        load_or_build(store, system, catalogs.get(system), embedder, rebuild, batch_size)
    };
    let icd = build(CodeSystem::Icd)?;
    let cpt = build(CodeSystem::Cpt)?;
    Ok(CodeIndexSet::new(icd, cpt))
}

fn load_or_build(
    store: &dyn IndexStore,
    system: CodeSystem,
    catalog: Option<&Path>,
    embedder: &dyn EmbeddingModel,
    rebuild: bool,
    batch_size: usize,
) -> Result<CodeIndex, StorageError> {
    let _span = tracing::info_span!("code_index", system = system.as_str()).entered();

    let stored = match store.load(system) {
        Ok(stored) => stored,
        Err(e @ StorageError::CorruptIndex { .. }) => {
            tracing::warn!(error = %e, "Persisted index unusable, ignoring it");
            None
        }
        Err(e) => return Err(e),
    };
    let fallback = |stored: Option<CodeIndex>| {
        stored.unwrap_or_else(|| {
            tracing::warn!("No index available, searches return nothing");
            CodeIndex::empty(system)
        })
    };

    let Some(path) = catalog else {
        if let Some(index) = stored.as_ref().filter(|i| i.dimension() != embedder.dimension()) {
            tracing::warn!(
                index_dimension = index.dimension(),
                model_dimension = embedder.dimension(),
                "Persisted index was built by another embedding model and no catalog is \
                 configured to rebuild it, searches will not match"
            );
        }
        return Ok(fallback(stored));
    };

    let entries = match load_catalog(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "Catalog unavailable, keeping persisted index");
            return Ok(fallback(stored));
        }
    };

    let fingerprint = index_fingerprint(&catalog_fingerprint(&entries), embedder);
    match stored {
        Some(index)
            if !rebuild
                && index.is_current(&fingerprint)
                && index.dimension() == embedder.dimension() =>
        {
            tracing::info!(rows = index.len(), "Persisted index is current");
            return Ok(index);
        }
        _ => {}
    }

    tracing::info!(
        rows = entries.len(),
        forced = rebuild,
        "Building index from catalog"
    );
    let index = match CodeIndex::build(system, &entries, embedder, batch_size) {
        Ok(index) => index.with_fingerprint(fingerprint),
        Err(e) => {
            tracing::warn!(error = %e, "Index build failed, keeping persisted index");
            return Ok(fallback(stored));
        }
    };

    if let Err(e) = store.save(&index) {
        tracing::warn!(error = %e, "Failed to persist index, using it for this run only");
    }
    Ok(index)
}

fn create_embedder(settings: &EmbedderSettings) -> Result<Box<dyn EmbeddingModel>, StorageError> {
    match settings.kind {
        EmbedderKind::Ollama => {
            tracing::info!(
                base_url = %settings.base_url,
                model = %settings.model,
                "Using Ollama embeddings"
            );
            let embedder =
                OllamaEmbedder::new(&settings.base_url, &settings.model, settings.timeout_secs)?;
            Ok(Box::new(embedder))
        }
        #[cfg(feature = "onnx-embeddings")]
        EmbedderKind::Onnx => {
            let embedder =
                crate::pipeline::storage::OnnxEmbedder::load(&settings.onnx_model_dir)?;
            Ok(Box::new(embedder))
        }
        #[cfg(not(feature = "onnx-embeddings"))]
        EmbedderKind::Onnx => Err(StorageError::ModelInit(
            "built without the onnx-embeddings feature".to_string(),
        )),
    }
}

/// Ollama client when the external model is enabled and serving `settings.model`.
fn connect_llm(settings: &LlmSettings) -> Option<OllamaClient> {
    if !settings.enabled {
        return None;
    }

    let client = match OllamaClient::new(&settings.base_url, settings.timeout_secs) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "External model disabled");
            return None;
        }
    };

    match client.is_model_available(&settings.model) {
        Ok(true) => {
            tracing::info!(model = %settings.model, "External model enabled");
            Some(client)
        }
        Ok(false) => {
            tracing::warn!(
                model = %settings.model,
                "Model not pulled in Ollama, external model disabled"
            );
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "External model disabled");
            None
        }
    }
}

fn write_output(path: Option<&Path>, json: &str) -> Result<(), AppError> {
    let Some(path) = path else {
        println!("{json}");
        return Ok(());
    };

    let output_error = |source| AppError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(output_error)?;
    }
    std::fs::write(path, json).map_err(output_error)?;
    tracing::info!(path = %path.display(), "Results written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::retrieval::CodeSearcher;
    use crate::pipeline::storage::{InMemoryIndexStore, MockEmbedder};
    use crate::pipeline::structuring::MockLlmClient;

    struct FailingEmbedder;

    impl EmbeddingModel for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, StorageError> {
            Err(StorageError::EmbeddingConnection("mock://offline".to_string()))
        }

        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            Err(StorageError::EmbeddingConnection("mock://offline".to_string()))
        }

        fn dimension(&self) -> usize {
            384
        }

        fn model_id(&self) -> String {
            "mock".to_string()
        }
    }

    const ICD_CSV: &str = "Code,Description\nK57.90,Diverticulosis of intestine\nK64.8,Other hemorrhoids\n";

    fn write_catalog(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn icd_only(path: PathBuf) -> CatalogPaths {
        CatalogPaths {
            icd: Some(path),
            cpt: None,
        }
    }

    #[test]
    fn builds_and_persists_missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let catalogs = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        let store = InMemoryIndexStore::new();

        let indices =
            load_or_build_indices(&store, &catalogs, &MockEmbedder::new(), false, 64).unwrap();

        assert_eq!(indices.icd.codes(), ["K57.90", "K64.8"]);
        assert!(indices.cpt.is_empty());
        assert_eq!(store.load(CodeSystem::Icd).unwrap(), Some(indices.icd.clone()));
        assert!(store.load(CodeSystem::Cpt).unwrap().is_none());
    }

    #[test]
    fn current_index_is_reused_without_embedding() {
        let tmp = tempfile::tempdir().unwrap();
        let catalogs = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        let store = InMemoryIndexStore::new();
        let built =
            load_or_build_indices(&store, &catalogs, &MockEmbedder::new(), false, 64).unwrap();

        let reloaded =
            load_or_build_indices(&store, &catalogs, &FailingEmbedder, false, 64).unwrap();
        assert_eq!(reloaded.icd, built.icd);
    }

    #[test]
    fn stale_index_is_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = InMemoryIndexStore::new();
        let embedder = MockEmbedder::new();
        let first = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        load_or_build_indices(&store, &first, &embedder, false, 64).unwrap();

        let changed = icd_only(write_catalog(
            tmp.path(),
            "icd.csv",
            "Code,Description\nZ86.0100,Personal history of colon polyps\n",
        ));
        let indices = load_or_build_indices(&store, &changed, &embedder, false, 64).unwrap();

        assert_eq!(indices.icd.codes(), ["Z86.0100"]);
        assert_eq!(store.load(CodeSystem::Icd).unwrap().unwrap().codes(), ["Z86.0100"]);
    }

    #[test]
    fn forced_rebuild_embeds_again() {
        let tmp = tempfile::tempdir().unwrap();
        let catalogs = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        let store = InMemoryIndexStore::new();
        let built =
            load_or_build_indices(&store, &catalogs, &MockEmbedder::new(), false, 64).unwrap();

        // the build fails, so the persisted index survives
        let indices = load_or_build_indices(&store, &catalogs, &FailingEmbedder, true, 64).unwrap();
        assert_eq!(indices.icd, built.icd);

        let rebuilt = load_or_build_indices(
            &store,
            &catalogs,
            &MockEmbedder::with_dimension(16),
            true,
            64,
        )
        .unwrap();
        assert_eq!(rebuilt.icd.dimension(), 16);
    }

    #[test]
    fn embedder_change_rebuilds_index() {
        let tmp = tempfile::tempdir().unwrap();
        let catalogs = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        let store = InMemoryIndexStore::new();
        let small = MockEmbedder::with_dimension(16);
        load_or_build_indices(&store, &catalogs, &small, false, 64).unwrap();

        let embedder = MockEmbedder::new();
        let indices = load_or_build_indices(&store, &catalogs, &embedder, false, 64).unwrap();
        assert_eq!(indices.icd.dimension(), 384);
        assert_eq!(store.load(CodeSystem::Icd).unwrap().unwrap().dimension(), 384);

        let searcher = CodeSearcher::new(&indices, &embedder);
        let hits = searcher
            .search(CodeSystem::Icd, "K64.8 Other hemorrhoids", 1, 0.5)
            .unwrap();
        assert_eq!(hits[0].code, "K64.8");
    }

    #[test]
    fn embedder_offline_still_emits_explicit_codes() {
        let tmp = tempfile::tempdir().unwrap();
        let catalogs = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        let indices = load_or_build_indices(
            &InMemoryIndexStore::new(),
            &catalogs,
            &MockEmbedder::new(),
            false,
            64,
        )
        .unwrap();
        assert!(!indices.icd.is_empty());

        let json = extract_document(
            "Diagnosis: K64.8, K57.90\nProcedure Code: 45378",
            &indices,
            &FailingEmbedder,
            None,
            &ExtractionConfig::default(),
            false,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ICD-10"], serde_json::json!(["K64.8", "K57.90"]));
        assert_eq!(value["CPT"], serde_json::json!(["45378"]));
    }

    #[test]
    fn missing_catalog_keeps_persisted_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = InMemoryIndexStore::new();
        let catalogs = icd_only(write_catalog(tmp.path(), "icd.csv", ICD_CSV));
        let built =
            load_or_build_indices(&store, &catalogs, &MockEmbedder::new(), false, 64).unwrap();

        let gone = icd_only(tmp.path().join("deleted.csv"));
        let indices =
            load_or_build_indices(&store, &gone, &MockEmbedder::new(), false, 64).unwrap();
        assert_eq!(indices.icd, built.icd);
    }

    #[test]
    fn nothing_available_degrades_to_empty_indices() {
        let tmp = tempfile::tempdir().unwrap();
        let store = InMemoryIndexStore::new();
        let catalogs = CatalogPaths {
            icd: Some(tmp.path().join("missing.csv")),
            cpt: Some(write_catalog(tmp.path(), "cpt.csv", "Code,Description\n45378,Colonoscopy\n")),
        };

        let indices =
            load_or_build_indices(&store, &catalogs, &FailingEmbedder, false, 64).unwrap();
        assert!(indices.icd.is_empty());
        assert!(indices.cpt.is_empty());
    }

    #[test]
    fn extracts_single_report_as_object() {
        let indices = CodeIndexSet::empty();
        let text = "Diagnosis: K64.8, K57.90\nProcedure Code: 45378";

        let json = extract_document(
            text,
            &indices,
            &MockEmbedder::new(),
            None,
            &ExtractionConfig::default(),
            false,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ICD-10"], serde_json::json!(["K64.8", "K57.90"]));
        assert_eq!(value["CPT"], serde_json::json!(["45378"]));
    }

    #[test]
    fn extracts_several_reports_as_array() {
        let indices = CodeIndexSet::empty();
        let filler = "Colonoscopy performed to the cecum with good preparation. ".repeat(5);
        let text = format!(
            "{filler}\nDiagnosis: K64.8\n\n\n{filler}\nProcedure Code: 45380"
        );

        let json = extract_document(
            &text,
            &indices,
            &MockEmbedder::new(),
            None,
            &ExtractionConfig::default(),
            false,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let reports = value.as_array().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0]["ICD-10"], serde_json::json!(["K64.8"]));
        assert_eq!(reports[1]["CPT"], serde_json::json!(["45380"]));
    }

    #[test]
    fn detailed_output_carries_report_ids() {
        let indices = CodeIndexSet::empty();
        let json = extract_document(
            "Patient ID: 12345\nDiagnosis: K64.8",
            &indices,
            &MockEmbedder::new(),
            None,
            &ExtractionConfig::default(),
            true,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report_id"], "report_1");
        assert_eq!(value["hcpcs_codes"], serde_json::json!([]));
    }

    #[test]
    fn external_model_output_is_used() {
        let indices = CodeIndexSet::empty();
        let client = MockLlmClient::new(r#"{"ICD-10": ["Z86.0100"], "CPT": ["45380"]}"#);

        let json = extract_document(
            "Diagnosis: K64.8\nProcedure Code: 45378",
            &indices,
            &MockEmbedder::new(),
            Some(ExternalModel::new(&client, "medgemma")),
            &ExtractionConfig::default(),
            false,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ICD-10"], serde_json::json!(["Z86.0100"]));
        assert_eq!(value["CPT"], serde_json::json!(["45380"]));
    }

    #[test]
    fn run_writes_output_file() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("report.txt");
        std::fs::write(&input, "Diagnosis: K64.8, K57.90\nProcedure Code: 45378").unwrap();

        let mut opts = RunOptions::new(&input);
        opts.output = Some(tmp.path().join("out").join("codes.json"));
        opts.index_db = tmp.path().join("code_index.db");

        run(&opts).unwrap();

        let written = std::fs::read_to_string(tmp.path().join("out").join("codes.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["ICD-10"], serde_json::json!(["K64.8", "K57.90"]));
        assert_eq!(value["CPT"], serde_json::json!(["45378"]));
    }

    #[test]
    fn run_fails_on_missing_input() {
        let tmp = tempfile::tempdir().unwrap();
        let mut opts = RunOptions::new(tmp.path().join("missing.txt"));
        opts.index_db = tmp.path().join("code_index.db");

        let err = run(&opts).unwrap_err();
        assert!(matches!(
            err,
            AppError::DocumentRead(DocumentReadError::NotFound(_))
        ));
    }

    #[test]
    fn onnx_without_feature_is_an_error() {
        let settings = EmbedderSettings {
            kind: EmbedderKind::Onnx,
            onnx_model_dir: PathBuf::from("/nonexistent/model"),
            ..EmbedderSettings::default()
        };
        assert!(create_embedder(&settings).is_err());
    }

    #[test]
    fn disabled_llm_is_not_contacted() {
        assert!(connect_llm(&LlmSettings::default()).is_none());
    }
}
