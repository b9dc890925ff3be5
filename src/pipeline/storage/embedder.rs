use serde::{Deserialize, Serialize};

use super::types::EmbeddingModel;
use super::StorageError;

/// Standard embedding dimension for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vec.iter_mut() {
            *val /= norm;
        }
    }
}

/// Attention-masked mean over token embeddings laid out as `[seq_len, dim]`.
pub fn mean_pool(token_embeddings: &[f32], attention_mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut mask_sum = 0.0f32;

    for (token_idx, &mask) in attention_mask.iter().enumerate() {
        let weight = mask as f32;
        let offset = token_idx * dim;
        let Some(row) = token_embeddings.get(offset..offset + dim) else {
            break;
        };
        mask_sum += weight;
        for (p, v) in pooled.iter_mut().zip(row) {
            *p += v * weight;
        }
    }

    if mask_sum > 0.0 {
        for val in &mut pooled {
            *val /= mask_sum;
        }
    }
    pooled
}

// ═══════════════════════════════════════════════════════════
// Ollama embedder: `/api/embed` on a local Ollama instance
// ═══════════════════════════════════════════════════════════

/// Embeddings served by Ollama (e.g. `all-minilm`, the all-MiniLM-L6-v2 port).
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    dimension: usize,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, StorageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::ModelInit(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            dimension: EMBEDDING_DIM,
        })
    }

    /// Override the advertised dimension for models other than MiniLM.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                StorageError::EmbeddingConnection(self.base_url.clone())
            } else {
                StorageError::Embedding(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StorageError::Embedding(format!(
                "Ollama returned status {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .map_err(|e| StorageError::Embedding(format!("Malformed embed response: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(StorageError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

impl EmbeddingModel for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| StorageError::Embedding("Empty embed response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        format!("ollama:{}", self.model)
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX embedder, behind the `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{l2_normalize, mean_pool, EmbeddingModel, StorageError, EMBEDDING_DIM};
    use ort::session::Session;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// all-MiniLM-L6-v2 inference through ONNX Runtime.
    ///
    /// `model_dir` holds `model.onnx` and `tokenizer.json`. The session sits
    /// behind a Mutex because `Session::run` takes `&mut self`.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
        model_dir: PathBuf,
    }

    struct EncodedInput {
        ids: Vec<i64>,
        mask: Vec<i64>,
        type_ids: Vec<i64>,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, StorageError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            for required in [&model_path, &tokenizer_path] {
                if !required.exists() {
                    return Err(StorageError::ModelNotFound(required.to_path_buf()));
                }
            }

            let init = |e: ort::Error| StorageError::ModelInit(e.to_string());
            let session = Session::builder()
                .map_err(init)?
                .with_intra_threads(2)
                .map_err(init)?
                .commit_from_file(&model_path)
                .map_err(|e| StorageError::ModelInit(format!("ONNX load failed: {e}")))?;

            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| StorageError::ModelInit(format!("Tokenizer load failed: {e}")))?;

            tracing::info!(path = %model_dir.display(), "ONNX embedder loaded");

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                model_dir: model_dir.to_path_buf(),
            })
        }

        fn encode(&self, text: &str) -> Result<EncodedInput, StorageError> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| StorageError::Tokenization(e.to_string()))?;
            let widen = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<_>>();

            Ok(EncodedInput {
                ids: widen(encoding.get_ids()),
                mask: widen(encoding.get_attention_mask()),
                type_ids: widen(encoding.get_type_ids()),
            })
        }

        fn infer(&self, text: &str) -> Result<Vec<f32>, StorageError> {
            use ort::value::TensorRef;

            let input = self.encode(text)?;
            let seq_len = input.ids.len();
            let shape_err = |e: ndarray::ShapeError| StorageError::Embedding(e.to_string());
            let tensor_err = |e: ort::Error| StorageError::Embedding(e.to_string());

            let ids = ndarray::Array2::from_shape_vec((1, seq_len), input.ids).map_err(shape_err)?;
            let mask = ndarray::Array2::from_shape_vec((1, seq_len), input.mask.clone())
                .map_err(shape_err)?;
            let types =
                ndarray::Array2::from_shape_vec((1, seq_len), input.type_ids).map_err(shape_err)?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| StorageError::Embedding("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![
                    TensorRef::from_array_view(&ids).map_err(tensor_err)?,
                    TensorRef::from_array_view(&mask).map_err(tensor_err)?,
                    TensorRef::from_array_view(&types).map_err(tensor_err)?
                ])
                .map_err(|e| StorageError::Embedding(format!("ONNX inference failed: {e}")))?;

            let (shape, hidden) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| StorageError::Embedding(format!("Output extraction: {e}")))?;

            if shape.len() != 3 || shape[2] as usize != EMBEDDING_DIM {
                return Err(StorageError::Embedding(format!(
                    "Unexpected output shape: {shape:?}, expected [1, {seq_len}, {EMBEDDING_DIM}]"
                )));
            }

            let mut pooled = mean_pool(hidden, &input.mask, EMBEDDING_DIM);
            l2_normalize(&mut pooled);
            Ok(pooled)
        }
    }

    impl EmbeddingModel for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
            self.infer(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            texts.iter().map(|t| self.infer(t)).collect()
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }

        fn model_id(&self) -> String {
            format!("onnx:{}", self.model_dir.display())
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxEmbedder;

// ═══════════════════════════════════════════════════════════
// Mock embedder
// ═══════════════════════════════════════════════════════════

/// Mock embedding model for testing: a hashed bag of tokens.
///
/// Texts sharing tokens get a positive cosine similarity, so ranking tests
/// behave like a (very) small real model. A text with no tokens embeds to
/// the zero vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        Ok(token_hash_vector(text, self.dimension))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        Ok(texts
            .iter()
            .map(|t| token_hash_vector(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        "mock".to_string()
    }
}

/// Tokens are whitespace-separated words, lowercased, with surrounding
/// punctuation removed (inner dots kept, so `K57.90` stays one token).
fn token_hash_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    if dim == 0 {
        return vec;
    }

    for raw in text.split_whitespace() {
        let token = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        vec[(fnv1a(token.as_bytes()) % dim as u64) as usize] += 1.0;
    }

    l2_normalize(&mut vec);
    vec
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
