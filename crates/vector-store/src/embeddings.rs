use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use ndarray::{Array, Axis, Ix2, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";

const MODE_ENV: &str = "ASHGUARD_EMBEDDING_MODE";
const MODEL_DIR_ENV: &str = "ASHGUARD_MODEL_DIR";

/// Opaque `embed(text) -> vector` capability shared by indexing and querying.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier persisted alongside the index
    fn model_id(&self) -> &str;

    /// Fixed vector length for every call
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    #[default]
    Onnx,
    Stub,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::Embedding(format!(
                "Unsupported embedding mode '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,
    pub model_id: String,
    pub model_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::default(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Clone, Debug)]
struct ModelSpec {
    onnx_file: &'static str,
    tokenizer_file: &'static str,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

fn model_spec(model_id: &str) -> Result<ModelSpec> {
    match model_id {
        DEFAULT_MODEL_ID | "sentence-transformers/all-MiniLM-L6-v2" => Ok(ModelSpec {
            onnx_file: "model.onnx",
            tokenizer_file: "tokenizer.json",
            dimension: 384,
            max_length: 256,
            max_batch: 32,
        }),
        other => Err(VectorStoreError::Embedding(format!(
            "Unknown embedding model '{other}' (supported: {DEFAULT_MODEL_ID})"
        ))),
    }
}

/// Production embedder: ONNX MiniLM or the deterministic stub
pub struct EmbeddingModel {
    model_id: String,
    dimension: usize,
    backend: EmbeddingBackend,
}

enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Stub,
}

impl EmbeddingModel {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let spec = model_spec(&config.model_id)?;
        let backend = match config.mode {
            EmbeddingMode::Stub => {
                log::info!("Using stub embeddings (dim {})", spec.dimension);
                EmbeddingBackend::Stub
            }
            EmbeddingMode::Onnx => {
                let dir = config.model_dir.join(&config.model_id);
                EmbeddingBackend::Ort(Arc::new(OrtBackend::new(&spec, &dir)?))
            }
        };
        Ok(Self {
            model_id: config.model_id.clone(),
            dimension: spec.dimension,
            backend,
        })
    }

    /// Deterministic offline embedder with the default model's dimension
    #[must_use]
    pub fn stub() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            dimension: 384,
            backend: EmbeddingBackend::Stub,
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::Embedding("Empty embedding result".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        match &self.backend {
            EmbeddingBackend::Stub => Ok(texts
                .iter()
                .map(|text| stub_embed(text, self.dimension))
                .collect()),
            EmbeddingBackend::Ort(backend) => {
                let backend = backend.clone();
                let owned = texts.to_vec();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::Embedding(format!("Join error: {e}")))?
            }
        }
    }
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_batch: usize,
    dimension: usize,
}

impl OrtBackend {
    fn new(spec: &ModelSpec, model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(spec.onnx_file);
        let tokenizer_path = model_dir.join(spec.tokenizer_file);
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::Embedding(format!(
                "Model files are missing. Expected ONNX at {} and tokenizer at {} (set {MODEL_DIR_ENV} or use {MODE_ENV}=stub).",
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| VectorStoreError::Embedding(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| VectorStoreError::Embedding(format!("Tokenizer truncation failed: {e}")))?;

        let threads = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(1);
        let session = Session::builder()
            .map_err(|e| VectorStoreError::Embedding(format!("{e}")))?
            .with_intra_threads(threads)
            .map_err(|e| {
                VectorStoreError::Embedding(format!("Failed to set ORT intra threads: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::Embedding(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&model_path)
            .map_err(|e| VectorStoreError::Embedding(format!("Failed to load ONNX model: {e}")))?;

        log::info!(
            "Loaded ONNX model from {} (dim {}, max_length {})",
            model_dir.display(),
            spec.dimension,
            spec.max_length
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| VectorStoreError::Embedding(format!("Tokenization failed: {e}")))?;
            let Some(seq_len) = encodings.first().map(Encoding::len) else {
                continue;
            };

            let inputs = InputTensors::from_encodings(&encodings, seq_len);
            let mut available: HashMap<&str, DynTensor> = HashMap::new();
            available.insert("input_ids", to_tensor(inputs.ids, batch.len(), seq_len)?);
            available.insert(
                "attention_mask",
                to_tensor(inputs.masks, batch.len(), seq_len)?,
            );
            available.insert(
                "token_type_ids",
                to_tensor(inputs.type_ids, batch.len(), seq_len)?,
            );

            let array = {
                let mut session = self.session.lock().map_err(|_| {
                    VectorStoreError::Embedding("Failed to lock ONNX session".into())
                })?;

                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in session.inputs() {
                    let tensor = available.remove(input.name()).ok_or_else(|| {
                        VectorStoreError::Embedding(format!(
                            "Unsupported ONNX input '{}'",
                            input.name()
                        ))
                    })?;
                    feed.insert(input.name().to_string(), tensor);
                }

                let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                    VectorStoreError::Embedding(format!("ONNX forward failed: {e}"))
                })?;
                if outputs.len() == 0 {
                    return Err(VectorStoreError::Embedding(
                        "ONNX returned no outputs".to_string(),
                    ));
                }

                let array = outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        VectorStoreError::Embedding(format!("Failed to decode ONNX output: {e}"))
                    })?
                    .to_owned();
                drop(outputs);
                array
            };

            results.extend(pool_output(array, &inputs.mask_rows, self.dimension)?);
        }
        Ok(results)
    }
}

struct InputTensors {
    ids: Vec<i64>,
    masks: Vec<i64>,
    type_ids: Vec<i64>,
    mask_rows: Vec<Vec<i64>>,
}

impl InputTensors {
    fn from_encodings(encodings: &[Encoding], seq_len: usize) -> Self {
        let capacity = encodings.len() * seq_len;
        let mut out = Self {
            ids: Vec::with_capacity(capacity),
            masks: Vec::with_capacity(capacity),
            type_ids: Vec::with_capacity(capacity),
            mask_rows: Vec::with_capacity(encodings.len()),
        };
        for encoding in encodings {
            let pad = |values: &[u32]| -> Vec<i64> {
                (0..seq_len)
                    .map(|idx| i64::from(values.get(idx).copied().unwrap_or(0)))
                    .collect()
            };
            let mask = pad(encoding.get_attention_mask());
            out.ids.extend(pad(encoding.get_ids()));
            out.type_ids.extend(pad(encoding.get_type_ids()));
            out.masks.extend(mask.iter().copied());
            out.mask_rows.push(mask);
        }
        out
    }
}

fn to_tensor(values: Vec<i64>, rows: usize, cols: usize) -> Result<DynTensor> {
    let array = Array::from_shape_vec((rows, cols), values)
        .map_err(|e| VectorStoreError::Embedding(format!("Input shape error: {e}")))?;
    Ok(Tensor::from_array(array.into_dyn())
        .map_err(|e| VectorStoreError::Embedding(format!("{e}")))?
        .upcast())
}

/// Sentence embeddings from model output: already pooled `[batch, dim]` or token states
/// `[batch, seq, dim]` mean-pooled over the attention mask. Always L2-normalised.
fn pool_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let pooled = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::Embedding(format!("Bad output shape: {e}")))?;
            for row in pooled.outer_iter() {
                out.push(row.to_vec());
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::Embedding(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let width = sample.len_of(Axis(1));
                let mut sum = vec![0.0f32; width];
                let mut count = 0.0f32;
                let mask = mask_rows.get(idx).map(Vec::as_slice).unwrap_or_default();
                for (token_idx, token) in sample.outer_iter().enumerate() {
                    if mask.get(token_idx).copied().unwrap_or(0) == 0 {
                        continue;
                    }
                    count += 1.0;
                    for (acc, value) in sum.iter_mut().zip(token.iter()) {
                        *acc += value;
                    }
                }
                if count > 0.0 {
                    sum.iter_mut().for_each(|v| *v /= count);
                }
                out.push(sum);
            }
        }
        _ => {
            return Err(VectorStoreError::Embedding(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }

    for embedding in &mut out {
        if embedding.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }
        normalize(embedding);
    }
    Ok(out)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.iter_mut().for_each(|v| *v /= norm);
    }
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Hash-seeded unit vector; identical text always maps to the identical vector.
fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state = fnv1a_64(text.as_bytes()) ^ (dimension as u64).rotate_left(17);
    let mut vec: Vec<f32> = (0..dimension)
        .map(|_| {
            let bits = splitmix64(&mut state);
            // top 24 bits -> [0, 1) -> [-1, 1)
            ((bits >> 40) as f32 / (1u64 << 24) as f32).mul_add(2.0, -1.0)
        })
        .collect();
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
