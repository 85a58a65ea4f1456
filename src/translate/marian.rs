//! MarianMT translator using candle.
//!
//! Loads a converted OPUS-MT vi-en model from a local directory or a
//! HuggingFace repo and runs greedy decoding.
//!
//! Expected files, looked up in `model_dir` first and then in `hf_repo`:
//! `model.safetensors`, `config.json`, `tokenizer-source.json`,
//! `tokenizer-target.json`. The two tokenizer files are the SentencePiece
//! vocabularies converted to the `tokenizers` JSON format. Upstream
//! `Helsinki-NLP/opus-mt-vi-en` ships `source.spm`/`target.spm` instead, so
//! it has to be converted once (see README) and there is no default repo.

use crate::defaults;
use crate::error::{PipelineError, Result};
use crate::translate::translator::{TranslationResult, Translator, validate_input};
use std::path::PathBuf;

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const CONFIG_FILE: &str = "config.json";
pub const SOURCE_TOKENIZER_FILE: &str = "tokenizer-source.json";
pub const TARGET_TOKENIZER_FILE: &str = "tokenizer-target.json";

/// Loading and decoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MarianConfig {
    /// Local directory checked before the hub
    pub model_dir: Option<PathBuf>,
    /// Hub repo holding the same converted files
    pub hf_repo: Option<String>,
    pub hf_revision: Option<String>,
    /// Source tokens accepted by the encoder, including the end marker
    pub max_input_tokens: usize,
    /// Target tokens generated before decoding stops
    pub max_decode_tokens: usize,
    /// Cut over-long input instead of failing with `SequenceTooLong`
    pub truncate: bool,
    pub use_gpu: bool,
}

impl Default for MarianConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            hf_repo: None,
            hf_revision: None,
            max_input_tokens: defaults::MAX_INPUT_TOKENS,
            max_decode_tokens: defaults::MAX_DECODE_TOKENS,
            truncate: true,
            use_gpu: true,
        }
    }
}

impl MarianConfig {
    /// Whether any place to load the model from is configured.
    pub fn has_source(&self) -> bool {
        self.model_dir.is_some() || self.hf_repo.as_deref().is_some_and(|r| !r.is_empty())
    }
}

fn init_error(message: impl Into<String>) -> PipelineError {
    PipelineError::ModelInitializationFailure {
        model: "marian".to_string(),
        message: message.into(),
    }
}

fn failure(message: impl Into<String>) -> PipelineError {
    PipelineError::TranslationFailure {
        message: message.into(),
    }
}

/// Fill keys that older OPUS-MT `config.json` files omit.
pub fn fill_config_defaults(mut value: serde_json::Value) -> Result<serde_json::Value> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| init_error("config.json is not a JSON object"))?;

    let vocab_size = obj
        .get("vocab_size")
        .cloned()
        .ok_or_else(|| init_error("config.json has no vocab_size"))?;
    let eos = obj
        .get("eos_token_id")
        .cloned()
        .ok_or_else(|| init_error("config.json has no eos_token_id"))?;

    obj.entry("decoder_vocab_size")
        .or_insert(vocab_size.clone());
    obj.entry("forced_eos_token_id").or_insert(eos);
    obj.entry("share_encoder_decoder_embeddings")
        .or_insert(serde_json::Value::Bool(true));
    obj.entry("use_cache").or_insert(serde_json::Value::Bool(true));
    obj.entry("is_encoder_decoder")
        .or_insert(serde_json::Value::Bool(true));
    obj.entry("scale_embedding")
        .or_insert(serde_json::Value::Bool(true));
    if obj.get("decoder_vocab_size").is_some_and(|v| v.is_null()) {
        obj.insert("decoder_vocab_size".to_string(), vocab_size);
    }
    Ok(value)
}

/// Enforce the encoder length limit on tokenized input.
///
/// `ids` already ends with `eos`. Over-long input is either cut to
/// `limit - 1` tokens plus `eos`, or rejected.
pub fn apply_length_policy(
    mut ids: Vec<u32>,
    limit: usize,
    truncate: bool,
    eos: u32,
) -> Result<Vec<u32>> {
    if ids.len() <= limit {
        return Ok(ids);
    }
    if !truncate || limit == 0 {
        return Err(PipelineError::SequenceTooLong {
            tokens: ids.len(),
            limit,
        });
    }
    tracing::warn!(
        tokens = ids.len(),
        limit,
        "translation input truncated"
    );
    ids.truncate(limit - 1);
    ids.push(eos);
    Ok(ids)
}

/// Index of the largest logit, never choosing `banned`.
pub fn greedy_pick(logits: &[f32], banned: u32) -> Option<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as u32 != banned)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as u32)
}

#[cfg(feature = "marian")]
mod engine {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::marian::{Config, MTModel};
    use hf_hub::api::sync::{Api, ApiRepo};
    use hf_hub::{Repo, RepoType};
    use std::path::Path;
    use std::sync::Mutex;
    use tokenizers::Tokenizer;

    /// Resolves model files from a local directory, then the hub.
    struct FileResolver {
        model_dir: Option<PathBuf>,
        repo: Option<ApiRepo>,
        repo_name: String,
    }

    impl FileResolver {
        fn new(config: &MarianConfig) -> Self {
            let repo_name = config.hf_repo.clone().filter(|r| !r.is_empty());
            let repo = repo_name.as_ref().and_then(|name| {
                let repo = match &config.hf_revision {
                    Some(rev) => Repo::with_revision(name.clone(), RepoType::Model, rev.clone()),
                    None => Repo::model(name.clone()),
                };
                Api::new().ok().map(|api| api.repo(repo))
            });
            Self {
                model_dir: config.model_dir.clone(),
                repo,
                repo_name: repo_name.unwrap_or_default(),
            }
        }

        fn get(&self, file: &str) -> Result<PathBuf> {
            if let Some(dir) = &self.model_dir {
                let local = dir.join(file);
                if local.is_file() {
                    return Ok(local);
                }
            }
            let repo = self
                .repo
                .as_ref()
                .ok_or_else(|| init_error(format!("{} not found locally and no hub repo available", file)))?;
            repo.get(file)
                .map_err(|e| init_error(format!("fetch {} from {}: {}", file, self.repo_name, e)))
        }
    }

    fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
        Tokenizer::from_file(path)
            .map_err(|e| init_error(format!("load tokenizer {}: {}", path.display(), e)))
    }

    struct Loaded {
        model: MTModel,
        source_tokenizer: Tokenizer,
        target_tokenizer: Tokenizer,
    }

    /// MarianMT translator running greedy decoding via candle.
    pub struct MarianTranslator {
        inner: Mutex<Loaded>,
        model_config: Config,
        device: Device,
        config: MarianConfig,
        model_name: String,
    }

    impl std::fmt::Debug for MarianTranslator {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MarianTranslator")
                .field("config", &self.config)
                .field("model_name", &self.model_name)
                .field("device", &self.device)
                .finish()
        }
    }

    impl MarianTranslator {
        /// Load weights, config and both tokenizers. Failure is fatal.
        pub fn load(config: MarianConfig) -> Result<Self> {
            if !config.has_source() {
                return Err(init_error("set translation.model_dir or translation.hf_repo"));
            }
            let resolver = FileResolver::new(&config);
            let weights = resolver.get(WEIGHTS_FILE)?;
            let config_path = resolver.get(CONFIG_FILE)?;
            let source_tokenizer = load_tokenizer(&resolver.get(SOURCE_TOKENIZER_FILE)?)?;
            let target_tokenizer = load_tokenizer(&resolver.get(TARGET_TOKENIZER_FILE)?)?;

            let raw = std::fs::read(&config_path)
                .map_err(|e| init_error(format!("read {}: {}", config_path.display(), e)))?;
            let value: serde_json::Value = serde_json::from_slice(&raw)
                .map_err(|e| init_error(format!("parse {}: {}", config_path.display(), e)))?;
            let model_config: Config = serde_json::from_value(fill_config_defaults(value)?)
                .map_err(|e| init_error(format!("invalid marian config: {}", e)))?;

            let device = if config.use_gpu {
                Device::cuda_if_available(0).map_err(|e| init_error(format!("device: {}", e)))?
            } else {
                Device::Cpu
            };

            // SAFETY: the weights file is not modified while mapped.
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[&weights], DType::F32, &device)
                    .map_err(|e| init_error(format!("load {}: {}", weights.display(), e)))?
            };
            let model = MTModel::new(&model_config, vb)
                .map_err(|e| init_error(format!("build model: {}", e)))?;

            let model_name = config
                .model_dir
                .as_ref()
                .and_then(|d| d.file_name())
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .or_else(|| config.hf_repo.clone())
                .unwrap_or_else(|| "marian".to_string());

            tracing::info!(
                model = %model_name,
                device = ?device,
                max_input_tokens = config.max_input_tokens,
                truncate = config.truncate,
                "marian model loaded"
            );

            Ok(Self {
                inner: Mutex::new(Loaded {
                    model,
                    source_tokenizer,
                    target_tokenizer,
                }),
                model_config,
                device,
                config,
                model_name,
            })
        }

        fn generate(&self, loaded: &mut Loaded, text: &str) -> Result<String> {
            let eos = self.model_config.eos_token_id;
            let mut ids = loaded
                .source_tokenizer
                .encode(text, true)
                .map_err(|e| failure(format!("tokenize: {}", e)))?
                .get_ids()
                .to_vec();
            ids.push(eos);
            let ids = apply_length_policy(
                ids,
                self.config.max_input_tokens,
                self.config.truncate,
                eos,
            )?;

            let model = &mut loaded.model;
            model.reset_kv_cache();

            let input = Tensor::new(ids.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| failure(format!("input tensor: {}", e)))?;
            let encoder_xs = model
                .encoder()
                .forward(&input, 0)
                .map_err(|e| failure(format!("encoder forward: {}", e)))?;

            // Greedy decode with incremental KV cache: the first step sees the
            // start token, later steps only the newest token.
            let mut token_ids = vec![self.model_config.decoder_start_token_id];
            for step in 0..self.config.max_decode_tokens {
                let start_pos = if step == 0 { 0 } else { token_ids.len() - 1 };
                let logits = Tensor::new(&token_ids[start_pos..], &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .and_then(|t| model.decode(&t, &encoder_xs, start_pos))
                    .and_then(|l| l.squeeze(0))
                    .and_then(|l| {
                        let last = l.dim(0)? - 1;
                        l.get(last)
                    })
                    .and_then(|l| l.to_dtype(DType::F32))
                    .and_then(|l| l.to_vec1::<f32>())
                    .map_err(|e| failure(format!("decoder step {}: {}", step, e)))?;

                let next = greedy_pick(&logits, self.model_config.pad_token_id)
                    .ok_or_else(|| failure("decoder produced no logits"))?;
                if next == eos || next == self.model_config.forced_eos_token_id {
                    break;
                }
                token_ids.push(next);
            }

            loaded
                .target_tokenizer
                .decode(&token_ids[1..], true)
                .map(|s| s.trim().to_string())
                .map_err(|e| failure(format!("detokenize: {}", e)))
        }
    }

    impl Translator for MarianTranslator {
        fn translate(&self, text: &str) -> Result<TranslationResult> {
            let text = validate_input(text)?;
            let mut loaded = self
                .inner
                .lock()
                .map_err(|e| failure(format!("failed to acquire model lock: {}", e)))?;
            let translated = self.generate(&mut loaded, text)?;
            Ok(TranslationResult::new(text, translated))
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }
}

#[cfg(feature = "marian")]
pub use engine::MarianTranslator;

/// Marian translator placeholder (without marian feature).
#[cfg(not(feature = "marian"))]
#[derive(Debug)]
pub struct MarianTranslator {
    model_name: String,
}

#[cfg(not(feature = "marian"))]
impl MarianTranslator {
    pub fn load(_config: MarianConfig) -> Result<Self> {
        Err(init_error(
            "built without the `marian` feature; rebuild with default features",
        ))
    }
}

#[cfg(not(feature = "marian"))]
impl Translator for MarianTranslator {
    fn translate(&self, text: &str) -> Result<TranslationResult> {
        validate_input(text)?;
        Err(failure("built without the `marian` feature"))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
