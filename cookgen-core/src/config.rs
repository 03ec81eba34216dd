//! Run configuration, built once and validated eagerly.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default public OpenAI-compatible base URL, used when no endpoint is
/// configured for a capability.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model for recipe text generation.
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default image generation model.
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Endpoint, credential and model identifier for one backend capability.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl BackendConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

/// Retry policy for the long-running image job poll loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum poll attempts before giving up.
    pub max_retries: u32,
    /// Base delay for exponential backoff between poll attempts.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Immutable configuration for one generation run.
///
/// Validated when constructed; the pipeline and its workers receive it by
/// shared reference and never mutate it.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Cuisine names to generate. Required, non-empty.
    pub cuisines: Vec<String>,
    /// Recipes requested per cuisine.
    pub recipes_per_cuisine: usize,
    /// Worker pool size for the detail and embedding stages.
    pub recipe_concurrency: usize,
    /// Worker pool size for the image stage. Image backends are typically
    /// rate-limited tighter than text, so this defaults lower.
    pub image_concurrency: usize,
    /// JPEG quality (0-100) for re-encoded cover images.
    pub image_quality: u8,
    /// Directory under which the timestamped run directory is created.
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
    pub skip_images: bool,
    pub skip_embeddings: bool,
}

impl GenerationConfig {
    /// Build a config with defaults for everything but the cuisine list.
    pub fn new(cuisines: Vec<String>) -> Result<Self, ConfigError> {
        let config = Self {
            cuisines,
            recipes_per_cuisine: 1,
            recipe_concurrency: 5,
            image_concurrency: 1,
            image_quality: 60,
            output_dir: PathBuf::from("data/generated"),
            retry: RetryPolicy::default(),
            skip_images: false,
            skip_embeddings: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants. Called by constructors; callers that fill fields
    /// directly should call it again before running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cuisines.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one cuisine is required".to_string(),
            ));
        }
        if self.cuisines.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "cuisine names must not be blank".to_string(),
            ));
        }
        if self.recipes_per_cuisine == 0 {
            return Err(ConfigError::Invalid(
                "recipes_per_cuisine must be at least 1".to_string(),
            ));
        }
        if self.recipe_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "recipe_concurrency must be at least 1".to_string(),
            ));
        }
        if self.image_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "image_concurrency must be at least 1".to_string(),
            ));
        }
        if self.image_quality > 100 {
            return Err(ConfigError::Invalid(
                "image_quality must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Total recipes requested across all cuisines.
    pub fn total_recipes(&self) -> usize {
        self.cuisines.len() * self.recipes_per_cuisine
    }
}

/// Backend settings for the three capabilities, loaded from environment
/// variables.
///
/// Required:
/// - `COOKGEN_API_KEY`: API key shared by all capabilities
///
/// Optional:
/// - `COOKGEN_BASE_URL`: base URL for all capabilities (default: OpenAI)
/// - `COOKGEN_TEXT_BASE_URL` / `COOKGEN_EMBEDDING_BASE_URL` /
///   `COOKGEN_IMAGE_BASE_URL`: per-capability endpoint overrides
/// - `COOKGEN_TEXT_MODEL`, `COOKGEN_EMBEDDING_MODEL`, `COOKGEN_IMAGE_MODEL`
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub text: BackendConfig,
    pub embedding: BackendConfig,
    pub image: BackendConfig,
}

impl BackendSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("COOKGEN_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("COOKGEN_API_KEY".to_string()))?;

        let shared_base =
            env::var("COOKGEN_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let base_for = |var: &str| env::var(var).unwrap_or_else(|_| shared_base.clone());
        let model_for = |var: &str, default: &str| {
            env::var(var).unwrap_or_else(|_| default.to_string())
        };

        Ok(Self {
            text: BackendConfig::new(
                base_for("COOKGEN_TEXT_BASE_URL"),
                api_key.clone(),
                model_for("COOKGEN_TEXT_MODEL", DEFAULT_TEXT_MODEL),
            ),
            embedding: BackendConfig::new(
                base_for("COOKGEN_EMBEDDING_BASE_URL"),
                api_key.clone(),
                model_for("COOKGEN_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            ),
            image: BackendConfig::new(
                base_for("COOKGEN_IMAGE_BASE_URL"),
                api_key,
                model_for("COOKGEN_IMAGE_MODEL", DEFAULT_IMAGE_MODEL),
            ),
        })
    }
}
