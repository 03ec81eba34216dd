//! AI recipe-book generation pipeline.
//!
//! Builds a structured recipe book (cuisines → recipes) by fanning out over
//! three generation backends: structured text for recipe detail, a
//! long-running image job for cover art, and an embedding backend for
//! search vectors. Each stage runs under a bounded worker pool with
//! per-recipe failure isolation; the run produces a single JSON document
//! plus one image file per recipe.

pub mod config;
pub mod enrich;
pub mod image;
pub mod imagejob;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod types;

pub use config::{BackendConfig, BackendSettings, ConfigError, GenerationConfig, RetryPolicy};
pub use enrich::{Enricher, RecipeDetails, StageError};
pub use image::{HttpFetcher, MockFetcher, ReqwestFetcher};
pub use imagejob::{
    FakeImageJobTransport, HttpImageJobTransport, ImageJobClient, ImageJobError,
    ImageJobTransport, OperationStatus, PollScript,
};
pub use llm::{
    EmbeddingGenerator, FakeEmbeddingGenerator, FakeTextGenerator, GenerationError,
    OpenAiEmbeddingGenerator, OpenAiTextGenerator, TextGenerator,
};
pub use pipeline::{run, PipelineError};
pub use types::{Cuisine, Recipe, RecipeBook, RunSummary};
