//! Per-recipe enrichment steps.
//!
//! Three independent operations per recipe: detail text, cover image,
//! embeddings. Each is independently fallible; a failure never removes data
//! a prior step already populated. Failure isolation across recipes lives
//! in the pipeline loop, which logs stage errors and continues.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::{encode_cover, HttpFetcher, ImageError, COVER_MAX_DIMENSION};
use crate::imagejob::{ImageJobClient, ImageJobError};
use crate::llm::{
    generate_structured, EmbeddingGenerator, GenerationError, TextGenerator,
};
use crate::prompts;
use crate::types::Recipe;

/// Error from one enrichment step for one recipe.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Image job failed: {0}")]
    ImageJob(#[from] ImageJobError),

    #[error("Image processing failed: {0}")]
    Image(#[from] ImageError),

    #[error("Failed to write image file: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Cancellation propagates as a stop, not a logged item failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StageError::ImageJob(ImageJobError::Cancelled))
    }
}

/// Generated recipe detail, also the example shape sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDetails {
    pub description: String,
    pub ingredients: Vec<String>,
    pub instructions_markdown: String,
    pub cover_image_prompt: String,
}

impl RecipeDetails {
    /// Example instance serialized into the system message to teach the
    /// backend the expected shape.
    fn example() -> Self {
        Self {
            description: "A short, appetizing description of the dish.".to_string(),
            ingredients: vec![
                "200g spaghetti".to_string(),
                "2 eggs".to_string(),
            ],
            instructions_markdown: "1. First step.\n2. Second step.".to_string(),
            cover_image_prompt: "A photograph of the plated dish.".to_string(),
        }
    }
}

/// Enriches one recipe at a time against the configured backends.
#[derive(Debug, Clone)]
pub struct Enricher {
    pub text: Arc<dyn TextGenerator>,
    pub embedding: Arc<dyn EmbeddingGenerator>,
    pub fetcher: Arc<dyn HttpFetcher>,
    pub image_quality: u8,
}

impl Enricher {
    /// Stage A: fill in description, ingredients, instructions and the
    /// cover image prompt.
    pub async fn generate_details(
        &self,
        recipe: &mut Recipe,
        cuisine: &str,
    ) -> Result<(), StageError> {
        let prompt = prompts::render_recipe_details_prompt(&recipe.name, cuisine);
        let details: RecipeDetails = generate_structured(
            self.text.as_ref(),
            &RecipeDetails::example(),
            prompts::RECIPE_DETAILS_SYSTEM,
            &prompt,
        )
        .await?;

        recipe.description = Some(details.description);
        recipe.ingredients = Some(details.ingredients);
        recipe.instructions_markdown = Some(details.instructions_markdown);
        recipe.cover_image_prompt = Some(details.cover_image_prompt);
        Ok(())
    }

    /// Stage B: run the image job for the recipe's cover prompt, download
    /// the result, re-encode it and store it under a canonical filename.
    ///
    /// A recipe without a cover image prompt is left untouched.
    pub async fn generate_cover_image(
        &self,
        recipe: &mut Recipe,
        image_client: &ImageJobClient,
        images_dir: &Path,
    ) -> Result<(), StageError> {
        let Some(prompt) = recipe.cover_image_prompt.clone() else {
            return Ok(());
        };

        let url = image_client.generate(&prompt).await?;
        let data = self.fetcher.fetch_bytes(&url).await?;
        let jpeg = encode_cover(&data, COVER_MAX_DIMENSION, self.image_quality)?;

        let filename = format!("{}.jpg", slug(&recipe.name));
        tokio::fs::write(images_dir.join(&filename), jpeg).await?;

        recipe.cover_image = Some(filename);
        Ok(())
    }

    /// Stage C: embed the recipe name and, when present, the description.
    ///
    /// The two embeddings fail independently; a stored vector survives the
    /// other one failing.
    pub async fn generate_embeddings(&self, recipe: &mut Recipe) -> Result<(), StageError> {
        let mut first_error = None;

        match self.embedding.embed(recipe.name.trim()).await {
            Ok(vector) => recipe.name_embedding = Some(vector),
            Err(e) => first_error = Some(e),
        }

        if let Some(description) = recipe.description.clone() {
            match self.embedding.embed(description.trim()).await {
                Ok(vector) => recipe.description_embedding = Some(vector),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Canonical filename stem for a recipe: lowercased, runs of
/// non-alphanumerics collapsed to single hyphens.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("recipe");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::image::MockFetcher;
    use crate::imagejob::{FakeImageJobTransport, PollScript};
    use crate::llm::{FakeEmbeddingGenerator, FakeTextGenerator};
    use image::ImageFormat;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn details_json() -> String {
        serde_json::to_string(&RecipeDetails {
            description: "A Roman classic.".to_string(),
            ingredients: vec!["spaghetti".to_string(), "guanciale".to_string()],
            instructions_markdown: "1. Boil pasta.".to_string(),
            cover_image_prompt: "A bowl of carbonara.".to_string(),
        })
        .unwrap()
    }

    fn enricher(text: FakeTextGenerator, fetcher: MockFetcher) -> Enricher {
        Enricher {
            text: Arc::new(text),
            embedding: Arc::new(FakeEmbeddingGenerator::new()),
            fetcher: Arc::new(fetcher),
            image_quality: 60,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(8, 8);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slug("Spaghetti alla Carbonara"), "spaghetti-alla-carbonara");
        assert_eq!(slug("Bánh mì!"), "bánh-mì");
        assert_eq!(slug("  --  "), "recipe");
    }

    #[tokio::test]
    async fn details_populate_all_four_fields() {
        let text = FakeTextGenerator::new().with_default_response(&details_json());
        let e = enricher(text, MockFetcher::new());

        let mut recipe = Recipe::new("Spaghetti alla Carbonara");
        e.generate_details(&mut recipe, "Italian").await.unwrap();

        assert_eq!(recipe.description.as_deref(), Some("A Roman classic."));
        assert_eq!(recipe.ingredients.as_ref().unwrap().len(), 2);
        assert!(recipe.instructions_markdown.is_some());
        assert_eq!(
            recipe.cover_image_prompt.as_deref(),
            Some("A bowl of carbonara.")
        );
    }

    #[tokio::test]
    async fn failed_details_leave_recipe_untouched() {
        let text = FakeTextGenerator::new().with_failure("backend down");
        let e = enricher(text, MockFetcher::new());

        let mut recipe = Recipe::new("Pho");
        let err = e.generate_details(&mut recipe, "Vietnamese").await.unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
        assert!(recipe.description.is_none());
        assert!(recipe.cover_image_prompt.is_none());
    }

    #[tokio::test]
    async fn cover_image_is_downloaded_encoded_and_stored() {
        let url = "https://images.example/result.png";
        let fetcher = MockFetcher::new().with_bytes(url, png_bytes());
        let e = enricher(FakeTextGenerator::new(), fetcher);

        let transport = Arc::new(FakeImageJobTransport::new(PollScript::new().succeed(url)));
        let client = ImageJobClient::new(
            transport,
            RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_millis(1),
            },
            CancellationToken::new(),
        );

        let dir = tempfile::tempdir().unwrap();
        let mut recipe = Recipe::new("Pad Thai");
        recipe.cover_image_prompt = Some("A plate of pad thai".to_string());

        e.generate_cover_image(&mut recipe, &client, dir.path())
            .await
            .unwrap();

        assert_eq!(recipe.cover_image.as_deref(), Some("pad-thai.jpg"));
        let stored = std::fs::read(dir.path().join("pad-thai.jpg")).unwrap();
        assert_eq!(
            crate::image::validate_image(&stored).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[tokio::test]
    async fn missing_cover_prompt_is_a_no_op() {
        let e = enricher(FakeTextGenerator::new(), MockFetcher::new());
        let transport = Arc::new(FakeImageJobTransport::new(PollScript::new()));
        let client = ImageJobClient::new(
            transport.clone(),
            RetryPolicy::default(),
            CancellationToken::new(),
        );

        let dir = tempfile::tempdir().unwrap();
        let mut recipe = Recipe::new("Salad");
        e.generate_cover_image(&mut recipe, &client, dir.path())
            .await
            .unwrap();

        assert!(recipe.cover_image.is_none());
        assert_eq!(transport.submit_count(), 0);
    }

    #[tokio::test]
    async fn failed_image_job_leaves_prior_fields_intact() {
        let e = enricher(FakeTextGenerator::new(), MockFetcher::new());
        let transport = Arc::new(FakeImageJobTransport::new(
            PollScript::new().terminal(crate::imagejob::OperationStatus::Failed),
        ));
        let client = ImageJobClient::new(
            transport,
            RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_millis(1),
            },
            CancellationToken::new(),
        );

        let dir = tempfile::tempdir().unwrap();
        let mut recipe = Recipe::new("Tacos");
        recipe.description = Some("Street style.".to_string());
        recipe.cover_image_prompt = Some("Tacos on a board".to_string());

        let err = e
            .generate_cover_image(&mut recipe, &client, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::ImageJob(_)));
        assert!(recipe.cover_image.is_none());
        assert_eq!(recipe.description.as_deref(), Some("Street style."));
    }

    #[tokio::test]
    async fn embeddings_cover_name_and_description() {
        let e = enricher(FakeTextGenerator::new(), MockFetcher::new());
        let mut recipe = Recipe::new("Ramen");
        recipe.description = Some("Rich pork broth.".to_string());

        e.generate_embeddings(&mut recipe).await.unwrap();
        assert!(recipe.name_embedding.is_some());
        assert!(recipe.description_embedding.is_some());
    }

    #[tokio::test]
    async fn embedding_failure_is_reported_but_isolated() {
        let mut e = enricher(FakeTextGenerator::new(), MockFetcher::new());
        e.embedding = Arc::new(FakeEmbeddingGenerator::new().with_failure("quota"));

        let mut recipe = Recipe::new("Ramen");
        let err = e.generate_embeddings(&mut recipe).await.unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
        assert!(recipe.name_embedding.is_none());
    }

    #[tokio::test]
    async fn description_embedding_skipped_when_no_description() {
        let e = enricher(FakeTextGenerator::new(), MockFetcher::new());
        let mut recipe = Recipe::new("Ramen");

        e.generate_embeddings(&mut recipe).await.unwrap();
        assert!(recipe.name_embedding.is_some());
        assert!(recipe.description_embedding.is_none());
    }
}
