//! Run orchestration: list generation, three bounded enrichment stages,
//! document and image output.
//!
//! Stages run strictly one after another; items within a stage run under a
//! bounded worker pool and are re-associated with their recipe by index,
//! never by completion order. Per-item failures are logged and isolated;
//! only the top-level list call and output I/O are fatal.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, GenerationConfig};
use crate::enrich::{Enricher, StageError};
use crate::imagejob::{ImageJobClient, ImageJobTransport};
use crate::llm::{generate_structured, GenerationError};
use crate::prompts;
use crate::types::{
    Cuisine, CuisineNames, Recipe, RecipeBook, RecipeNameList, RunSummary, StageProgress,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to generate the recipe list: {0}")]
    ListGeneration(#[from] GenerationError),

    #[error("The generated recipe list contained no recipes")]
    EmptyList,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize the output document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One recipe's place in the book while stages move it in and out of
/// worker tasks.
struct Slot {
    cuisine: usize,
    recipe: Option<Recipe>,
}

/// Run the whole generation pipeline.
///
/// Fatal errors abort before the document exists; once the run directory is
/// created, per-item failures only leave fields absent. A cancelled run
/// still writes the document with whatever completed.
pub async fn run(
    config: &GenerationConfig,
    enricher: Enricher,
    image_transport: Arc<dyn ImageJobTransport>,
    cancel: CancellationToken,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let started = Instant::now();

    // Single top-level list call, all-or-nothing.
    let cuisine_names = request_recipe_list(config, &enricher).await?;
    let (slots, book_cuisines) = build_slots(config, cuisine_names);
    let total = slots.len();
    if total == 0 {
        return Err(PipelineError::EmptyList);
    }

    let run_id = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let run_dir = config.output_dir.join(&run_id);
    let images_dir = run_dir.join("Images");
    tokio::fs::create_dir_all(&images_dir).await?;

    println!("Generating recipe book");
    println!("  Run ID: {}", run_id);
    println!("  Cuisines: {}", book_cuisines.len());
    println!("  Recipes: {}", total);
    println!();

    let mut slots = slots;
    let mut cancelled = false;

    // Stage A: recipe details.
    println!("Stage A: recipe details (concurrency {})", config.recipe_concurrency);
    let details = Arc::new(StageProgress::default());
    cancelled |= run_detail_stage(config, &enricher, &book_cuisines, &mut slots, &details, &cancel)
        .await;

    // Stage B: cover images, separate pool with its own tighter limit.
    let images = Arc::new(StageProgress::default());
    if config.skip_images {
        println!("Stage B: cover images (skipped)");
    } else if !cancelled {
        println!("Stage B: cover images (concurrency {})", config.image_concurrency);
        let image_client = Arc::new(ImageJobClient::new(
            image_transport,
            config.retry,
            cancel.clone(),
        ));
        cancelled |= run_image_stage(
            config,
            &enricher,
            image_client,
            &images_dir,
            &book_cuisines,
            &mut slots,
            &images,
            &cancel,
        )
        .await;
    }

    // Stage C: embeddings.
    let embeddings = Arc::new(StageProgress::default());
    if config.skip_embeddings {
        println!("Stage C: embeddings (skipped)");
    } else if !cancelled {
        println!("Stage C: embeddings (concurrency {})", config.recipe_concurrency);
        cancelled |=
            run_embedding_stage(config, &enricher, &book_cuisines, &mut slots, &embeddings, &cancel)
                .await;
    }

    // Reassemble and write the document; every requested recipe appears,
    // enriched or not.
    let book = reassemble(book_cuisines, slots);
    let document = serde_json::to_string_pretty(&book)?;
    tokio::fs::write(run_dir.join("Cuisines.json"), document).await?;

    let summary = RunSummary {
        run_id,
        run_dir,
        elapsed: started.elapsed(),
        cuisines: book.cuisines.len(),
        recipes: total,
        details_generated: details.completed(),
        images_generated: images.completed(),
        embeddings_generated: embeddings.completed(),
        cancelled,
    };

    print_summary(&summary);
    Ok(summary)
}

async fn request_recipe_list(
    config: &GenerationConfig,
    enricher: &Enricher,
) -> Result<Vec<CuisineNames>, PipelineError> {
    let example = RecipeNameList {
        cuisines: vec![CuisineNames {
            name: "Example Cuisine".to_string(),
            recipe_names: vec!["First Dish".to_string(), "Second Dish".to_string()],
        }],
    };
    let prompt = prompts::render_recipe_list_prompt(&config.cuisines, config.recipes_per_cuisine);

    let list: RecipeNameList = generate_structured(
        enricher.text.as_ref(),
        &example,
        prompts::RECIPE_LIST_SYSTEM,
        &prompt,
    )
    .await?;

    Ok(list.cuisines)
}

/// Build the work slots: every configured cuisine appears in the book even
/// if the backend omitted it; extra recipe names beyond the requested count
/// are dropped.
fn build_slots(
    config: &GenerationConfig,
    generated: Vec<CuisineNames>,
) -> (Vec<Slot>, Vec<String>) {
    let mut slots = Vec::new();
    let mut cuisine_names = Vec::new();

    for (index, requested) in config.cuisines.iter().enumerate() {
        let names = generated
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(requested))
            .map(|c| c.recipe_names.clone())
            .unwrap_or_default();

        if names.is_empty() {
            tracing::warn!(cuisine = %requested, "Backend returned no recipes for cuisine");
        }

        for name in names.into_iter().take(config.recipes_per_cuisine) {
            slots.push(Slot {
                cuisine: index,
                recipe: Some(Recipe::new(name)),
            });
        }
        cuisine_names.push(requested.clone());
    }

    (slots, cuisine_names)
}

fn reassemble(cuisine_names: Vec<String>, slots: Vec<Slot>) -> RecipeBook {
    let mut cuisines: Vec<Cuisine> = cuisine_names
        .into_iter()
        .map(|name| Cuisine {
            name,
            recipes: Vec::new(),
        })
        .collect();

    for slot in slots {
        if let Some(recipe) = slot.recipe {
            cuisines[slot.cuisine].recipes.push(recipe);
        }
    }

    RecipeBook { cuisines }
}

/// Outcome of one worker: the slot index, the recipe handed back, and the
/// step result.
type StageOutcome = (usize, Recipe, Result<(), StageError>);

fn progress_line(finished: usize, total: usize, name: &str, cuisine: &str) -> String {
    format!("  [{finished}/{total}] {name} ({cuisine})")
}

/// Drain one finished worker and write its recipe back into the slots.
/// Returns true if the worker stopped on cancellation.
fn settle(
    outcome: StageOutcome,
    slots: &mut [Slot],
    cuisine_names: &[String],
    progress: &StageProgress,
    total: usize,
    stage: &str,
) -> bool {
    let (index, recipe, result) = outcome;
    let name = recipe.name.clone();
    let cuisine = cuisine_names[slots[index].cuisine].clone();
    slots[index].recipe = Some(recipe);

    match result {
        Ok(()) => {
            let finished = progress.record_success();
            println!(
                "{}",
                progress_line(finished + progress.failed(), total, &name, &cuisine)
            );
            false
        }
        Err(e) if e.is_cancellation() => true,
        Err(e) => {
            progress.record_failure();
            tracing::warn!(
                recipe = %name,
                cuisine = %cuisine,
                stage,
                error = %e,
                "Enrichment failed for recipe"
            );
            false
        }
    }
}

async fn run_detail_stage(
    config: &GenerationConfig,
    enricher: &Enricher,
    cuisine_names: &[String],
    slots: &mut Vec<Slot>,
    progress: &Arc<StageProgress>,
    cancel: &CancellationToken,
) -> bool {
    let total = slots.len();
    let mut tasks: JoinSet<StageOutcome> = JoinSet::new();
    let mut cancelled = false;

    for index in 0..slots.len() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let Some(recipe) = slots[index].recipe.take() else {
            continue;
        };
        let cuisine = cuisine_names[slots[index].cuisine].clone();
        let enricher = enricher.clone();

        tasks.spawn(async move {
            let mut recipe = recipe;
            let result = enricher.generate_details(&mut recipe, &cuisine).await;
            (index, recipe, result)
        });

        if tasks.len() >= config.recipe_concurrency {
            if let Some(Ok(outcome)) = tasks.join_next().await {
                cancelled |= settle(outcome, slots, cuisine_names, progress, total, "details");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Ok(outcome) = joined {
            cancelled |= settle(outcome, slots, cuisine_names, progress, total, "details");
        }
    }

    cancelled
}

async fn run_image_stage(
    config: &GenerationConfig,
    enricher: &Enricher,
    image_client: Arc<ImageJobClient>,
    images_dir: &Path,
    cuisine_names: &[String],
    slots: &mut Vec<Slot>,
    progress: &Arc<StageProgress>,
    cancel: &CancellationToken,
) -> bool {
    let total = slots
        .iter()
        .filter(|s| {
            s.recipe
                .as_ref()
                .is_some_and(|r| r.cover_image_prompt.is_some())
        })
        .count();
    let mut tasks: JoinSet<StageOutcome> = JoinSet::new();
    let mut cancelled = false;

    for index in 0..slots.len() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let has_prompt = slots[index]
            .recipe
            .as_ref()
            .is_some_and(|r| r.cover_image_prompt.is_some());
        if !has_prompt {
            continue;
        }
        let Some(recipe) = slots[index].recipe.take() else {
            continue;
        };
        let enricher = enricher.clone();
        let image_client = image_client.clone();
        let images_dir = images_dir.to_path_buf();

        tasks.spawn(async move {
            let mut recipe = recipe;
            let result = enricher
                .generate_cover_image(&mut recipe, &image_client, &images_dir)
                .await;
            (index, recipe, result)
        });

        if tasks.len() >= config.image_concurrency {
            if let Some(Ok(outcome)) = tasks.join_next().await {
                cancelled |= settle(outcome, slots, cuisine_names, progress, total, "images");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Ok(outcome) = joined {
            cancelled |= settle(outcome, slots, cuisine_names, progress, total, "images");
        }
    }

    cancelled
}

async fn run_embedding_stage(
    config: &GenerationConfig,
    enricher: &Enricher,
    cuisine_names: &[String],
    slots: &mut Vec<Slot>,
    progress: &Arc<StageProgress>,
    cancel: &CancellationToken,
) -> bool {
    let total = slots.len();
    let mut tasks: JoinSet<StageOutcome> = JoinSet::new();
    let mut cancelled = false;

    for index in 0..slots.len() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let Some(recipe) = slots[index].recipe.take() else {
            continue;
        };
        let enricher = enricher.clone();

        tasks.spawn(async move {
            let mut recipe = recipe;
            let result = enricher.generate_embeddings(&mut recipe).await;
            (index, recipe, result)
        });

        if tasks.len() >= config.recipe_concurrency {
            if let Some(Ok(outcome)) = tasks.join_next().await {
                cancelled |= settle(outcome, slots, cuisine_names, progress, total, "embeddings");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Ok(outcome) = joined {
            cancelled |= settle(outcome, slots, cuisine_names, progress, total, "embeddings");
        }
    }

    cancelled
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.cancelled {
        println!("Run interrupted");
    } else {
        println!("Run complete");
    }
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Cuisines: {}", summary.cuisines);
    println!("  Recipes: {}", summary.recipes);
    println!("  Details generated: {}", summary.details_generated);
    println!("  Images generated: {}", summary.images_generated);
    println!("  Embeddings generated: {}", summary.embeddings_generated);
    println!("  Output: {}", summary.run_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::RecipeDetails;
    use crate::image::MockFetcher;
    use crate::imagejob::{FakeImageJobTransport, OperationStatus, PollScript};
    use crate::llm::{FakeEmbeddingGenerator, FakeTextGenerator};
    use image::ImageFormat;
    use std::io::Cursor;
    use std::time::Duration;

    const IMAGE_URL: &str = "https://images.example/result.png";

    fn list_json(cuisines: &[(&str, &[&str])]) -> String {
        let list = RecipeNameList {
            cuisines: cuisines
                .iter()
                .map(|(name, recipes)| CuisineNames {
                    name: name.to_string(),
                    recipe_names: recipes.iter().map(|r| r.to_string()).collect(),
                })
                .collect(),
        };
        serde_json::to_string(&list).unwrap()
    }

    fn details_json() -> String {
        serde_json::to_string(&RecipeDetails {
            description: "A classic.".to_string(),
            ingredients: vec!["an ingredient".to_string()],
            instructions_markdown: "1. Cook.".to_string(),
            cover_image_prompt: "A photo of the dish.".to_string(),
        })
        .unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(8, 8);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// Text generator answering both the list call and every detail call.
    fn text_generator(cuisines: &[(&str, &[&str])]) -> FakeTextGenerator {
        FakeTextGenerator::new()
            .with_response("recipe book outline", &list_json(cuisines))
            .with_response("Write the full recipe", &details_json())
    }

    fn enricher(text: FakeTextGenerator) -> Enricher {
        Enricher {
            text: Arc::new(text),
            embedding: Arc::new(FakeEmbeddingGenerator::new()),
            fetcher: Arc::new(MockFetcher::new().with_bytes(IMAGE_URL, png_bytes())),
            image_quality: 60,
        }
    }

    fn config(dir: &Path, cuisines: &[&str], per_cuisine: usize) -> GenerationConfig {
        let mut config =
            GenerationConfig::new(cuisines.iter().map(|c| c.to_string()).collect()).unwrap();
        config.recipes_per_cuisine = per_cuisine;
        config.output_dir = dir.to_path_buf();
        config.retry.base_delay = Duration::from_millis(1);
        config
    }

    fn succeeding_transport() -> Arc<FakeImageJobTransport> {
        Arc::new(FakeImageJobTransport::new(
            PollScript::new().succeed(IMAGE_URL),
        ))
    }

    #[tokio::test]
    async fn fully_successful_run_enriches_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 2);
        let text = text_generator(&[("Italian", &["Ribollita", "Carbonara"])]);
        let e = enricher(text);

        let summary = run(
            &config,
            e,
            succeeding_transport(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.cuisines, 1);
        assert_eq!(summary.recipes, 2);
        assert_eq!(summary.details_generated, 2);
        assert_eq!(summary.images_generated, 2);
        assert_eq!(summary.embeddings_generated, 2);
        assert!(!summary.cancelled);

        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        assert_eq!(book.cuisines.len(), 1);
        assert_eq!(book.cuisines[0].recipes.len(), 2);
        for recipe in &book.cuisines[0].recipes {
            assert!(recipe.description.is_some());
            assert!(recipe.ingredients.is_some());
            assert!(recipe.instructions_markdown.is_some());
            assert!(recipe.cover_image.is_some());
            assert!(recipe.name_embedding.is_some());
            assert!(recipe.description_embedding.is_some());
        }

        let image_files: Vec<_> = std::fs::read_dir(summary.run_dir.join("Images"))
            .unwrap()
            .collect();
        assert_eq!(image_files.len(), 2);
    }

    #[tokio::test]
    async fn failing_image_backend_leaves_recipes_without_covers() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 2);
        let text = text_generator(&[("Italian", &["Ribollita", "Carbonara"])]);
        let transport = Arc::new(FakeImageJobTransport::new(
            PollScript::new().terminal(OperationStatus::Failed),
        ));

        let summary = run(&config, enricher(text), transport, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.images_generated, 0);
        assert_eq!(summary.details_generated, 2);
        assert_eq!(summary.embeddings_generated, 2);

        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        for recipe in &book.cuisines[0].recipes {
            assert!(recipe.cover_image.is_none());
            assert!(recipe.description.is_some());
        }

        let image_files: Vec<_> = std::fs::read_dir(summary.run_dir.join("Images"))
            .unwrap()
            .collect();
        assert!(image_files.is_empty());
    }

    #[tokio::test]
    async fn failed_list_call_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 1);
        let text = FakeTextGenerator::new().with_failure("backend down");

        let err = run(
            &config,
            enricher(text),
            succeeding_transport(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::ListGeneration(_)));
        // No run directory was created.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_list_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 1);
        let text = text_generator(&[("Italian", &[])]);

        let err = run(
            &config,
            enricher(text),
            succeeding_transport(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyList));
    }

    #[tokio::test]
    async fn omitted_cuisine_still_appears_in_the_book() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian", "Thai"], 1);
        // Backend only answers for Italian.
        let text = text_generator(&[("Italian", &["Ribollita"])]);

        let summary = run(
            &config,
            enricher(text),
            succeeding_transport(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        assert_eq!(book.cuisines.len(), 2);
        assert_eq!(book.cuisines[0].recipes.len(), 1);
        assert!(book.cuisines[1].recipes.is_empty());
    }

    #[tokio::test]
    async fn extra_recipe_names_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 1);
        let text = text_generator(&[("Italian", &["One", "Two", "Three"])]);

        let summary = run(
            &config,
            enricher(text),
            succeeding_transport(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.recipes, 1);
    }

    #[tokio::test]
    async fn detail_stage_respects_the_concurrency_bound() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), &["Italian"], 6);
        config.recipe_concurrency = 2;
        config.skip_images = true;
        config.skip_embeddings = true;

        let names: Vec<&str> = vec!["A", "B", "C", "D", "E", "F"];
        let text = text_generator(&[("Italian", names.as_slice())])
            .with_delay(Duration::from_millis(20));
        let text = Arc::new(text);
        let e = Enricher {
            text: text.clone(),
            embedding: Arc::new(FakeEmbeddingGenerator::new()),
            fetcher: Arc::new(MockFetcher::new()),
            image_quality: 60,
        };

        run(&config, e, succeeding_transport(), CancellationToken::new())
            .await
            .unwrap();

        // 6 detail calls + 1 list call; never more than 2 in flight at once
        // (the list call runs alone before the stage starts).
        assert_eq!(text.call_count(), 7);
        assert!(text.peak_concurrency() <= 2);
    }

    #[tokio::test]
    async fn image_stage_respects_its_own_bound() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), &["Italian"], 4);
        config.image_concurrency = 1;
        config.skip_embeddings = true;

        let names: Vec<&str> = vec!["A", "B", "C", "D"];
        let text = text_generator(&[("Italian", names.as_slice())]);
        let transport = Arc::new(
            FakeImageJobTransport::new(PollScript::new().succeed(IMAGE_URL))
                .with_delay(Duration::from_millis(10)),
        );

        run(
            &config,
            enricher(text),
            transport.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(transport.peak_concurrency() <= 1);
    }

    #[tokio::test]
    async fn cancelled_run_still_writes_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 2);
        let text = text_generator(&[("Italian", &["Ribollita", "Carbonara"])]);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = run(&config, enricher(text), succeeding_transport(), cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.details_generated, 0);

        // The document still holds every requested recipe stub.
        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        assert_eq!(book.cuisines[0].recipes.len(), 2);
        assert!(book.cuisines[0].recipes[0].description.is_none());
    }

    #[tokio::test]
    async fn cancellation_mid_run_preserves_completed_items() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 2);
        let text = text_generator(&[("Italian", &["Ribollita", "Carbonara"])]);
        // Image polls never complete; the run blocks in the image stage
        // until the token fires.
        let transport = Arc::new(FakeImageJobTransport::new(
            PollScript::new()
                .pending_with_hint(OperationStatus::Running, Duration::from_secs(3600)),
        ));

        let cancel = CancellationToken::new();
        let cancel_after = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_after.cancel();
        });

        let summary = run(&config, enricher(text), transport, cancel)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.details_generated, 2);
        assert_eq!(summary.images_generated, 0);
        assert_eq!(summary.embeddings_generated, 0);

        // The detail stage finished before cancellation; its fields survive
        // into the written document.
        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        assert_eq!(book.cuisines[0].recipes.len(), 2);
        for recipe in &book.cuisines[0].recipes {
            assert!(recipe.description.is_some());
            assert!(recipe.cover_image_prompt.is_some());
            assert!(recipe.cover_image.is_none());
        }
    }

    #[test]
    fn progress_line_names_the_cuisine() {
        assert_eq!(
            progress_line(1, 4, "Ribollita", "Italian"),
            "  [1/4] Ribollita (Italian)"
        );
    }

    #[tokio::test]
    async fn skip_flags_suppress_their_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), &["Italian"], 1);
        config.skip_images = true;
        config.skip_embeddings = true;
        let text = text_generator(&[("Italian", &["Ribollita"])]);

        let transport = succeeding_transport();
        let summary = run(
            &config,
            enricher(text),
            transport.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.details_generated, 1);
        assert_eq!(summary.images_generated, 0);
        assert_eq!(summary.embeddings_generated, 0);
        assert_eq!(transport.submit_count(), 0);

        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        let recipe = &book.cuisines[0].recipes[0];
        assert!(recipe.cover_image.is_none());
        assert!(recipe.name_embedding.is_none());
        assert!(recipe.description.is_some());
    }

    #[tokio::test]
    async fn detail_failure_does_not_affect_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &["Italian"], 2);
        // Only one of the two detail prompts has a response; the other
        // recipe's detail call errors out.
        let text = FakeTextGenerator::new()
            .with_response(
                "recipe book outline",
                &list_json(&[("Italian", &["Ribollita", "Carbonara"])]),
            )
            .with_response("Ribollita", &details_json());

        let summary = run(
            &config,
            enricher(text),
            succeeding_transport(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.details_generated, 1);

        let document = std::fs::read_to_string(summary.run_dir.join("Cuisines.json")).unwrap();
        let book: RecipeBook = serde_json::from_str(&document).unwrap();
        let recipes = &book.cuisines[0].recipes;
        assert_eq!(recipes.len(), 2);

        let enriched = recipes.iter().find(|r| r.name == "Ribollita").unwrap();
        let bare = recipes.iter().find(|r| r.name == "Carbonara").unwrap();
        assert!(enriched.description.is_some());
        assert!(bare.description.is_none());
        // Embeddings still ran for both.
        assert!(bare.name_embedding.is_some());
    }
}
