//! Data model for the generated recipe book.
//!
//! Enrichment fields are all optional: absence means "enrichment failed or
//! was skipped for this recipe", never an error for the run as a whole.
//! Absent fields are omitted from the output document so consumers can
//! distinguish "not generated" from "generated empty".

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The final output document: every requested cuisine with every requested
/// recipe, however much enrichment succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeBook {
    pub cuisines: Vec<Cuisine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cuisine {
    pub name: String,
    pub recipes: Vec<Recipe>,
}

/// A single recipe, starting as a bare name and enriched in place by the
/// pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions_markdown: Option<String>,

    /// Filename of the stored cover image, relative to the run's Images/
    /// directory. Only set after a successful image job, download and encode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_embedding: Option<Vec<f32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_embedding: Option<Vec<f32>>,
}

impl Recipe {
    /// Create a bare recipe stub from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cover_image_prompt: None,
            description: None,
            ingredients: None,
            instructions_markdown: None,
            cover_image: None,
            name_embedding: None,
            description_embedding: None,
        }
    }
}

/// Shape of the top-level list call: recipe names per cuisine, no detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeNameList {
    pub cuisines: Vec<CuisineNames>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuisineNames {
    pub name: String,
    pub recipe_names: Vec<String>,
}

/// Concurrently-updated counters for one pipeline stage.
///
/// Workers increment; the progress reporter reads. Plain atomics, no lock.
#[derive(Debug, Default)]
pub struct StageProgress {
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
}

impl StageProgress {
    pub fn record_success(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_failure(&self) -> usize {
        self.failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Items finished so far, success or failure.
    pub fn finished(&self) -> usize {
        self.completed() + self.failed()
    }
}

/// Summary of a completed (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub elapsed: Duration,
    pub cuisines: usize,
    pub recipes: usize,
    pub details_generated: usize,
    pub images_generated: usize,
    pub embeddings_generated: usize,
    /// True when the run was interrupted by cancellation before all stages
    /// completed. The document is still written with whatever finished.
    pub cancelled: bool,
}
