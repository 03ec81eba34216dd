//! Prompt templates for the generation backend.

/// System message for the top-level recipe list call.
pub const RECIPE_LIST_SYSTEM: &str =
    "You are an experienced chef curating a recipe book. Suggest well-known, \
     representative dishes for each cuisine. Use the dish's common English name.";

/// Render the top-level recipe list prompt.
pub fn render_recipe_list_prompt(cuisines: &[String], recipes_per_cuisine: usize) -> String {
    let cuisine_list = cuisines.join(", ");
    format!(
        "Produce a recipe book outline for these cuisines: {cuisine_list}. \
         For every cuisine, list exactly {recipes_per_cuisine} recipe name(s). \
         Recipe names only, no detail."
    )
}

/// System message for the per-recipe detail call.
pub const RECIPE_DETAILS_SYSTEM: &str =
    "You are an experienced chef writing a recipe book. Write approachable, \
     precise recipes for home cooks. The cover image prompt should describe a \
     single appetizing photograph of the finished dish.";

/// Render the per-recipe detail prompt.
pub fn render_recipe_details_prompt(recipe_name: &str, cuisine: &str) -> String {
    format!(
        "Write the full recipe for \"{recipe_name}\" ({cuisine} cuisine): a short \
         description, the ingredient list with quantities, step-by-step \
         instructions as markdown, and a prompt for generating a cover image."
    )
}
