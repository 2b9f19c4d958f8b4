//! Recipe build errors.

use thiserror::Error;

/// Errors that can occur when building a recipe.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("Recipe has no steps. Add at least one step with .step(..)")]
    EmptyRecipe,

    #[error("Step id must not be blank (step {index})")]
    BlankStepId { index: usize },

    #[error("Step id '{0}' is used more than once")]
    DuplicateStepId(String),

    #[error("Step '{0}' has a negative duration")]
    NegativeDuration(String),
}
