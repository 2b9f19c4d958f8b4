//! Fluent builder for recipes.

use super::error::BuildError;
use super::{Recipe, RecipeId, Step, StepId};
use chrono::Duration;
use std::collections::BTreeSet;

/// Builder for constructing a [`Recipe`] with validated step ids.
pub struct RecipeBuilder {
    id: RecipeId,
    name: String,
    steps: Vec<Step>,
}

impl RecipeBuilder {
    pub fn new(id: RecipeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(
        mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        duration: Duration,
    ) -> Self {
        self.steps.push(Step {
            id: StepId::new(id),
            title: title.into(),
            duration,
        });
        self
    }

    /// Append several pre-built steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Build the recipe.
    /// Returns an error if there are no steps or step ids are invalid.
    pub fn build(self) -> Result<Recipe, BuildError> {
        if self.steps.is_empty() {
            return Err(BuildError::EmptyRecipe);
        }

        let mut seen = BTreeSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.as_str().trim().is_empty() {
                return Err(BuildError::BlankStepId { index });
            }
            if !seen.insert(step.id.as_str()) {
                return Err(BuildError::DuplicateStepId(step.id.to_string()));
            }
            if step.duration < Duration::zero() {
                return Err(BuildError::NegativeDuration(step.id.to_string()));
            }
        }

        Ok(Recipe {
            id: self.id,
            name: self.name,
            steps: self.steps,
        })
    }
}
