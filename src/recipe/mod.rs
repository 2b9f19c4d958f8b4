//! The slice of recipe data the scheduling core needs: ordered steps with
//! stable identifiers and wait durations.

mod builder;
pub mod error;

pub use builder::RecipeBuilder;
pub use error::BuildError;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a step.
///
/// Also used as the timer and notification key, so it must be unique across
/// everything sharing one timer store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of one recipe instance (one run of a recipe).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(String);

impl RecipeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random identifier for a fresh instance.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ordered unit of a recipe: manual work followed by a wait.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub title: String,
    /// Wait that begins once the manual work is completed. May be zero.
    pub duration: Duration,
}

impl Step {
    pub fn is_timed(&self) -> bool {
        self.duration > Duration::zero()
    }
}

/// A linear chain of steps belonging to one recipe instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Recipe {
    id: RecipeId,
    name: String,
    steps: Vec<Step>,
}

impl Recipe {
    /// Start building a recipe instance.
    ///
    /// # Example
    ///
    /// ```rust
    /// use leaven::recipe::Recipe;
    /// use chrono::Duration;
    ///
    /// let recipe = Recipe::builder("country-loaf", "Country loaf")
    ///     .step("mix", "Mix levain and flour", Duration::zero())
    ///     .step("bulk", "Bulk ferment", Duration::hours(4))
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(recipe.len(), 2);
    /// assert_eq!(recipe.index_of(&"bulk".into()), Some(1));
    /// ```
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> RecipeBuilder {
        RecipeBuilder::new(RecipeId::new(id), name)
    }

    pub fn id(&self) -> &RecipeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn index_of(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index_of(id).is_some()
    }
}
