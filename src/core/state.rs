//! Core State trait for observable run phases.
//!
//! Phases are derived values: they describe where a recipe run currently is,
//! computed from persisted facts rather than stored themselves.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for state-machine phases.
///
/// All methods are pure. A phase is an immutable value describing the
/// current position of a run.
///
/// # Example
///
/// ```rust
/// use leaven::core::State;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// enum Proof {
///     Resting,
///     Rising(usize),
///     Baked,
/// }
///
/// impl State for Proof {
///     fn name(&self) -> &str {
///         match self {
///             Self::Resting => "Resting",
///             Self::Rising(_) => "Rising",
///             Self::Baked => "Baked",
///         }
///     }
///
///     fn is_final(&self) -> bool {
///         matches!(self, Self::Baked)
///     }
/// }
///
/// assert!(Proof::Baked.is_final());
/// assert_eq!(Proof::Rising(2).step_index(), None);
/// ```
pub trait State:
    Clone + PartialEq + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync
{
    /// Phase name for display and logging.
    fn name(&self) -> &str;

    /// Check if this is a terminal phase.
    ///
    /// Default implementation returns `false`.
    fn is_final(&self) -> bool {
        false
    }

    /// Index of the step this phase refers to, if any.
    ///
    /// Default implementation returns `None`.
    fn step_index(&self) -> Option<usize> {
        None
    }
}
