use serde::Serialize;

use crate::{Result, objective::Objective, storage::Parameter};

/// Defines the strategy for updating model parameters based on calculated gradients.
///
/// Hosts drive an `Optimizer` once per training step and keep ownership of the
/// parameters, the optimizer only owns its own per-parameter state.
pub trait Optimizer {
    /// The serializable record returned by `export_config`.
    type Config: Serialize;

    /// Advances every parameter one step using the gradients the objective supplies.
    ///
    /// # Arguments
    /// * `objective` - The gradient source for the current loss.
    /// * `params` - The ordered trainable parameters, the same set on every call.
    ///
    /// # Returns
    /// An error if a gradient is missing or any shape disagrees with the recorded one.
    fn apply_update<O>(&mut self, objective: &O, params: &mut [Parameter]) -> Result<()>
    where
        O: Objective + ?Sized;

    /// Snapshots the optimizer's hyperparameters.
    fn export_config(&self) -> Self::Config;

    /// The amount of update calls performed so far.
    fn iterations(&self) -> u64;
}
