use ndarray::{ArrayD, CowArray, IxDyn};

use crate::storage::Parameter;

/// The source of gradients for an update step.
///
/// The optimizer never differentiates anything itself, the host hands it an
/// `Objective` that knows the gradient of the current loss with respect to
/// every trainable parameter.
pub trait Objective {
    /// Fetches the gradient for a parameter.
    ///
    /// # Arguments
    /// * `index` - The position of the parameter in the update's ordered list.
    /// * `param` - The parameter itself, at its pre-update value.
    ///
    /// # Returns
    /// The gradient, shaped like the parameter, or `None` if it can't be computed.
    fn gradient(&self, index: usize, param: &Parameter) -> Option<CowArray<'_, f32, IxDyn>>;
}

/// Precomputed gradients, one per parameter and in the same order.
impl Objective for [ArrayD<f32>] {
    fn gradient(&self, index: usize, _: &Parameter) -> Option<CowArray<'_, f32, IxDyn>> {
        self.get(index).map(|g| CowArray::from(g.view()))
    }
}

/// Precomputed gradients where some parameters may lack one.
impl Objective for [Option<ArrayD<f32>>] {
    fn gradient(&self, index: usize, _: &Parameter) -> Option<CowArray<'_, f32, IxDyn>> {
        self.get(index)?.as_ref().map(|g| CowArray::from(g.view()))
    }
}
