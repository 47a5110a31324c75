use std::fmt;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};

/// A projection applied to a parameter right after it's updated.
pub trait Constraint: Send + Sync {
    /// Maps the freshly updated value into the allowed region.
    ///
    /// # Arguments
    /// * `value` - The unconstrained new value of the parameter.
    ///
    /// # Returns
    /// The value to store, it must keep the parameter's shape.
    fn apply(&self, value: ArrayD<f32>) -> ArrayD<f32>;
}

impl<F> Constraint for F
where
    F: Fn(ArrayD<f32>) -> ArrayD<f32> + Send + Sync,
{
    fn apply(&self, value: ArrayD<f32>) -> ArrayD<f32> {
        self(value)
    }
}

/// A trainable parameter owned by the host.
///
/// The optimizer only borrows it for the length of an update call.
pub struct Parameter {
    value: ArrayD<f32>,
    constraint: Option<Box<dyn Constraint>>,
}

impl Parameter {
    /// Creates a new unconstrained `Parameter`.
    ///
    /// # Arguments
    /// * `value` - The initial value, of any dimensionality.
    ///
    /// # Returns
    /// A new `Parameter` instance.
    pub fn new(value: ArrayD<f32>) -> Self {
        Self {
            value,
            constraint: None,
        }
    }

    /// Attaches a constraint to this parameter.
    ///
    /// # Arguments
    /// * `constraint` - The projection applied after every update.
    ///
    /// # Returns
    /// The constrained `Parameter`.
    pub fn with_constraint<C>(mut self, constraint: C) -> Self
    where
        C: Constraint + 'static,
    {
        self.constraint = Some(Box::new(constraint));
        self
    }

    pub fn value(&self) -> ArrayViewD<'_, f32> {
        self.value.view()
    }

    pub fn value_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.value.view_mut()
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn constraint(&self) -> Option<&dyn Constraint> {
        self.constraint.as_deref()
    }

    pub fn into_value(self) -> ArrayD<f32> {
        self.value
    }

    /// Replaces the stored value.
    pub(crate) fn assign(&mut self, value: ArrayD<f32>) {
        self.value = value;
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("value", &self.value)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}
