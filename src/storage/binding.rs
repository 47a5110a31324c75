use ndarray::{ArrayD, IxDyn};

/// The engine's private state for a single parameter slot.
///
/// Bindings start unregistered and get their velocity accumulator on the
/// first update that sees the slot. From then on the recorded shape is fixed.
#[derive(Debug, Clone)]
pub(crate) struct ParameterBinding {
    registered: bool,
    velocity: ArrayD<f32>,
}

impl ParameterBinding {
    pub fn unregistered() -> Self {
        Self {
            registered: false,
            velocity: ArrayD::zeros(IxDyn(&[0])),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Allocates a zeroed velocity accumulator shaped like the parameter, unless already done.
    ///
    /// # Arguments
    /// * `shape` - The parameter's shape.
    pub fn register(&mut self, shape: &[usize]) {
        if self.registered {
            return;
        }

        self.velocity = ArrayD::zeros(IxDyn(shape));
        self.registered = true;
    }

    /// Replaces the accumulator with restored state, registering the slot if needed.
    pub fn restore(&mut self, velocity: ArrayD<f32>) {
        self.velocity = velocity;
        self.registered = true;
    }

    pub fn shape(&self) -> &[usize] {
        self.velocity.shape()
    }

    pub fn velocity(&self) -> &ArrayD<f32> {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.velocity
    }
}
