use log::{debug, trace};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, CowArray, IxDyn, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::{
    RameErr, Result,
    config::RameConfig,
    objective::Objective,
    storage::{Parameter, ParameterBinding},
};

/// The optimizer's own state, as the host checkpoints it.
///
/// The iteration counter followed by one velocity accumulator per parameter,
/// in the parameters' order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerWeights {
    pub iterations: u64,
    pub moments: Vec<ArrayD<f32>>,
}

/// Rapidly adapting moment estimation.
///
/// Momentum gradient descent whose steps are flattened by a `quantum`
/// exponent: every element moves by `sign(v) * |v|^(1 - quantum)` where `v`
/// is its velocity. A `quantum` of `0` is plain momentum SGD.
#[derive(Debug)]
pub struct Rame {
    name: String,
    iterations: u64,
    learning_rate: f32,
    momentum: f32,
    quantum: f32,
    decay: f32,
    bindings: Vec<ParameterBinding>,
}

impl Default for Rame {
    fn default() -> Self {
        Self::from_config(RameConfig::default())
    }
}

impl Rame {
    /// Creates a new `Rame` optimizer.
    ///
    /// The hyperparameters aren't validated, out of range values are taken as given.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The fraction of the previous velocity kept on every step.
    /// * `quantum` - The exponent flattening the step magnitude, meant to lie in `[0, 1)`.
    /// * `decay` - Learning rate decay over each update, `0` disables it.
    ///
    /// # Returns
    /// A new `Rame` instance.
    pub fn new(learning_rate: f32, momentum: f32, quantum: f32, decay: f32) -> Self {
        Self::from_config(RameConfig::new(learning_rate, momentum, quantum, decay))
    }

    /// Creates a new `Rame` optimizer from an exported configuration.
    ///
    /// # Arguments
    /// * `config` - A configuration, usually read back from a checkpoint.
    ///
    /// # Returns
    /// A new `Rame` instance with no parameters bound yet.
    pub fn from_config(config: RameConfig) -> Self {
        let RameConfig {
            name,
            learning_rate,
            momentum,
            quantum,
            decay,
        } = config;

        Self {
            name,
            iterations: 0,
            learning_rate,
            momentum,
            quantum,
            decay,
            bindings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Overrides the base learning rate, decay keeps applying on top of it.
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn quantum(&self) -> f32 {
        self.quantum
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// The learning rate after decay, for the current iteration counter.
    pub fn effective_learning_rate(&self) -> f32 {
        if self.decay > 0. {
            self.learning_rate / (1. + self.decay * self.iterations as f32)
        } else {
            self.learning_rate
        }
    }

    /// Snapshots the iteration counter and every velocity accumulator.
    pub fn weights(&self) -> OptimizerWeights {
        OptimizerWeights {
            iterations: self.iterations,
            moments: self
                .bindings
                .iter()
                .filter(|b| b.is_registered())
                .map(|b| b.velocity().clone())
                .collect(),
        }
    }

    /// Restores a snapshot taken with `weights`.
    ///
    /// An optimizer that never ran adopts the snapshot's shapes, otherwise
    /// they must match the already recorded ones.
    ///
    /// # Arguments
    /// * `weights` - The state to restore.
    ///
    /// # Returns
    /// A `CountMismatch` or `ShapeMismatch` error if the snapshot doesn't fit.
    pub fn set_weights(&mut self, weights: OptimizerWeights) -> Result<()> {
        let OptimizerWeights {
            iterations,
            moments,
        } = weights;

        if self.bindings.is_empty() {
            self.bindings = moments
                .iter()
                .map(|_| ParameterBinding::unregistered())
                .collect();
        } else if self.bindings.len() != moments.len() {
            return Err(RameErr::CountMismatch {
                what: "velocity",
                got: moments.len(),
                expected: self.bindings.len(),
            });
        }

        for (index, (binding, moment)) in self.bindings.iter().zip(&moments).enumerate() {
            if binding.is_registered() && binding.shape() != moment.shape() {
                return Err(RameErr::ShapeMismatch {
                    index,
                    what: "velocity",
                    got: moment.shape().to_vec(),
                    expected: binding.shape().to_vec(),
                });
            }
        }

        for (binding, moment) in self.bindings.iter_mut().zip(moments) {
            binding.restore(moment);
        }

        self.iterations = iterations;
        debug!(iterations = iterations, slots = self.bindings.len(); "restored optimizer weights");
        Ok(())
    }

    /// Registers the velocity accumulators of any parameter seen for the first time.
    ///
    /// # Returns
    /// A `CountMismatch` error if the parameter list differs in length from the bound one.
    fn bind(&mut self, params: &[Parameter]) -> Result<()> {
        if self.bindings.is_empty() {
            self.bindings = params
                .iter()
                .map(|_| ParameterBinding::unregistered())
                .collect();
        } else if self.bindings.len() != params.len() {
            return Err(RameErr::CountMismatch {
                what: "parameter",
                got: params.len(),
                expected: self.bindings.len(),
            });
        }

        let mut registered = 0;

        for (binding, param) in self.bindings.iter_mut().zip(params) {
            if !binding.is_registered() {
                binding.register(param.shape());
                registered += 1;
            }
        }

        if registered > 0 {
            debug!(iteration = self.iterations; "registered {registered} parameter bindings");
        }

        Ok(())
    }

    /// Fetches every gradient and checks every shape before anything is written.
    ///
    /// # Returns
    /// The gradients in parameter order, or the first `MissingGradient`/`ShapeMismatch` found.
    fn gather<'o, O>(
        &self,
        objective: &'o O,
        params: &[Parameter],
    ) -> Result<Vec<CowArray<'o, f32, IxDyn>>>
    where
        O: Objective + ?Sized,
    {
        self.bindings
            .iter()
            .zip(params)
            .enumerate()
            .map(|(index, (binding, param))| {
                if param.shape() != binding.shape() {
                    return Err(RameErr::ShapeMismatch {
                        index,
                        what: "parameter",
                        got: param.shape().to_vec(),
                        expected: binding.shape().to_vec(),
                    });
                }

                let grad = objective
                    .gradient(index, param)
                    .ok_or(RameErr::MissingGradient { index })?;

                if grad.shape() != param.shape() {
                    return Err(RameErr::ShapeMismatch {
                        index,
                        what: "gradient",
                        got: grad.shape().to_vec(),
                        expected: param.shape().to_vec(),
                    });
                }

                Ok(grad)
            })
            .collect()
    }
}

impl Optimizer for Rame {
    type Config = RameConfig;

    fn apply_update<O>(&mut self, objective: &O, params: &mut [Parameter]) -> Result<()>
    where
        O: Objective + ?Sized,
    {
        if params.is_empty() {
            return Err(RameErr::NoParameters);
        }

        self.iterations += 1;
        let lr = self.effective_learning_rate();
        trace!(iteration = self.iterations, lr = lr; "applying update");

        self.bind(params)?;
        let grads = self.gather(objective, params)?;

        let rule = Rule {
            lr,
            momentum: self.momentum,
            exponent: 1. - self.quantum,
        };

        params
            .par_iter_mut()
            .zip(grads.into_par_iter())
            .zip(self.bindings.par_iter_mut())
            .enumerate()
            .try_for_each(|(index, ((param, grad), binding))| {
                rule.update_param(index, param, grad.view(), binding.velocity_mut())
            })
    }

    fn export_config(&self) -> RameConfig {
        RameConfig {
            name: self.name.clone(),
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            quantum: self.quantum,
            decay: self.decay,
        }
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}

/// Tensors with at least this many elements are also split across threads internally.
const PARALLEL_LEN: usize = 1 << 14;

/// The scalars of a single update step, shared by every parameter.
#[derive(Debug, Clone, Copy)]
struct Rule {
    lr: f32,
    momentum: f32,
    exponent: f32,
}

impl Rule {
    /// Moves a parameter and its velocity one step, then applies the parameter's constraint.
    ///
    /// # Returns
    /// A `ShapeMismatch` error if the constraint changed the parameter's shape.
    fn update_param(
        &self,
        index: usize,
        param: &mut Parameter,
        grad: ArrayViewD<'_, f32>,
        velocity: &mut ArrayD<f32>,
    ) -> Result<()> {
        let Some(constraint) = param.constraint() else {
            self.step(param.value_mut(), grad, velocity);
            return Ok(());
        };

        let mut new_value = param.value().to_owned();
        self.step(new_value.view_mut(), grad, velocity);
        let new_value = constraint.apply(new_value);

        if new_value.shape() != param.shape() {
            return Err(RameErr::ShapeMismatch {
                index,
                what: "constraint",
                got: new_value.shape().to_vec(),
                expected: param.shape().to_vec(),
            });
        }

        param.assign(new_value);
        Ok(())
    }

    /// Elementwise `v <- momentum * v + lr * g` followed by `p <- p - sign(v) * |v|^exponent`.
    fn step(
        &self,
        values: ArrayViewMutD<'_, f32>,
        grad: ArrayViewD<'_, f32>,
        velocity: &mut ArrayD<f32>,
    ) {
        let Self {
            lr,
            momentum: mu,
            exponent,
        } = *self;

        let len = values.len();
        let zip = Zip::from(values).and(velocity).and(&grad);
        let update = |p: &mut f32, v: &mut f32, g: &f32| {
            *v = mu * *v + lr * g;
            *p -= quantized(*v, exponent);
        };

        if len >= PARALLEL_LEN {
            zip.par_for_each(update);
        } else {
            zip.for_each(update);
        }
    }
}

/// `sign(v) * |v|^exponent`, where a null velocity never moves the parameter.
///
/// Unlike a literal `sign(v) * pow(|v|, exponent)`, this stays `0` for `v == 0` even when
/// `exponent <= 0`, instead of producing `0 * inf = NaN`.
fn quantized(v: f32, exponent: f32) -> f32 {
    if v == 0. {
        return 0.;
    }

    v.signum() * v.abs().powf(exponent)
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    fn dyn1(xs: &[f32]) -> ArrayD<f32> {
        arr1(xs).into_dyn()
    }

    fn assert_close(got: f32, expected: f32) {
        assert!((got - expected).abs() < 1e-5, "got {got}, expected {expected}");
    }

    #[test]
    fn test_quantized_step() {
        assert_eq!(quantized(0., 0.75), 0.);
        assert_eq!(quantized(-0., 0.75), 0.);
        assert_close(quantized(0.4, 0.75), 0.502973);
        assert_close(quantized(-0.4, 0.75), -0.502973);
        assert_eq!(quantized(2.5, 1.), 2.5);
    }

    #[test]
    fn test_null_velocity_is_still_for_any_quantum() {
        assert_eq!(quantized(0., 0.), 0.);
        assert_eq!(quantized(0., -1.), 0.);
    }

    #[test]
    fn test_quantum_above_one_is_accepted() {
        // 1 - 1.5 = -0.5, steps grow as the velocity shrinks
        assert_close(quantized(0.25, -0.5), 2.);
    }

    #[test]
    fn test_large_tensors_match_the_elementwise_rule() {
        let len = PARALLEL_LEN * 2 + 3;
        let rule = Rule {
            lr: 0.1,
            momentum: 0.9,
            exponent: 0.75,
        };
        let grad = ArrayD::from_shape_fn(IxDyn(&[len]), |i| (i[0] % 7) as f32 - 3.);
        let mut values = ArrayD::from_elem(IxDyn(&[len]), 1.);
        let mut velocity = ArrayD::from_elem(IxDyn(&[len]), 0.5);

        rule.step(values.view_mut(), grad.view(), &mut velocity);

        for ((p, v), g) in values.iter().zip(&velocity).zip(&grad) {
            let expected_v = 0.9 * 0.5 + 0.1 * g;
            assert_close(*v, expected_v);
            assert_close(*p, 1. - quantized(expected_v, 0.75));
        }
    }

    #[test]
    fn test_effective_learning_rate_without_decay() {
        let mut rame = Rame::new(0.1, 0.9, 0.25, 0.);
        rame.iterations = 1000;

        assert_eq!(rame.effective_learning_rate(), 0.1);
    }

    #[test]
    fn test_effective_learning_rate_with_decay() {
        let mut rame = Rame::new(0.1, 0.9, 0.25, 0.5);
        rame.iterations = 2;

        assert_close(rame.effective_learning_rate(), 0.05);
    }

    #[test]
    fn test_decay_uses_incremented_counter() {
        let mut rame = Rame::new(1., 0., 0., 1.);
        let mut params = [Parameter::new(dyn1(&[0.]))];
        let grads = [dyn1(&[1.])];

        rame.apply_update(&grads[..], &mut params).unwrap();

        // lr / (1 + 1 * 1)
        assert_close(params[0].value().sum(), -0.5);
    }

    #[test]
    fn test_bindings_are_lazy() {
        let mut rame = Rame::default();
        assert!(rame.bindings.is_empty());
        assert!(rame.weights().moments.is_empty());

        let mut params = [
            Parameter::new(ArrayD::from_elem(IxDyn(&[2, 2]), 1.)),
            Parameter::new(dyn1(&[1.])),
        ];
        let grads = [ArrayD::zeros(IxDyn(&[2, 2])), dyn1(&[0.])];

        rame.apply_update(&grads[..], &mut params).unwrap();

        assert_eq!(rame.bindings.len(), 2);
        assert!(rame.bindings.iter().all(|b| b.is_registered()));
        assert_eq!(rame.bindings[0].shape(), &[2, 2]);
        assert_eq!(rame.bindings[1].shape(), &[1]);
    }

    #[test]
    fn test_velocity_is_persisted() {
        let mut rame = Rame::new(0.1, 0.5, 0., 0.);
        let mut params = [Parameter::new(dyn1(&[0., 0.]))];
        let grads = [dyn1(&[1., -2.])];

        rame.apply_update(&grads[..], &mut params).unwrap();
        rame.apply_update(&grads[..], &mut params).unwrap();

        let v = rame.bindings[0].velocity().as_slice().unwrap();
        assert_close(v[0], 0.15);
        assert_close(v[1], -0.3);
    }

    #[test]
    fn test_empty_parameter_list_is_rejected() {
        let mut rame = Rame::default();
        let grads: [ArrayD<f32>; 0] = [];

        let mut params: [Parameter; 0] = [];

        let res = rame.apply_update(&grads[..], &mut params);

        assert!(matches!(res, Err(RameErr::NoParameters)));
        assert_eq!(rame.iterations(), 0);
    }

    #[test]
    fn test_parameter_count_is_fixed() {
        let mut rame = Rame::default();
        let grads = [dyn1(&[1.]), dyn1(&[1.])];
        let mut params = vec![
            Parameter::new(dyn1(&[1.])),
            Parameter::new(dyn1(&[1.])),
        ];

        rame.apply_update(&grads[..], &mut params).unwrap();
        params.pop();
        let res = rame.apply_update(&grads[..], &mut params);

        assert!(matches!(
            res,
            Err(RameErr::CountMismatch {
                what: "parameter",
                got: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_constraint_changing_shape_is_rejected() {
        let mut rame = Rame::default();
        let mut params = [Parameter::new(dyn1(&[1., 2.]))
            .with_constraint(|v: ArrayD<f32>| dyn1(&[v.sum()]))];
        let grads = [dyn1(&[1., 1.])];

        let res = rame.apply_update(&grads[..], &mut params);

        assert!(matches!(
            res,
            Err(RameErr::ShapeMismatch {
                index: 0,
                what: "constraint",
                ..
            })
        ));
        assert_eq!(params[0].value(), dyn1(&[1., 2.]));
    }

    #[test]
    fn test_set_weights_checks_recorded_shapes() {
        let mut rame = Rame::default();
        let mut params = [Parameter::new(dyn1(&[1., 2.]))];
        let grads = [dyn1(&[1., 1.])];
        rame.apply_update(&grads[..], &mut params).unwrap();

        let res = rame.set_weights(OptimizerWeights {
            iterations: 7,
            moments: vec![dyn1(&[0., 0., 0.])],
        });

        assert!(matches!(
            res,
            Err(RameErr::ShapeMismatch {
                what: "velocity",
                ..
            })
        ));
        assert_eq!(rame.iterations(), 1);

        let res = rame.set_weights(OptimizerWeights {
            iterations: 7,
            moments: vec![],
        });

        assert!(matches!(res, Err(RameErr::CountMismatch { .. })));
    }
}
