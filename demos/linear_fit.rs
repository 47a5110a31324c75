//! Fits `y = w . x + b` on synthetic data with a `Rame` optimizer.
//!
//! Run with `RUST_LOG=info cargo run --example linear_fit`.

use std::error::Error;

use log::info;
use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn, ShapeError};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rame::{Optimizer, Parameter, Rame};

const SAMPLES: usize = 256;
const STEPS: usize = 300;
const TRUE_WEIGHTS: [f32; 2] = [2.5, -1.5];
const TRUE_BIAS: f32 = 0.7;

fn dataset(rng: &mut StdRng) -> (Array2<f32>, Array1<f32>) {
    let x = Array2::from_shape_fn((SAMPLES, 2), |_| rng.random_range(-1.0..1.0));
    let noise = Array1::from_shape_fn(SAMPLES, |_| rng.random_range(-0.05..0.05));
    let y = x.dot(&Array1::from(TRUE_WEIGHTS.to_vec())) + TRUE_BIAS + noise;
    (x, y)
}

/// Mean squared error and its gradients with respect to the weights and the bias.
fn mse(
    params: &[Parameter],
    x: &Array2<f32>,
    y: &Array1<f32>,
) -> Result<(f32, Vec<ArrayD<f32>>), ShapeError> {
    let w: Array1<f32> = params[0].value().to_owned().into_dimensionality()?;
    let b = params[1].value().sum();

    let residual = x.dot(&w) + b - y;
    let n = SAMPLES as f32;

    let loss = residual.mapv(|r| r * r).sum() / n;
    let grad_w = x.t().dot(&residual) * (2. / n);
    let grad_b = residual.sum_axis(Axis(0)) * (2. / n);

    Ok((loss, vec![grad_w.into_dyn(), grad_b.into_dyn()]))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(42);
    let (x, y) = dataset(&mut rng);

    let mut params = [
        Parameter::new(ArrayD::zeros(IxDyn(&[2]))),
        Parameter::new(ArrayD::zeros(IxDyn(&[])))
            .with_constraint(|b: ArrayD<f32>| b.mapv(|v| v.clamp(-5., 5.))),
    ];

    let mut optimizer = Rame::new(0.05, 0.9, 0.25, 0.001);
    info!("training with {:?}", optimizer.export_config().to_map());

    for step in 0..STEPS {
        let (loss, grads) = mse(&params, &x, &y)?;
        optimizer.apply_update(&grads[..], &mut params)?;

        if step % 50 == 0 {
            info!(step = step, lr = optimizer.effective_learning_rate(); "loss {loss:.6}");
        }
    }

    let (loss, _) = mse(&params, &x, &y)?;
    info!(
        "finished after {} steps: loss={loss:.6} w={} b={}",
        optimizer.iterations(),
        params[0].value(),
        params[1].value()
    );

    Ok(())
}
