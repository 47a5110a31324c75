//! Rapidly adapting moment estimation (RAME).
//!
//! A momentum gradient descent update rule whose per-element steps are
//! flattened by a fractional `quantum` exponent. The host framework owns the
//! parameters and computes the gradients, a `Rame` optimizer only keeps its
//! scalar state and one velocity accumulator per parameter.

pub mod config;
pub mod error;
pub mod objective;
pub mod optimization;
pub mod storage;

pub use config::RameConfig;
pub use error::{RameErr, Result};
pub use objective::Objective;
pub use optimization::{Optimizer, OptimizerWeights, Rame};
pub use storage::{Constraint, Parameter};
