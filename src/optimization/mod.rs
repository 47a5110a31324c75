mod optimizer;
mod rame;

pub use optimizer::Optimizer;
pub use rame::{OptimizerWeights, Rame};
