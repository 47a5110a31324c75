mod binding;
mod parameter;

pub(crate) use binding::ParameterBinding;
pub use parameter::{Constraint, Parameter};
