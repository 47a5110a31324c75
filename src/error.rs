use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used across the whole crate.
pub type Result<T> = std::result::Result<T, RameErr>;

/// The update engine's error type.
///
/// Every variant aborts the update call that raised it. Assignments already
/// performed during that call are not rolled back.
#[derive(Debug)]
pub enum RameErr {
    /// A parameter, its gradient or its constrained value disagrees with the recorded shape.
    ShapeMismatch {
        index: usize,
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// The host could not supply a gradient for a trainable parameter.
    MissingGradient { index: usize },
    /// The amount of parameters (or restored weights) differs from the registered set.
    CountMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// An update was requested over an empty parameter list.
    NoParameters,
    /// A configuration record couldn't be (de)serialized.
    Serde(serde_json::Error),
}

impl Display for RameErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RameErr::ShapeMismatch {
                index,
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for the {what} of parameter {index}: got {got:?}, expected {expected:?}"
            ),
            RameErr::MissingGradient { index } => {
                write!(f, "no gradient was supplied for parameter {index}")
            }
            RameErr::CountMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} count mismatch: got {got}, expected {expected}"),
            RameErr::NoParameters => f.write_str("tried to update an empty parameter list"),
            RameErr::Serde(e) => write!(f, "config serialization error: {e}"),
        }
    }
}

impl Error for RameErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RameErr::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RameErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_names_the_offending_side() {
        let err = RameErr::ShapeMismatch {
            index: 2,
            what: "gradient",
            got: vec![3],
            expected: vec![2, 2],
        };

        assert_eq!(
            err.to_string(),
            "shape mismatch for the gradient of parameter 2: got [3], expected [2, 2]"
        );
    }

    #[test]
    fn serde_errors_keep_their_source() {
        let inner = serde_json::from_str::<f32>("nope").unwrap_err();
        let err = RameErr::from(inner);

        assert!(err.source().is_some());
        assert!(RameErr::NoParameters.source().is_none());
    }
}
