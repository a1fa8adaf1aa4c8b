use std::fmt;

/// Errors raised by the simulation core. Configuration problems are fatal and
/// surface before any simulation runs; undefined statistics are represented as
/// `Option` values in the result series instead of being raised.
#[derive(Debug)]
pub enum EngineError {
    InsufficientData { required: usize, actual: usize },
    SingularRegression,
    InvalidConfiguration(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::InsufficientData { required, actual } => write!(
                f,
                "insufficient data: {} observations required, got {}",
                required, actual
            ),
            EngineError::SingularRegression => {
                write!(f, "singular regression: regressor has zero variance")
            }
            EngineError::InvalidConfiguration(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_error_kind() {
        let err = EngineError::InsufficientData {
            required: 2,
            actual: 1,
        };
        assert!(err.to_string().contains("insufficient data"));
        assert!(EngineError::SingularRegression
            .to_string()
            .contains("zero variance"));
    }
}
