use thiserror::Error;

/// Main error type for Tunebox
#[derive(Error, Debug)]
pub enum TbError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Structural violations raised by the search engine.
///
/// None of these are retried: they indicate a caller or configuration bug.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Index {index} is out of range for parameter {parameter} (size {size})")]
    OutOfRange {
        parameter: String,
        index: usize,
        size: usize,
    },

    #[error("Unknown parameter: {parameter}")]
    UnknownParameter { parameter: String },

    #[error("Result delivered for {received}, but the candidate in flight is {expected}")]
    MismatchedParameters { expected: String, received: String },

    #[error("Search threads have not been set up")]
    NotSetUp,
}

/// Errors raised while turning a target definition into a parameter space.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("Parameter range {parameter} has no values")]
    EmptyRange { parameter: String },

    #[error("Parameter range {parameter} has an invalid step: {step}")]
    InvalidStep { parameter: String, step: f64 },

    #[error("Parameter range {parameter} would expand to {count} values (limit {limit})")]
    TooManyValues {
        parameter: String,
        count: f64,
        limit: usize,
    },

    #[error("Target {name} defines no parameters")]
    NoParameters { name: String },
}

/// Result type alias for Tunebox operations
pub type TbResult<T> = Result<T, TbError>;

/// Macro for creating invalid-argument errors
#[macro_export]
macro_rules! invalid_argument {
    ($($arg:tt)*) => {
        $crate::errors::SearchError::InvalidArgument {
            message: format!($($arg)*),
        }
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::TbError::Config(format!($($arg)*))
    };
}
