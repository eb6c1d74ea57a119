#[derive(Debug, thiserror::Error)]
pub enum EvoError {
    /// Returned when an operator or data-model invariant is violated by a
    /// configuration value (negative set size, bad ratio, ...). Carries the
    /// raising type's name so the surrounding tool can surface it.
    #[error("domain error in {class}: {message}")]
    Domain {
        /// Name of the type that raised the error.
        class: &'static str,
        /// Human-readable description of the violation.
        message: String,
    },

    /// Returned when an operation is applied to an element type that does
    /// not support it, or a type name cannot be parsed.
    #[error("unrecognised element type in {class}: {message}")]
    UnrecognisedType {
        /// Name of the type that raised the error.
        class: &'static str,
        /// Description of the offending operation or name.
        message: String,
    },

    /// Returned when decision or objective vectors do not match the
    /// problem's declared sizes.
    #[error("incorrect problem format: expected {expected} values, got {got}")]
    IncorrectProblemFormat {
        /// The size declared by the problem.
        expected: usize,
        /// The size actually supplied.
        got: usize,
    },

    /// Returned when a batch evaluation yields a different number of
    /// results than inputs.
    #[error("batch evaluation count mismatch: {expected} inputs, {got} outputs")]
    BatchEvalCount {
        /// Number of decision vectors submitted.
        expected: usize,
        /// Number of evaluations returned.
        got: usize,
    },

    /// Returned by property reflection when a name is not exposed by the
    /// operator, or the supplied value has the wrong variant.
    #[error("unknown or incompatible property '{name}' on {class}")]
    UnknownProperty {
        /// Name of the operator type.
        class: &'static str,
        /// The property name that failed to resolve.
        name: String,
    },

    /// Returned by the driver when `general.algo` names no known chain.
    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// Returned when an algorithm is built with no operators.
    #[error("algorithm pipeline is empty")]
    EmptyPipeline,

    /// Returned when a configuration file cannot be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = core::result::Result<T, EvoError>;
