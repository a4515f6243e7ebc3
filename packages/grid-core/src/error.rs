//! Error types for host configuration and wire encoding.

/// Errors raised while validating host-supplied grid configuration or
/// encoding Query State for the wire.
///
/// These are programmer errors: a strict controller refuses to start with
/// them, a lenient one logs and drops the offending entry.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate column key: {key}")]
    DuplicateColumn { key: String },
    #[error("{context} references unknown column: {field}")]
    UnknownField { context: &'static str, field: String },
    #[error("page size must be greater than zero")]
    InvalidPageSize,
    #[error("failed to encode query parameter {param}: {message}")]
    Encode { param: &'static str, message: String },
}
