// Core Layer: Error Types
//
// One error enum for the whole crate: IR validation, execution,
// compilation, and the snapshot/restore codecs.

use thiserror::Error;

/// Error type for graph building, compilation and unit persistence
#[derive(Debug, Error)]
pub enum CodegenError {
    /// Graph structure is malformed (dangling input, bad arity, ...)
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Graph contains a dependency cycle
    #[error("graph contains a cycle")]
    Cycle,

    /// A graph input was not supplied at execution time
    #[error("missing input '{0}'")]
    MissingInput(String),

    /// Input vectors do not share a common length
    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// Operation cannot be lowered or executed
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// JIT backend failed to produce code
    #[error("compilation failed: {0}")]
    Compile(String),

    /// Internal consistency check failed (a bug, not bad input)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Encoded unit carries a tag this build cannot decode
    #[error("unsupported unit encoding '{0}'")]
    UnsupportedEncoding(String),

    /// Decoder produced a value that does not match the record's tag
    #[error("decoded unit '{name}' is not a {expected} unit")]
    DecodedTypeMismatch { name: String, expected: &'static str },

    /// Byte buffer is truncated or corrupt
    #[error("decode failed: {0}")]
    Decode(String),

    /// Value could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),

    /// Unit name is already used by a child this manager does not own
    #[error("child '{0}' already exists and is not a managed unit")]
    ChildNameCollision(String),

    /// A compiled unit is installed outside the registry and cannot be persisted
    #[error("child '{0}' is a compiled unit that is not registered")]
    UnmanagedCompiledChild(String),

    /// No child under this name
    #[error("unknown child '{0}'")]
    UnknownChild(String),

    /// Child exists but is not a generated unit
    #[error("child '{0}' is not a generated unit")]
    NotAUnit(String),

    /// Base-state collaborator rejected the state
    #[error("base state: {0}")]
    BaseState(String),

    /// Configuration value could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for CodegenError {
    fn from(err: bincode::Error) -> Self {
        CodegenError::Decode(err.to_string())
    }
}

/// Result type for graphgen operations
pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CodegenError::UnsupportedEncoding("bogus".to_string());
        assert_eq!(err.to_string(), "unsupported unit encoding 'bogus'");

        let err = CodegenError::DecodedTypeMismatch {
            name: "f".to_string(),
            expected: "symbolic",
        };
        assert_eq!(err.to_string(), "decoded unit 'f' is not a symbolic unit");
    }

    #[test]
    fn test_bincode_error_maps_to_decode() {
        let err: bincode::Error = bincode::deserialize::<String>(&[0xff]).unwrap_err();
        assert!(matches!(CodegenError::from(err), CodegenError::Decode(_)));
    }
}
