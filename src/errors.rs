use thiserror::Error;

use crate::codec::CodecError;

/// Syntax error in the expression source, with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self { message: message.into(), offset }
    }
}

/// Failures raised by the expression itself while it runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("value error: {0}")]
    Value(String),

    #[error("index out of range: {0}")]
    Index(String),

    #[error("key not found: {0}")]
    Key(String),

    #[error("'{type_name}' object has no attribute '{attr}'")]
    Attribute { type_name: &'static str, attr: String },

    #[error("division by zero")]
    ZeroDivision,

    #[error("integer overflow")]
    Overflow,

    #[error("maximum recursion depth exceeded")]
    Recursion,
}

/// Coarse classification of an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Parse,
    Codec,
    Evaluation,
    Io,
}

#[derive(Debug, Error)]
pub enum EvalError {
    /// Free identifiers span more than one variable group. Raised before any input is read.
    #[error("abort: {0}")]
    Abort(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure raised while handling the `index`-th line (1-based).
    #[error("line {index}: {source}")]
    Iteration {
        index: usize,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Abort(_) => ErrorKind::Configuration,
            EvalError::Parse(_) => ErrorKind::Parse,
            EvalError::Codec(_) => ErrorKind::Codec,
            EvalError::Runtime(_) => ErrorKind::Evaluation,
            EvalError::Io(_) => ErrorKind::Io,
            EvalError::Iteration { source, .. } => source.kind(),
        }
    }

    /// Attach the line number a failure happened on.
    pub fn at_iteration(self, index: usize) -> Self {
        EvalError::Iteration { index, source: Box::new(self) }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn iteration_keeps_inner_kind() {
        let err = EvalError::from(RuntimeError::ZeroDivision).at_iteration(3);
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert_eq!(err.to_string(), "line 3: runtime error: division by zero");
    }

    #[test]
    fn parse_error_message() {
        let err = EvalError::from(ParseError::new("unexpected ')'", 4));
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.to_string(), "parse error: unexpected ')' at offset 4");
    }
}
