//! Errors produced while resolving types and generating code.
//!
//! There is exactly one user-facing error kind, a semantic error with the
//! position of the offending node. Anything else means the tree handed to the
//! core is inconsistent (a binder bug) and is reported as an internal error.

use colored::Colorize;
use thiserror::Error;

use crate::frontend::Position;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{position}: {kind}")]
    Semantic {
        position: Position,
        kind: SemanticErrorKind,
    },
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> Option<&SemanticErrorKind> {
        match self {
            Self::Semantic { kind, .. } => Some(kind),
            Self::Internal(_) => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Formats the error for the terminal the same way the driver reports
    /// scanner and parser errors
    pub fn render(&self) -> String {
        match self {
            Self::Semantic { position, kind } => format!(
                "{}: {}\n  {} {}",
                "error".red().bold(),
                kind.to_string().bold(),
                "-->".blue(),
                position
            ),
            Self::Internal(message) => format!(
                "{}: {}",
                "internal compiler error".red().bold(),
                message.bold()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticErrorKind {
    #[error("both operands of \"{operator}\" must be arithmetic: got \"{left}\" and \"{right}\"")]
    ArithmeticOperands {
        operator: String,
        left: String,
        right: String,
    },
    #[error("operations with pointers and floats forbidden: got \"{left}\" and \"{right}\"")]
    NoCommonType { left: String, right: String },
    #[error("both operands of \"{operator}\" must be integer: got \"{left}\" and \"{right}\"")]
    IntegerOperands {
        operator: String,
        left: String,
        right: String,
    },
    #[error("incompatible types: got \"{actual}\", expected \"{expected}\"")]
    IncompatibleTypes { expected: String, actual: String },
    #[error("variable identifier expected")]
    NotAnLvalue,
    #[error("incompatible type for unary operator \"-\": got \"{actual}\", expected float or integer")]
    NegationOperand { actual: String },
    #[error("incompatible type for dereference operator: got \"{actual}\", expected pointer")]
    DereferenceOperand { actual: String },
    #[error("invalid operand for unary operator \"@\": must be lvalue")]
    AddressOfOperand,
    #[error("incompatible type for operator \"NOT\": got \"{actual}\", expected integer")]
    NotOperand { actual: String },
    #[error("left operand of [] must be an array: got \"{actual}\"")]
    NotAnArray { actual: String },
    #[error("index count and number of dimensions do not match: got {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("incompatible type for index no. {index}: got \"{actual}\", expected \"INTEGER\"")]
    NonIntegerIndex { index: usize, actual: String },
    #[error("can't write values of type \"{actual}\"")]
    Unwritable { actual: String },
    #[error("wrong number of parameters specified for call to \"{routine}\": got {actual}, expected {expected}")]
    ArgumentCount {
        routine: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid arg no. {index}: variable identifier expected")]
    ArgumentNotLvalue { index: usize },
    #[error("incompatible type for arg no. {index}: got \"{actual}\", expected \"{expected}\"")]
    ArgumentType {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("invalid arguments for EXIT")]
    ExitArguments,
    #[error("redefinition of symbol \"{name}\"")]
    Redefinition { name: String },
}

impl SemanticErrorKind {
    /// Attaches the position of the node which caused the error
    pub fn at(self, position: Position) -> Error {
        Error::Semantic {
            position,
            kind: self,
        }
    }
}
