//! Error types for template rendering.

use thiserror::Error;

/// Result type alias for rendering operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors raised while parsing or evaluating a template.
///
/// Every variant carries the `location` (the field name being rendered) so
/// a failure can be traced back to the declaration that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The template could not be parsed.
    #[error("{location}: template syntax error at offset {offset}: {message}")]
    Syntax {
        location: String,
        offset: usize,
        message: String,
    },

    /// A `param` call named a parameter the module does not declare.
    #[error("{location}: unknown parameter: param.{name}")]
    UnknownParam { location: String, name: String },

    /// A `lookup` call named a field no sibling resource exports.
    #[error("{location}: unresolved lookup: {name}")]
    UnknownLookup { location: String, name: String },

    /// The template called a function outside the supported set.
    #[error("{location}: function {name:?} not defined")]
    UnknownFunction { location: String, name: String },

    /// A function was called with the wrong number or type of arguments.
    #[error("{location}: {function}: {message}")]
    Arguments {
        location: String,
        function: String,
        message: String,
    },
}

impl RenderError {
    /// The field name the error was raised for.
    pub fn location(&self) -> &str {
        match self {
            Self::Syntax { location, .. }
            | Self::UnknownParam { location, .. }
            | Self::UnknownLookup { location, .. }
            | Self::UnknownFunction { location, .. }
            | Self::Arguments { location, .. } => location,
        }
    }
}
