//! Error types for preparing declarations.

use render::RenderError;
use thiserror::Error;

/// Result type alias for prepare operations.
pub type Result<T> = std::result::Result<T, PrepareError>;

/// Errors raised while turning a declaration into typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrepareError {
    /// A required field was not declared.
    #[error("{0:?} is required")]
    Required(String),

    /// More than one field of a mutually exclusive set was declared.
    #[error("only one of {} can be set", quote_alternatives(.0))]
    Exclusive(Vec<String>),

    /// A declared key matches no field.
    #[error("{}", unknown_field_message(.name, .suggestions))]
    UnknownField {
        name: String,
        suggestions: Vec<String>,
    },

    /// The raw value has the wrong shape for the field.
    #[error("{name}: cannot convert {raw} to {kind}")]
    Conversion {
        name: String,
        raw: String,
        kind: String,
    },

    /// A numeric value does not fit the field.
    #[error("{name}: {raw} is out of range for {kind}")]
    OutOfRange {
        name: String,
        raw: String,
        kind: String,
    },

    /// The value is not one of the enumerated alternatives.
    #[error("{name}: {value:?} must be one of {}", quote_alternatives(.allowed))]
    InvalidValue {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Rendering a string failed.
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PrepareError {
    pub(crate) fn conversion(name: &str, raw: impl ToString, kind: impl Into<String>) -> Self {
        Self::Conversion {
            name: name.to_string(),
            raw: raw.to_string(),
            kind: kind.into(),
        }
    }

    pub(crate) fn out_of_range(name: &str, raw: impl ToString, kind: impl Into<String>) -> Self {
        Self::OutOfRange {
            name: name.to_string(),
            raw: raw.to_string(),
            kind: kind.into(),
        }
    }

    /// The field the error was raised for, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Required(name)
            | Self::UnknownField { name, .. }
            | Self::Conversion { name, .. }
            | Self::OutOfRange { name, .. }
            | Self::InvalidValue { name, .. } => Some(name),
            Self::Render(err) => Some(err.location()),
            Self::Exclusive(_) => None,
        }
    }
}

/// `"a"`, `"a" or "b"`, `"a", "b" or "c"`
fn quote_alternatives(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("{n:?}")).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {last}", rest.join(", ")),
    }
}

fn unknown_field_message(name: &str, suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        format!("unknown field {name:?}")
    } else {
        format!(
            "unknown field {name:?}, did you mean {}?",
            quote_alternatives(suggestions)
        )
    }
}
