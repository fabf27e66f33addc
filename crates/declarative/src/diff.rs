//! Differences between observed and desired values

use serde::{Deserialize, Serialize};
use std::fmt;

/// A planned or completed change to one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// Value observed on the host
    pub original: String,
    /// Value the resource converges to
    pub current: String,
    /// Value used when the declaration left the attribute unset
    pub default: Option<String>,
}

impl Diff {
    pub fn new(original: impl Into<String>, current: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            current: current.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether applying this diff alters anything
    pub fn changes(&self) -> bool {
        self.original != self.current
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.original, self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_display_and_changes() {
        let diff = Diff::new("755", "644");
        assert_eq!(diff.to_string(), "755 => 644");
        assert!(diff.changes());
        assert!(!Diff::new("a", "a").changes());
        assert_eq!(
            Diff::new("", "x").with_default("y").default.as_deref(),
            Some("y")
        );
    }
}
