//! Status model returned by every check and apply
//!
//! A [`Status`] accumulates human-readable messages, per-field diffs and a
//! severity [`Level`]. The level only ever goes up.

use crate::diff::Diff;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a status, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    /// Nothing to do
    #[default]
    NoChange,
    /// A change might be needed, but the host state is in flux
    MayChange,
    /// Apply will change the host
    WillChange,
    /// A change is needed but the resource refuses to make it
    CantChange,
    /// The resource could not be evaluated
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoChange => "no change",
            Self::MayChange => "may change",
            Self::WillChange => "will change",
            Self::CantChange => "can't change",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// The result of a check or apply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    level: Level,
    messages: Vec<String>,
    differences: BTreeMap<String, Diff>,
    output: Option<String>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    /// A status already raised to `level`
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn add_message(&mut self, line: impl Into<String>) {
        self.messages.push(line.into());
    }

    /// Record a change to `field`
    pub fn add_difference(
        &mut self,
        field: impl Into<String>,
        original: impl Into<String>,
        current: impl Into<String>,
        default: Option<&str>,
    ) {
        let mut diff = Diff::new(original, current);
        diff.default = default.map(str::to_string);
        self.differences.insert(field.into(), diff);
    }

    /// Raise the level to `level` if it is higher than the current one
    pub fn raise_level(&mut self, level: Level) {
        self.level = self.level.max(level);
    }

    /// Raise to [`Level::WillChange`] when any diff is recorded
    pub fn raise_level_for_diffs(&mut self) {
        if !self.differences.is_empty() {
            self.raise_level(Level::WillChange);
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.differences.is_empty() || self.level >= Level::WillChange
    }

    pub fn status_code(&self) -> Level {
        self.level
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn diffs(&self) -> &BTreeMap<String, Diff> {
        &self.differences
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn set_output(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
    }

    /// Whether the level means the resource failed
    pub fn is_failure(&self) -> bool {
        self.level >= Level::CantChange
    }
}

/// Fold `child` into `parent`
///
/// Messages are concatenated, diffs merged with the parent winning on key
/// collisions and the level raised to the higher of the two.
pub fn append_status(child: Status, parent: &mut Status) {
    parent.messages.extend(child.messages);
    for (field, diff) in child.differences {
        parent.differences.entry(field).or_insert(diff);
    }
    parent.raise_level(child.level);
    if parent.output.is_none() {
        parent.output = child.output;
    }
}
