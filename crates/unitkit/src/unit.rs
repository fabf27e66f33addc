//! Loaded units and their properties

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of unit, from the name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Service,
    Socket,
    Device,
    Mount,
    Automount,
    Swap,
    Target,
    Snapshot,
    Path,
    Timer,
    Slice,
    Scope,
    Unknown,
}

impl UnitType {
    pub fn from_name(name: &str) -> Self {
        match name.rsplit_once('.').map(|(_, suffix)| suffix) {
            Some("service") => Self::Service,
            Some("socket") => Self::Socket,
            Some("device") => Self::Device,
            Some("mount") => Self::Mount,
            Some("automount") => Self::Automount,
            Some("swap") => Self::Swap,
            Some("target") => Self::Target,
            Some("snapshot") => Self::Snapshot,
            Some("path") => Self::Path,
            Some("timer") => Self::Timer,
            Some("slice") => Self::Slice,
            Some("scope") => Self::Scope,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Socket => "socket",
            Self::Device => "device",
            Self::Mount => "mount",
            Self::Automount => "automount",
            Self::Swap => "swap",
            Self::Target => "target",
            Self::Snapshot => "snapshot",
            Self::Path => "path",
            Self::Timer => "timer",
            Self::Slice => "slice",
            Self::Scope => "scope",
            Self::Unknown => "unknown",
        }
    }

    /// D-Bus interface carrying the type-specific properties
    pub fn interface(self) -> Option<&'static str> {
        match self {
            Self::Service => Some("org.freedesktop.systemd1.Service"),
            Self::Socket => Some("org.freedesktop.systemd1.Socket"),
            Self::Device => Some("org.freedesktop.systemd1.Device"),
            Self::Mount => Some("org.freedesktop.systemd1.Mount"),
            Self::Automount => Some("org.freedesktop.systemd1.Automount"),
            Self::Swap => Some("org.freedesktop.systemd1.Swap"),
            Self::Snapshot => Some("org.freedesktop.systemd1.Snapshot"),
            Self::Path => Some("org.freedesktop.systemd1.Path"),
            Self::Timer => Some("org.freedesktop.systemd1.Timer"),
            Self::Slice => Some("org.freedesktop.systemd1.Slice"),
            Self::Scope => Some("org.freedesktop.systemd1.Scope"),
            Self::Target | Self::Unknown => None,
        }
    }

    /// Whether the typed properties carry a `Result` field
    pub fn has_result(self) -> bool {
        matches!(
            self,
            Self::Service
                | Self::Socket
                | Self::Mount
                | Self::Automount
                | Self::Swap
                | Self::Path
                | Self::Timer
                | Self::Scope
        )
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit as systemd reports it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    /// Bus object path
    pub object_path: String,
    pub unit_type: UnitType,
    /// Properties of `org.freedesktop.systemd1.Unit`
    pub properties: BTreeMap<String, Value>,
    /// Properties of the type-specific interface
    pub typed_properties: BTreeMap<String, Value>,
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            unit_type: UnitType::from_name(&name),
            name,
            description: String::new(),
            load_state: String::new(),
            active_state: String::new(),
            sub_state: String::new(),
            object_path: String::new(),
            properties: BTreeMap::new(),
            typed_properties: BTreeMap::new(),
        }
    }

    /// Stand-in for a unit that is not loaded
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            active_state: "unknown".into(),
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn with_active_state(mut self, state: impl Into<String>) -> Self {
        self.active_state = state.into();
        self
    }

    /// The file the unit was loaded from, if any
    pub fn fragment_path(&self) -> Option<&str> {
        self.properties
            .get("FragmentPath")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Human-readable reason for the unit's last failure
    pub fn failure_reason(&self) -> &'static str {
        if !self.unit_type.has_result() {
            return "unknown reason";
        }
        self.typed_properties
            .get("Result")
            .and_then(Value::as_str)
            .map_or("unknown reason", failure_phrase)
    }
}

/// Translate a unit `Result` code
pub fn failure_phrase(code: &str) -> &'static str {
    match code {
        "success" => "the unit was activated successfully",
        "resources" => "not enough resources were available to run the unit",
        "timeout" => "a timeout occurred while running the unit",
        "exit-code" => "the unit exited with a non-zero exit code",
        "signal" => "the unit exited due to a signal",
        "core-dump" => "the unit exited and dumped core",
        "watchdog" => "the unit's watchdog timed out",
        "start-limit" => "the unit was started too frequently",
        "service-failed-permanent" => "the unit failed permanently",
        _ => "unknown reason",
    }
}

/// Canonical unit name: names without a suffix are services
pub fn canonical_name(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.service")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_type_from_name() {
        assert_eq!(UnitType::from_name("nginx.service"), UnitType::Service);
        assert_eq!(UnitType::from_name("dbus.socket"), UnitType::Socket);
        assert_eq!(UnitType::from_name("multi-user.target"), UnitType::Target);
        assert_eq!(UnitType::from_name("before-upgrade.snapshot"), UnitType::Snapshot);
        assert_eq!(UnitType::Snapshot.as_str(), "snapshot");
        assert!(!UnitType::Snapshot.has_result());
        assert_eq!(UnitType::from_name("weird"), UnitType::Unknown);
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("nginx"), "nginx.service");
        assert_eq!(canonical_name("sshd.socket"), "sshd.socket");
    }

    #[test]
    fn test_failure_reason() {
        let mut unit = Unit::new("app.service").with_active_state("failed");
        assert_eq!(unit.failure_reason(), "unknown reason");

        unit.typed_properties
            .insert("Result".into(), Value::from("exit-code"));
        assert_eq!(
            unit.failure_reason(),
            "the unit exited with a non-zero exit code"
        );

        unit.typed_properties
            .insert("Result".into(), Value::from("bogus"));
        assert_eq!(unit.failure_reason(), "unknown reason");

        let mut target = Unit::new("x.target");
        target
            .typed_properties
            .insert("Result".into(), Value::from("timeout"));
        assert_eq!(target.failure_reason(), "unknown reason");
    }

    #[test]
    fn test_unknown_placeholder() {
        let unit = Unit::unknown("ghost.service");
        assert_eq!(unit.active_state, "unknown");
        assert_eq!(unit.unit_type, UnitType::Service);
        assert_eq!(unit.fragment_path(), None);
    }
}
