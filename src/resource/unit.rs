//! `systemd.unit.state`: the run state and enablement of a systemd unit
//!
//! A check reads the unit over the executor and its enablement from the
//! unit trees. Apply performs, in order, the signal, the reload, the state
//! transition and the enablement changes. Every executor call runs through
//! [`Context::run`] so a cancellation never waits on the bus.

use super::Environment;
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Level, Monitor, Outcome, Status,
    Task, cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use unitkit::{Change, ChangeType, Enablement, EnablementRoots, Executor, Signal, Unit, canonical_name};

/// Desired run state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnitState {
    #[default]
    Running,
    Stopped,
    Restarted,
}

pub const UNIT_STATES: &[&str] = &["running", "stopped", "restarted"];

impl TryFrom<String> for UnitState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "restarted" => Ok(Self::Restarted),
            _ => Err(value),
        }
    }
}

prepare::from_raw_via!(UnitState, String);

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Restarted => "restarted",
        })
    }
}

/// The state transition a check settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Nothing,
    Start,
    Stop,
    Restart,
}

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("unit").required())
        .field(Field::new("state").valid_values(UNIT_STATES))
        .field(Field::new("reload"))
        .field(Field::new("signal"))
        .field(Field::new("enabled"))
        .field(Field::new("enabled_runtime"))
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let unit: String = p.require("unit")?;
    let signal = p
        .get::<String>("signal")?
        .map(|s| s.parse::<Signal>())
        .transpose()?;
    let executor = env
        .systemd
        .clone()
        .context("systemd is not available on this host")?;

    Ok(Box::new(UnitResource {
        name: canonical_name(&unit),
        state: p.get_or("state", UnitState::Running)?,
        reload: p.get_or("reload", false)?,
        signal,
        enabled: p.get("enabled")?,
        enabled_runtime: p.get("enabled_runtime")?,
        executor,
        roots: env.enablement.clone(),
        observed: None,
        enablement: None,
        signal_sent: false,
        reloaded: false,
        restarted: false,
    }))
}

pub struct UnitResource {
    name: String,
    state: UnitState,
    reload: bool,
    signal: Option<Signal>,
    enabled: Option<bool>,
    enabled_runtime: Option<bool>,
    executor: Arc<dyn Executor>,
    roots: EnablementRoots,
    observed: Option<Unit>,
    enablement: Option<Enablement>,
    signal_sent: bool,
    reloaded: bool,
    restarted: bool,
}

impl fmt::Debug for UnitResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitResource")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("reload", &self.reload)
            .field("signal", &self.signal)
            .field("enabled", &self.enabled)
            .field("enabled_runtime", &self.enabled_runtime)
            .finish_non_exhaustive()
    }
}

fn enabled_word(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

/// Decide the transition for `running`/`stopped` from the active state
fn transition(want: UnitState, unit: &Unit, status: &mut Status) -> Action {
    let active = unit.active_state.as_str();
    let reason = || format!("unit failed: {}", unit.failure_reason());
    match (want, active) {
        (UnitState::Running, "active") => status.add_message("already running"),
        (UnitState::Running, "reloading" | "activating") => {
            status.add_message(format!("unit is {active}"));
            status.raise_level(Level::MayChange);
        }
        (UnitState::Running, "inactive") => {
            status.add_difference("state", "inactive", "active", None);
            status.raise_level(Level::WillChange);
            return Action::Start;
        }
        (UnitState::Running, "failed") => {
            status.add_message(reason());
            status.add_difference("state", "failed", "active", None);
            status.raise_level(Level::WillChange);
            return Action::Start;
        }
        (UnitState::Running, "deactivating" | "unknown") => {
            status.add_difference("state", active, "active", None);
            status.raise_level(Level::MayChange);
            return Action::Start;
        }
        (UnitState::Stopped, "active") => {
            status.add_difference("state", "active", "inactive", None);
            status.raise_level(Level::WillChange);
            return Action::Stop;
        }
        (UnitState::Stopped, "reloading" | "unknown") => {
            status.add_difference("state", active, "inactive", None);
            status.raise_level(Level::MayChange);
            return Action::Stop;
        }
        (UnitState::Stopped, "activating") => {
            status.add_difference("state", "active", "inactive", None);
            status.raise_level(Level::MayChange);
            return Action::Stop;
        }
        (UnitState::Stopped, "inactive") => status.add_message("already stopped"),
        (UnitState::Stopped, "failed") => status.add_message(reason()),
        (UnitState::Stopped, "deactivating") => {
            status.add_message("unit is deactivating");
            status.raise_level(Level::MayChange);
        }
        (_, other) => {
            status.add_message(format!("unrecognized active state {other:?}"));
            status.raise_level(Level::MayChange);
        }
    }
    Action::Nothing
}

impl UnitResource {
    /// Run an executor call on a worker, failing with `status`
    fn call<T, F>(&self, ctx: &Context, status: &Status, f: F) -> Result<T, Failure>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Executor) -> unitkit::Result<T> + Send + 'static,
    {
        let executor = Arc::clone(&self.executor);
        ctx.run(move || f(executor.as_ref()))
            .map_err(|e| cancelled(e, status.clone()))?
            .fail_with(status)
    }

    fn diff(&mut self, ctx: &Context) -> Result<(Status, Action, Unit), Failure> {
        let mut status = Status::new();
        let name = self.name.clone();
        let unit = self.call(ctx, &status, move |e| e.query_unit(&name, false))?;
        self.observed = Some(unit.clone());

        if let Some(signal) = self.signal.filter(|_| !self.signal_sent) {
            status.add_message(format!("Sending signal {signal} to {}", self.name));
            status.raise_level(Level::WillChange);
        }
        if self.reload && !self.reloaded {
            status.add_difference("state", unit.active_state.clone(), "reloaded", None);
            status.raise_level(Level::WillChange);
        }

        let action = match self.state {
            UnitState::Restarted if self.restarted => {
                status.add_message("restarted");
                Action::Nothing
            }
            UnitState::Restarted => {
                status.add_difference("state", unit.active_state.clone(), "restarted", None);
                status.raise_level(Level::WillChange);
                Action::Restart
            }
            want => transition(want, &unit, &mut status),
        };

        let roots = self.roots.clone();
        let walked = unit.clone();
        let enablement = ctx
            .run(move || roots.status(&walked))
            .map_err(|e| cancelled(e, status.clone()))?;
        self.enablement = Some(enablement);
        for (label, want, current) in [
            ("persistent", self.enabled, enablement.persistent),
            ("runtime", self.enabled_runtime, enablement.runtime),
        ] {
            if let Some(want) = want.filter(|want| *want != current) {
                status.add_difference(label, enabled_word(current), enabled_word(want), None);
                status.raise_level(Level::WillChange);
            }
        }

        Ok((status, action, unit))
    }

    fn record_changes(status: &mut Status, changes: Vec<Change>) {
        for change in changes {
            match change.kind {
                ChangeType::Link => {
                    status.add_difference(change.filename, "<absent>", change.destination, None);
                }
                ChangeType::Unlink => {
                    status.add_difference(change.filename, change.destination, "<absent>", None);
                }
            }
        }
    }

    fn reconcile_enablement(
        &self,
        ctx: &Context,
        status: &mut Status,
        unit: &Unit,
        runtime: bool,
        want: Option<bool>,
        current: bool,
    ) -> Result<(), Failure> {
        let Some(want) = want.filter(|want| *want != current) else {
            return Ok(());
        };
        let target = unit.clone();
        let changes = if want {
            log::info!("enabling {} (runtime: {runtime})", unit.name);
            let (hooks, changes) =
                self.call(ctx, status, move |e| e.enable_unit(&target, runtime, false))?;
            if !hooks {
                status.add_message(format!("{} has no install section", unit.name));
            }
            changes
        } else {
            log::info!("disabling {} (runtime: {runtime})", unit.name);
            self.call(ctx, status, move |e| e.disable_unit(&target, runtime))?
        };
        Self::record_changes(status, changes);
        Ok(())
    }
}

/// Property map exported under a prefix
struct Properties<'a>(&'a BTreeMap<String, Value>);

impl Exported for Properties<'_> {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        for (name, value) in self.0 {
            fields.insert(name.clone(), value.clone())?;
        }
        Ok(())
    }
}

impl Exported for UnitResource {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("unit", self.name.clone())?;
        fields.insert("state", self.state.to_string())?;
        fields.insert("reload", self.reload)?;
        fields.insert_opt("signal_name", self.signal.map(|s| s.name()))?;
        fields.insert_opt("signal_number", self.signal.map(Signal::number))?;
        fields.insert_opt("enabled", self.enabled)?;
        fields.insert_opt("enabled_runtime", self.enabled_runtime)?;
        fields.insert_opt("persistent_enabled", self.enablement.map(|e| e.persistent))?;
        fields.insert_opt("runtime_enabled", self.enablement.map(|e| e.runtime))?;

        let Some(unit) = &self.observed else {
            return Ok(());
        };
        fields.insert("active_state", unit.active_state.clone())?;
        fields.insert("load_state", unit.load_state.clone())?;
        fields.insert("sub_state", unit.sub_state.clone())?;
        fields.insert("description", unit.description.clone())?;
        fields.insert("type", unit.unit_type.as_str())?;
        fields.insert_opt("path", unit.fragment_path())?;
        fields.re_export_as("properties", &Properties(&unit.properties))?;
        if !unit.typed_properties.is_empty() {
            fields.re_export_as(unit.unit_type.as_str(), &Properties(&unit.typed_properties))?;
        }
        Ok(())
    }
}

impl Monitor for UnitResource {
    fn check(&mut self, ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff(ctx).map(|(status, _, _)| status)
    }
}

impl Task for UnitResource {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let (mut status, action, unit) = self.diff(ctx)?;
        if !status.has_changes() {
            return Ok(status);
        }

        if let Some(signal) = self.signal.filter(|_| !self.signal_sent) {
            log::info!("sending {signal} to {}", unit.name);
            let target = unit.clone();
            self.call(ctx, &status, move |e| e.send_signal(&target, signal))?;
            self.signal_sent = true;
        }

        if self.reload && !self.reloaded {
            log::info!("reloading {}", unit.name);
            let target = unit.clone();
            self.call(ctx, &status, move |e| e.reload_unit(&target))?;
            self.reloaded = true;
        }

        let target = unit.clone();
        match action {
            Action::Nothing => {}
            Action::Start => {
                log::info!("starting {}", unit.name);
                self.call(ctx, &status, move |e| e.start_unit(&target))?;
            }
            Action::Stop => {
                log::info!("stopping {}", unit.name);
                self.call(ctx, &status, move |e| e.stop_unit(&target))?;
            }
            Action::Restart => {
                log::info!("restarting {}", unit.name);
                self.call(ctx, &status, move |e| e.restart_unit(&target))?;
                self.restarted = true;
            }
        }

        let current = self.enablement.unwrap_or_default();
        self.reconcile_enablement(ctx, &mut status, &unit, false, self.enabled, current.persistent)?;
        self.reconcile_enablement(
            ctx,
            &mut status,
            &unit,
            true,
            self.enabled_runtime,
            current.runtime,
        )?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::prepare_json;
    use render::ModuleRenderer;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every call; start/stop/restart update the active state
    #[derive(Default)]
    struct FakeSystemd {
        units: Mutex<Vec<Unit>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSystemd {
        fn with_unit(unit: Unit) -> Arc<Self> {
            Arc::new(Self {
                units: Mutex::new(vec![unit]),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, unit: &Unit, active: Option<&str>) {
            self.calls.lock().unwrap().push(call);
            if let Some(active) = active {
                for u in self.units.lock().unwrap().iter_mut() {
                    if u.name == unit.name {
                        u.active_state = active.to_string();
                    }
                }
            }
        }
    }

    impl Executor for FakeSystemd {
        fn list_units(&self) -> unitkit::Result<Vec<Unit>> {
            Ok(self.units.lock().unwrap().clone())
        }
        fn start_unit(&self, u: &Unit) -> unitkit::Result<()> {
            self.record(format!("start {}", u.name), u, Some("active"));
            Ok(())
        }
        fn stop_unit(&self, u: &Unit) -> unitkit::Result<()> {
            self.record(format!("stop {}", u.name), u, Some("inactive"));
            Ok(())
        }
        fn restart_unit(&self, u: &Unit) -> unitkit::Result<()> {
            self.record(format!("restart {}", u.name), u, Some("active"));
            Ok(())
        }
        fn reload_unit(&self, u: &Unit) -> unitkit::Result<()> {
            self.record(format!("reload {}", u.name), u, None);
            Ok(())
        }
        fn send_signal(&self, u: &Unit, signal: Signal) -> unitkit::Result<()> {
            self.record(format!("kill -{} {}", signal.number(), u.name), u, None);
            Ok(())
        }
        fn enable_unit(
            &self,
            u: &Unit,
            runtime: bool,
            _force: bool,
        ) -> unitkit::Result<(bool, Vec<Change>)> {
            self.record(format!("enable {} runtime={runtime}", u.name), u, None);
            Ok((
                true,
                vec![Change {
                    kind: ChangeType::Link,
                    filename: format!("/etc/systemd/system/multi-user.target.wants/{}", u.name),
                    destination: format!("/lib/systemd/system/{}", u.name),
                }],
            ))
        }
        fn disable_unit(&self, u: &Unit, runtime: bool) -> unitkit::Result<Vec<Change>> {
            self.record(format!("disable {} runtime={runtime}", u.name), u, None);
            Ok(Vec::new())
        }
    }

    fn env(systemd: &Arc<FakeSystemd>, roots: &std::path::Path) -> Environment {
        Environment {
            systemd: Some(Arc::clone(systemd) as Arc<dyn Executor>),
            enablement: EnablementRoots::new(roots.join("etc"), roots.join("run")),
            ..Environment::default()
        }
    }

    fn active(name: &str) -> Unit {
        let mut unit = Unit::new(name).with_active_state("active");
        unit.properties.insert("Id".into(), json!(name));
        unit.typed_properties.insert("MainPID".into(), json!(42));
        unit
    }

    #[test]
    fn test_restart() {
        let roots = tempfile::tempdir().unwrap();
        let systemd = FakeSystemd::with_unit(active("foo.service"));
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "foo", "state": "restarted" }),
        )
        .unwrap();

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        let diff = &status.diffs()["state"];
        assert_eq!((diff.original.as_str(), diff.current.as_str()), ("active", "restarted"));

        task.apply(&ctx).unwrap();
        assert_eq!(systemd.calls(), vec!["restart foo.service".to_string()]);
        assert!(!task.check(&ctx, &mut renderer).unwrap().has_changes());
    }

    #[test]
    fn test_start_inactive_and_export() {
        let roots = tempfile::tempdir().unwrap();
        let systemd = FakeSystemd::with_unit(active("web.service").with_active_state("inactive"));
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "web.service" }),
        )
        .unwrap();

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.diffs()["state"].current, "active");
        let fields = FieldMap::of(task.as_ref()).unwrap();
        assert_eq!(fields.get("properties.Id"), Some(&json!("web.service")));
        assert_eq!(fields.get("service.MainPID"), Some(&json!(42)));
        assert_eq!(fields.get("type"), Some(&json!("service")));

        task.apply(&ctx).unwrap();
        assert_eq!(systemd.calls(), vec!["start web.service".to_string()]);
        assert!(!task.check(&ctx, &mut renderer).unwrap().has_changes());
    }

    #[test]
    fn test_running_unit_is_left_alone() {
        let roots = tempfile::tempdir().unwrap();
        let systemd = FakeSystemd::with_unit(active("web.service"));
        let status = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "web.service", "state": "running" }),
        )
        .unwrap()
        .apply(&Context::new())
        .unwrap();
        assert_eq!(status.status_code(), Level::NoChange);
        assert!(systemd.calls().is_empty());
    }

    #[test]
    fn test_stop_unknown_unit_may_change() {
        let roots = tempfile::tempdir().unwrap();
        let systemd = Arc::new(FakeSystemd::default());
        let status = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "ghost.service", "state": "stopped" }),
        )
        .unwrap()
        .check(&Context::new(), &mut ModuleRenderer::new())
        .unwrap();
        assert_eq!(status.status_code(), Level::MayChange);
        assert_eq!(status.diffs()["state"].original, "unknown");
        assert!(status.has_changes());
    }

    #[test]
    fn test_signal_then_enable() {
        let roots = tempfile::tempdir().unwrap();
        let systemd = FakeSystemd::with_unit(active("web.service"));
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "web.service", "signal": "hup", "enabled": true }),
        )
        .unwrap();

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert!(status.messages().iter().any(|m| m.starts_with("Sending signal SIGHUP")));
        assert_eq!(status.diffs()["persistent"].original, "disabled");

        let status = task.apply(&ctx).unwrap();
        assert_eq!(
            systemd.calls(),
            vec![
                "kill -1 web.service".to_string(),
                "enable web.service runtime=false".to_string(),
            ]
        );
        assert_eq!(
            status.diffs()["/etc/systemd/system/multi-user.target.wants/web.service"].current,
            "/lib/systemd/system/web.service"
        );
    }

    #[test]
    fn test_enablement_read_from_tree() {
        let roots = tempfile::tempdir().unwrap();
        let wants = roots.path().join("etc/system/multi-user.target.wants");
        std::fs::create_dir_all(&wants).unwrap();
        std::fs::write(wants.join("web.service"), "").unwrap();

        let systemd = FakeSystemd::with_unit(active("web.service"));
        let mut task = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "web.service", "enabled": false }),
        )
        .unwrap();
        let status = task.check(&Context::new(), &mut ModuleRenderer::new()).unwrap();
        let diff = &status.diffs()["persistent"];
        assert_eq!((diff.original.as_str(), diff.current.as_str()), ("enabled", "disabled"));

        task.apply(&Context::new()).unwrap();
        assert_eq!(systemd.calls(), vec!["disable web.service runtime=false".to_string()]);
    }

    #[test]
    fn test_invalid_signal_rejected() {
        let systemd = Arc::new(FakeSystemd::default());
        let err = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, std::path::Path::new("/nonexistent")),
            json!({ "unit": "a.service", "signal": "SIGNOPE" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid signal"));
    }

    #[test]
    fn test_cancelled_check_is_fatal() {
        let roots = tempfile::tempdir().unwrap();
        let systemd = FakeSystemd::with_unit(active("web.service"));
        let ctx = Context::new();
        ctx.cancel();
        let failure = prepare_json(
            &schema(),
            prepare,
            &env(&systemd, roots.path()),
            json!({ "unit": "web.service" }),
        )
        .unwrap()
        .check(&ctx, &mut ModuleRenderer::new())
        .unwrap_err();
        assert_eq!(failure.level(), Level::Fatal);
        assert_eq!(failure.error.to_string(), "context was cancelled");
    }
}
