//! [`Executor`] backed by the systemd manager on the system bus

use crate::error::{Error, Result};
use crate::executor::{Change, ChangeType, Executor, job_result};
use crate::signal::Signal;
use crate::unit::Unit;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value as BusValue};

const DESTINATION: &str = "org.freedesktop.systemd1";
const MANAGER_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Job mode for every state change
const JOB_MODE: &str = "replace";

/// One row of `ListUnits`
type ListedUnit = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

/// Systemd over D-Bus
#[derive(Debug, Clone)]
pub struct DbusExecutor {
    conn: Connection,
}

impl DbusExecutor {
    /// Connect to the system bus
    pub fn system() -> Result<Self> {
        Ok(Self {
            conn: Connection::system()?,
        })
    }

    fn manager(&self) -> Result<Proxy<'static>> {
        Ok(Proxy::new(
            &self.conn,
            DESTINATION,
            MANAGER_PATH,
            MANAGER_INTERFACE,
        )?)
    }

    /// Loaded units without their properties
    fn listed(&self) -> Result<Vec<Unit>> {
        let rows: Vec<ListedUnit> = self.manager()?.call("ListUnits", &())?;
        Ok(rows
            .into_iter()
            .map(|(name, description, load, active, sub, _, path, _, _, _)| Unit {
                description,
                load_state: load,
                active_state: active,
                sub_state: sub,
                object_path: path.as_str().to_string(),
                ..Unit::new(name)
            })
            .collect())
    }

    fn fill_properties(&self, unit: &mut Unit) -> Result<()> {
        unit.properties = self.properties(&unit.object_path, UNIT_INTERFACE)?;
        if let Some(interface) = unit.unit_type.interface() {
            unit.typed_properties = self.properties(&unit.object_path, interface)?;
        }
        Ok(())
    }

    fn properties(&self, path: &str, interface: &str) -> Result<BTreeMap<String, Value>> {
        let proxy = Proxy::new(
            &self.conn,
            DESTINATION,
            path.to_owned(),
            PROPERTIES_INTERFACE,
        )?;
        let raw: HashMap<String, OwnedValue> = proxy.call("GetAll", &(interface,))?;
        Ok(raw
            .into_iter()
            .map(|(name, value)| (name, to_json(&value)))
            .collect())
    }

    /// Issue a job and block until systemd reports it finished
    fn run_job(&self, verb: &'static str, method: &str, unit: &Unit) -> Result<()> {
        let manager = self.manager()?;
        if let Err(e) = manager.call::<_, _, ()>("Subscribe", &()) {
            log::debug!("subscribe: {e}");
        }
        // subscribe before issuing so a fast job cannot finish unobserved
        let removed = manager.receive_signal("JobRemoved")?;

        log::info!("{verb} {}", unit.name);
        let job: OwnedObjectPath = manager.call(method, &(unit.name.as_str(), JOB_MODE))?;

        for message in removed {
            let (_, path, _, result): (u32, OwnedObjectPath, String, String) =
                message.body().deserialize()?;
            if path == job {
                return job_result(verb, &unit.name, &result);
            }
        }
        Err(Error::JobChannelClosed {
            verb,
            unit: unit.name.clone(),
        })
    }

    fn reload_manager(&self) -> Result<()> {
        self.manager()?.call::<_, _, ()>("Reload", &())?;
        Ok(())
    }
}

impl Executor for DbusExecutor {
    fn list_units(&self) -> Result<Vec<Unit>> {
        let mut units = self.listed()?;
        for unit in &mut units {
            self.fill_properties(unit)?;
        }
        Ok(units)
    }

    fn query_unit(&self, name: &str, verify: bool) -> Result<Unit> {
        match self.listed()?.into_iter().find(|u| u.name == name) {
            Some(mut unit) => {
                self.fill_properties(&mut unit)?;
                Ok(unit)
            }
            None if verify => Err(Error::UnitNotFound(name.to_string())),
            None => Ok(Unit::unknown(name)),
        }
    }

    fn start_unit(&self, unit: &Unit) -> Result<()> {
        self.run_job("start", "StartUnit", unit)
    }

    fn stop_unit(&self, unit: &Unit) -> Result<()> {
        self.run_job("stop", "StopUnit", unit)
    }

    fn restart_unit(&self, unit: &Unit) -> Result<()> {
        self.run_job("restart", "RestartUnit", unit)
    }

    fn reload_unit(&self, unit: &Unit) -> Result<()> {
        self.run_job("reload", "ReloadUnit", unit)
    }

    fn send_signal(&self, unit: &Unit, signal: Signal) -> Result<()> {
        log::info!("sending {signal} to {}", unit.name);
        self.manager()?
            .call::<_, _, ()>("KillUnit", &(unit.name.as_str(), "all", signal.number()))?;
        Ok(())
    }

    fn enable_unit(&self, unit: &Unit, runtime: bool, force: bool) -> Result<(bool, Vec<Change>)> {
        log::info!("enabling {} (runtime: {runtime})", unit.name);
        let (carries_install_info, changes): (bool, Vec<(String, String, String)>) = self
            .manager()?
            .call("EnableUnitFiles", &(vec![unit.name.as_str()], runtime, force))?;
        self.reload_manager()?;
        Ok((carries_install_info, to_changes(changes)))
    }

    fn disable_unit(&self, unit: &Unit, runtime: bool) -> Result<Vec<Change>> {
        log::info!("disabling {} (runtime: {runtime})", unit.name);
        let changes: Vec<(String, String, String)> = self
            .manager()?
            .call("DisableUnitFiles", &(vec![unit.name.as_str()], runtime))?;
        self.reload_manager()?;
        Ok(to_changes(changes))
    }
}

fn to_changes(raw: Vec<(String, String, String)>) -> Vec<Change> {
    raw.into_iter()
        .filter_map(|(kind, filename, destination)| {
            ChangeType::parse(&kind).map(|kind| Change {
                kind,
                filename,
                destination,
            })
        })
        .collect()
}

/// Property values as JSON, for export to lookups
fn to_json(value: &BusValue<'_>) -> Value {
    match value {
        BusValue::Bool(b) => Value::from(*b),
        BusValue::U8(n) => Value::from(*n),
        BusValue::I16(n) => Value::from(*n),
        BusValue::U16(n) => Value::from(*n),
        BusValue::I32(n) => Value::from(*n),
        BusValue::U32(n) => Value::from(*n),
        BusValue::I64(n) => Value::from(*n),
        BusValue::U64(n) => Value::from(*n),
        BusValue::F64(n) => Value::from(*n),
        BusValue::Str(s) => Value::from(s.as_str()),
        BusValue::ObjectPath(p) => Value::from(p.as_str()),
        BusValue::Value(inner) => to_json(inner),
        BusValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        BusValue::Structure(s) => Value::Array(s.fields().iter().map(to_json).collect()),
        other => Value::from(other.to_string()),
    }
}
