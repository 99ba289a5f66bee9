//! Robot: named connections and devices driven as one unit
//!
//! A robot is built from a [`RobotConfig`]. Construction resolves every
//! connection and device specification against the provider registry held in
//! its [`RobotEnv`]; an unknown adaptor or driver fails construction.
//!
//! Lifecycle: `Constructed → StartingConnections → StartingDevices → Working`,
//! with `Halted` reachable from anywhere through [`Robot::halt`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionData};
use crate::device::{Device, DeviceData};
use crate::error::{Error, LookupError, Result};
use crate::event::EventPublisher;
use crate::ids::{IdGenerator, RandomIds};
use crate::registry::ProviderRegistry;
use crate::spec::{ConnectionSpec, DeviceSpec, OneOrMany};

/// User work, run once per start on the robot's work thread
pub type Work = Arc<dyn Fn(&Arc<Robot>) + Send + Sync>;

/// Robot-level command callable by name like any proxied command
pub type RobotCommand = Arc<dyn Fn(&Robot, &[Value]) -> Result<Value> + Send + Sync>;

/// Names no command may take, since they address the robot itself
pub const RESERVED_METHODS: &[&str] = &[
    "start",
    "halt",
    "data",
    "command",
    "commands",
    "name",
    "state",
    "events",
    "device",
    "devices",
    "connection",
    "connections",
    "work",
    "to_string",
    "start_connections",
    "start_devices",
    "init_connections",
    "init_devices",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotState {
    Constructed,
    StartingConnections,
    StartingDevices,
    Working,
    Halted,
}

/// Provider registry and id source a robot builds its members with
#[derive(Clone)]
pub struct RobotEnv {
    pub providers: Arc<ProviderRegistry>,
    pub ids: Arc<dyn IdGenerator>,
}

impl RobotEnv {
    pub fn new(providers: ProviderRegistry, ids: impl IdGenerator + 'static) -> Self {
        Self {
            providers: Arc::new(providers),
            ids: Arc::new(ids),
        }
    }
}

impl Default for RobotEnv {
    fn default() -> Self {
        Self::new(ProviderRegistry::with_builtins(), RandomIds)
    }
}

impl fmt::Debug for RobotEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobotEnv").field("providers", &self.providers).finish()
    }
}

/// Serializable part of a robot configuration, as found in config files.
///
/// Both `connection`/`connections` and `device`/`devices` are accepted, each
/// holding either one table or a list of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "connection")]
    pub connections: Option<OneOrMany<ConnectionSpec>>,
    #[serde(default, alias = "device")]
    pub devices: Option<OneOrMany<DeviceSpec>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything needed to build a [`Robot`]
#[derive(Clone, Default)]
pub struct RobotConfig {
    pub name: Option<String>,
    pub connections: Vec<ConnectionSpec>,
    pub devices: Vec<DeviceSpec>,
    pub work: Option<Work>,
    pub commands: Vec<(String, RobotCommand)>,
    /// Arbitrary values kept on the robot, see [`Robot::extra`]
    pub extra: Map<String, Value>,
}

impl RobotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn connection(mut self, spec: ConnectionSpec) -> Self {
        self.connections.push(spec);
        self
    }

    pub fn connections(mut self, specs: impl Into<OneOrMany<ConnectionSpec>>) -> Self {
        self.connections.extend(specs.into().into_vec());
        self
    }

    pub fn device(mut self, spec: DeviceSpec) -> Self {
        self.devices.push(spec);
        self
    }

    pub fn devices(mut self, specs: impl Into<OneOrMany<DeviceSpec>>) -> Self {
        self.devices.extend(specs.into().into_vec());
        self
    }

    pub fn work<F>(mut self, work: F) -> Self
    where
        F: Fn(&Arc<Robot>) + Send + Sync + 'static,
    {
        self.work = Some(Arc::new(work));
        self
    }

    pub fn command<F>(mut self, name: impl Into<String>, command: F) -> Self
    where
        F: Fn(&Robot, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.commands.push((name.into(), Arc::new(command)));
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl From<RobotDefinition> for RobotConfig {
    fn from(def: RobotDefinition) -> Self {
        Self {
            name: def.name,
            connections: def.connections.map(OneOrMany::into_vec).unwrap_or_default(),
            devices: def.devices.map(OneOrMany::into_vec).unwrap_or_default(),
            work: None,
            commands: Vec::new(),
            extra: def.extra,
        }
    }
}

impl fmt::Debug for RobotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let commands: Vec<&str> = self.commands.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("RobotConfig")
            .field("name", &self.name)
            .field("connections", &self.connections)
            .field("devices", &self.devices)
            .field("work", &self.work.is_some())
            .field("commands", &commands)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Introspection record returned by [`Robot::data`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotData {
    pub name: String,
    pub commands: Vec<String>,
    pub devices: Vec<DeviceData>,
    pub connections: Vec<ConnectionData>,
}

pub struct Robot {
    name: String,
    work: Option<Work>,
    commands: IndexMap<String, RobotCommand>,
    connections: RwLock<IndexMap<String, Arc<Connection>>>,
    devices: RwLock<IndexMap<String, Arc<Device>>>,
    extra: Map<String, Value>,
    state: Mutex<RobotState>,
    events: EventPublisher,
    env: RobotEnv,
}

impl Robot {
    /// Build a robot and all of its connections and devices
    pub fn new(config: RobotConfig, env: RobotEnv) -> Result<Arc<Self>> {
        let name = config.name.unwrap_or_else(|| env.ids.robot_name());

        let mut commands = IndexMap::new();
        for (command, f) in config.commands {
            if RESERVED_METHODS.contains(&command.as_str()) {
                return Err(Error::ReservedCommand(command));
            }
            if commands.insert(command.clone(), f).is_some() {
                return Err(Error::CommandCollision {
                    robot: name,
                    command,
                });
            }
        }

        let robot = Self {
            name,
            work: config.work,
            commands,
            connections: RwLock::new(IndexMap::new()),
            devices: RwLock::new(IndexMap::new()),
            extra: config.extra,
            state: Mutex::new(RobotState::Constructed),
            events: EventPublisher::new(),
            env,
        };

        robot.init_connections(Some(config.connections.into()))?;
        robot.init_devices(Some(config.devices.into()))?;
        info!(robot = %robot.name, "Initialized robot");

        Ok(Arc::new(robot))
    }

    /// Build with the built-in providers and random ids
    pub fn with_defaults(config: RobotConfig) -> Result<Arc<Self>> {
        Self::new(config, RobotEnv::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RobotState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Extra configuration value copied onto the robot
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn has_work(&self) -> bool {
        self.work.is_some()
    }

    /// Add connections from one spec or a list; `None` and an empty list add nothing.
    ///
    /// All specs are validated before any is added. Returns the number added.
    pub fn init_connections(&self, specs: Option<OneOrMany<ConnectionSpec>>) -> Result<usize> {
        let Some(specs) = specs else {
            return Ok(0);
        };
        let specs = specs.into_vec();
        if specs.is_empty() {
            return Ok(0);
        }

        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut claimed = claimed_commands(
            connections
                .values()
                .map(|c| c.commands())
                .chain(devices.values().map(|d| d.commands())),
        );
        let mut staged: IndexMap<String, Arc<Connection>> = IndexMap::new();
        for spec in specs {
            if connections.contains_key(&spec.name) || staged.contains_key(&spec.name) {
                return Err(Error::DuplicateConnection(spec.name));
            }
            let connection = Connection::new(spec, &self.env.providers, self.env.ids.as_ref())?;
            self.check_proxied(connection.commands(), &mut claimed)?;
            staged.insert(connection.name().to_string(), Arc::new(connection));
        }

        let added = staged.len();
        connections.extend(staged);
        debug!(robot = %self.name, added, "Initialized connections");
        Ok(added)
    }

    /// Add devices from one spec or a list; `None` and an empty list add nothing.
    ///
    /// A device without an explicit connection binds to the first connection.
    pub fn init_devices(&self, specs: Option<OneOrMany<DeviceSpec>>) -> Result<usize> {
        let Some(specs) = specs else {
            return Ok(0);
        };
        let specs = specs.into_vec();
        if specs.is_empty() {
            return Ok(0);
        }

        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let mut claimed = claimed_commands(
            connections
                .values()
                .map(|c| c.commands())
                .chain(devices.values().map(|d| d.commands())),
        );
        let mut staged: IndexMap<String, Arc<Device>> = IndexMap::new();
        for spec in specs {
            if devices.contains_key(&spec.name) || staged.contains_key(&spec.name) {
                return Err(Error::DuplicateDevice(spec.name));
            }
            let connection = match &spec.connection {
                Some(conn) => Some(connections.get(conn).ok_or_else(|| Error::UnknownConnection {
                    device: spec.name.clone(),
                    connection: conn.clone(),
                })?),
                None => connections.values().next(),
            };
            let device = Device::new(spec, connection, &self.env.providers, self.env.ids.as_ref())?;
            self.check_proxied(device.commands(), &mut claimed)?;
            staged.insert(device.name().to_string(), Arc::new(device));
        }

        let added = staged.len();
        devices.extend(staged);
        debug!(robot = %self.name, added, "Initialized devices");
        Ok(added)
    }

    /// Reject a member's commands that are reserved, defined on the robot,
    /// or already proxied from another member; accepted names join `claimed`
    fn check_proxied(&self, names: &[String], claimed: &mut HashSet<String>) -> Result<()> {
        for command in names {
            if RESERVED_METHODS.contains(&command.as_str()) {
                return Err(Error::ReservedCommand(command.clone()));
            }
            if self.commands.contains_key(command) || !claimed.insert(command.clone()) {
                return Err(Error::CommandCollision {
                    robot: self.name.clone(),
                    command: command.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn connection(&self, name: &str) -> Option<Arc<Connection>> {
        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        connections.get(name).cloned()
    }

    pub fn device(&self, name: &str) -> Option<Arc<Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(name).cloned()
    }

    pub fn find_connection(&self, name: &str) -> std::result::Result<Arc<Connection>, LookupError> {
        self.connection(name)
            .ok_or_else(|| LookupError::Connection(name.to_string()))
    }

    pub fn find_device(&self, name: &str) -> std::result::Result<Arc<Device>, LookupError> {
        self.device(name)
            .ok_or_else(|| LookupError::Device(name.to_string()))
    }

    /// Connections in the order they were added
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        connections.values().cloned().collect()
    }

    /// Devices in the order they were added
    pub fn devices(&self) -> Vec<Arc<Device>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.values().cloned().collect()
    }

    /// Robot-level commands followed by every device and connection command
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        let proxied = self
            .devices()
            .iter()
            .flat_map(|d| d.commands().to_vec())
            .chain(self.connections().iter().flat_map(|c| c.commands().to_vec()))
            .collect::<Vec<_>>();
        names.extend(proxied);
        names
    }

    /// Invoke a command by name: robot-level first, then the device exposing
    /// it, then the connection exposing it
    pub fn command(&self, command: &str, args: &[Value]) -> Result<Value> {
        if let Some(f) = self.commands.get(command) {
            debug!(robot = %self.name, command, "Invoking robot command");
            return f(self, args);
        }
        if let Some(device) = self.devices().into_iter().find(|d| d.has_command(command)) {
            return device.command(command, args);
        }
        if let Some(conn) = self.connections().into_iter().find(|c| c.has_command(command)) {
            return conn.command(command, args);
        }
        Err(Error::unknown_command(&self.name, command))
    }

    /// Connect, start devices, then run work on a dedicated thread.
    ///
    /// Returns once connections and devices have been started; the handle
    /// joins the work thread, which publishes `working` after work returns.
    /// A work callback that never returns (an event loop) therefore never
    /// publishes `working`; subscribe to device events instead.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        info!(robot = %self.name, "Starting robot");

        self.set_state(RobotState::StartingConnections);
        self.start_connections();

        self.set_state(RobotState::StartingDevices);
        self.start_devices();

        let robot = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("work:{}", self.name))
            .spawn(move || robot.run_work())?;
        Ok(handle)
    }

    fn run_work(self: Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == RobotState::Halted {
                debug!(robot = %self.name, "Halted before work began");
                return;
            }
            *state = RobotState::Working;
        }

        if let Some(work) = &self.work {
            info!(robot = %self.name, "Working");
            work(&self);
        }
        self.events.publish("working", &Value::Null);
    }

    /// Connect every connection; failures are logged and returned by name,
    /// and never stop the remaining connections from being attempted
    pub fn start_connections(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for conn in self.connections() {
            if let Err(e) = conn.connect() {
                error!(robot = %self.name, connection = %conn.name(), error = %e, "Connection failed");
                failed.push(conn.name().to_string());
            }
        }
        failed
    }

    /// Start every device; same best-effort behaviour as [`start_connections`](Self::start_connections)
    pub fn start_devices(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for device in self.devices() {
            if let Err(e) = device.start() {
                error!(robot = %self.name, device = %device.name(), error = %e, "Device failed to start");
                failed.push(device.name().to_string());
            }
        }
        failed
    }

    /// Halt every device, then every connection, each exactly once
    pub fn halt(&self) {
        info!(robot = %self.name, "Halting robot");
        self.set_state(RobotState::Halted);

        for device in self.devices() {
            if let Err(e) = device.halt() {
                warn!(robot = %self.name, device = %device.name(), error = %e, "Device halt failed");
            }
        }
        for conn in self.connections() {
            if let Err(e) = conn.halt() {
                warn!(robot = %self.name, connection = %conn.name(), error = %e, "Connection halt failed");
            }
        }
    }

    pub fn data(&self) -> RobotData {
        RobotData {
            name: self.name.clone(),
            commands: self.commands(),
            devices: self.devices().iter().map(|d| d.data()).collect(),
            connections: self.connections().iter().map(|c| c.data()).collect(),
        }
    }

    fn set_state(&self, next: RobotState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(robot = %self.name, from = ?*state, to = ?next, "Robot state change");
        *state = next;
    }
}

fn claimed_commands<'a>(lists: impl Iterator<Item = &'a [String]>) -> HashSet<String> {
    lists.flatten().cloned().collect()
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Robot name='{}']", self.name)
    }
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("connections", &self.connections())
            .field("devices", &self.devices())
            .finish()
    }
}
