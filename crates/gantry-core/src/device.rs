//! Device: a robot's handle on one driver

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::driver::{Driver, DriverContext};
use crate::error::Result;
use crate::event::EventPublisher;
use crate::ids::IdGenerator;
use crate::registry::ProviderRegistry;
use crate::spec::DeviceSpec;

/// Introspection record returned by [`Device::data`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub name: String,
    pub driver: String,
    /// Name of the bound connection
    pub connection: Option<String>,
    pub commands: Vec<String>,
}

/// One logical piece of hardware (an LED, a motor, a sensor)
pub struct Device {
    id: String,
    name: String,
    connection: Weak<Connection>,
    driver: Box<dyn Driver>,
    commands: Vec<String>,
    events: EventPublisher,
}

impl Device {
    /// Build a device bound to `connection`, resolving its driver through `providers`
    pub fn new(
        spec: DeviceSpec,
        connection: Option<&Arc<Connection>>,
        providers: &ProviderRegistry,
        ids: &dyn IdGenerator,
    ) -> Result<Self> {
        let events = EventPublisher::new();
        let driver_events = EventPublisher::new();
        driver_events.relay_to(&events);

        let mut ctx = DriverContext::new(spec.name.clone(), spec.options, driver_events);
        if let Some(conn) = connection {
            ctx = ctx.with_connection(conn);
        }
        let driver = providers.create_driver(&spec.driver, ctx)?;
        let commands = driver.commands();

        Ok(Self {
            id: spec.id.unwrap_or_else(|| ids.instance_id()),
            name: spec.name,
            connection: connection.map(Arc::downgrade).unwrap_or_default(),
            driver,
            commands,
            events,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Republishes everything the driver publishes
    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Command names proxied from the driver
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c == command)
    }

    /// Invoke a driver command by name, exactly as the driver would
    pub fn command(&self, command: &str, args: &[Value]) -> Result<Value> {
        debug!(device = %self.name, command, args = args.len(), "Invoking driver command");
        self.driver.invoke(command, args)
    }

    pub fn start(&self) -> Result<()> {
        info!("Starting device {}", self.name);
        self.driver.start()?;
        self.events.publish("start", &Value::Null);
        Ok(())
    }

    pub fn halt(&self) -> Result<()> {
        info!("Halting device {}", self.name);
        self.driver.halt()?;
        self.events.publish("halt", &Value::Null);
        Ok(())
    }

    pub fn data(&self) -> DeviceData {
        DeviceData {
            name: self.name.clone(),
            driver: self.driver.kind().to_string(),
            connection: self.connection().map(|c| c.name().to_string()),
            commands: self.commands.clone(),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver", &self.driver.kind())
            .field("connection", &self.connection().map(|c| c.name().to_string()))
            .finish()
    }
}
