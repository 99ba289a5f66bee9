//! Driver contract: the device protocol behind a [`Device`](crate::Device)

use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use tracing::info;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::event::EventPublisher;

/// Everything a driver factory gets to build a driver instance
#[derive(Debug, Clone)]
pub struct DriverContext {
    /// Name of the owning device
    pub name: String,
    /// Extra keys from the device specification
    pub options: Map<String, Value>,
    /// Events published here are republished on the owning device
    pub events: EventPublisher,
    pub(crate) connection: Weak<Connection>,
}

impl DriverContext {
    pub fn new(name: impl Into<String>, options: Map<String, Value>, events: EventPublisher) -> Self {
        Self {
            name: name.into(),
            options,
            events,
            connection: Weak::new(),
        }
    }

    pub fn with_connection(mut self, connection: &Arc<Connection>) -> Self {
        self.connection = Arc::downgrade(connection);
        self
    }

    /// The connection the device is bound to, if any and still alive
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }
}

/// Device-specific protocol layered on top of a connection.
///
/// Same dispatch-table shape as [`Adaptor`](crate::Adaptor), with
/// `start`/`halt` lifecycle hooks instead of connect/disconnect.
pub trait Driver: Send + Sync {
    /// Instance name (the owning device's name)
    fn name(&self) -> &str;

    /// Implementation name as registered, e.g. `"ping"`
    fn kind(&self) -> &str;

    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    fn invoke(&self, command: &str, _args: &[Value]) -> Result<Value> {
        Err(Error::unknown_command(self.name(), command))
    }

    fn start(&self) -> Result<()> {
        info!(driver = self.name(), "Driver started");
        Ok(())
    }

    fn halt(&self) -> Result<()> {
        info!(driver = self.name(), "Driver halted");
        Ok(())
    }
}
