//! Adaptor contract: the transport behind a [`Connection`](crate::Connection)

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::event::EventPublisher;

/// Everything an adaptor factory gets to build an adaptor instance
#[derive(Debug, Clone)]
pub struct AdaptorContext {
    /// Name of the owning connection
    pub name: String,
    pub port: Option<String>,
    /// Extra keys from the connection specification
    pub options: Map<String, Value>,
    /// Events published here are republished on the owning connection
    pub events: EventPublisher,
}

/// Low-level transport to one physical connection (serial port, socket, radio).
///
/// Commands are exposed through an explicit dispatch table: [`commands`]
/// lists the names and [`invoke`] executes one by name.
///
/// [`commands`]: Adaptor::commands
/// [`invoke`]: Adaptor::invoke
pub trait Adaptor: Send + Sync {
    /// Instance name (the owning connection's name)
    fn name(&self) -> &str;

    /// Implementation name as registered, e.g. `"loopback"`
    fn kind(&self) -> &str;

    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    fn invoke(&self, command: &str, _args: &[Value]) -> Result<Value> {
        Err(Error::unknown_command(self.name(), command))
    }

    fn connect(&self) -> Result<()> {
        info!(adaptor = self.name(), "Adaptor connected");
        Ok(())
    }

    /// Must tolerate being called when not connected
    fn disconnect(&self) -> Result<()> {
        info!(adaptor = self.name(), "Adaptor disconnected");
        Ok(())
    }
}
