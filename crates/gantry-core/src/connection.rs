//! Connection: a robot's handle on one adaptor

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::adaptor::{Adaptor, AdaptorContext};
use crate::error::Result;
use crate::event::EventPublisher;
use crate::ids::IdGenerator;
use crate::registry::ProviderRegistry;
use crate::spec::ConnectionSpec;

/// Introspection record returned by [`Connection::data`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionData {
    pub name: String,
    pub port: Option<String>,
    pub adaptor: String,
    pub connection_id: String,
}

/// The interface to a group of hardware devices, e.g. one Arduino or one Sphero
pub struct Connection {
    id: String,
    name: String,
    port: Option<String>,
    adaptor: Box<dyn Adaptor>,
    commands: Vec<String>,
    connected: AtomicBool,
    events: EventPublisher,
}

impl Connection {
    /// Build a connection, resolving its adaptor through `providers`
    pub fn new(spec: ConnectionSpec, providers: &ProviderRegistry, ids: &dyn IdGenerator) -> Result<Self> {
        let events = EventPublisher::new();
        let adaptor_events = EventPublisher::new();
        adaptor_events.relay_to(&events);

        let ctx = AdaptorContext {
            name: spec.name.clone(),
            port: spec.port.clone(),
            options: spec.options,
            events: adaptor_events,
        };
        let adaptor = providers.create_adaptor(&spec.adaptor, ctx)?;
        let commands = adaptor.commands();

        Ok(Self {
            id: spec.id.unwrap_or_else(|| ids.instance_id()),
            name: spec.name,
            port: spec.port,
            adaptor,
            commands,
            connected: AtomicBool::new(false),
            events,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn adaptor(&self) -> &dyn Adaptor {
        self.adaptor.as_ref()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Command names proxied from the adaptor
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c == command)
    }

    /// Invoke an adaptor command by name, exactly as the adaptor would
    pub fn command(&self, command: &str, args: &[Value]) -> Result<Value> {
        debug!(connection = %self.name, command, args = args.len(), "Invoking adaptor command");
        self.adaptor.invoke(command, args)
    }

    pub fn connect(&self) -> Result<()> {
        info!("Connecting to {}{}", self.name, self.on_port());
        self.adaptor.connect()?;
        self.connected.store(true, Ordering::Release);
        self.events.publish("connect", &Value::Null);
        Ok(())
    }

    pub fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}{}", self.name, self.on_port());
        self.connected.store(false, Ordering::Release);
        self.adaptor.disconnect()?;
        self.events.publish("disconnect", &Value::Null);
        Ok(())
    }

    /// Disconnect if connected; a no-op otherwise, so repeated halts are safe
    pub fn halt(&self) -> Result<()> {
        info!("Halting adaptor {}{}", self.name, self.on_port());
        if self.is_connected() {
            self.disconnect()?;
        } else {
            debug!(connection = %self.name, "Not connected, nothing to disconnect");
        }
        self.events.publish("halt", &Value::Null);
        Ok(())
    }

    pub fn data(&self) -> ConnectionData {
        ConnectionData {
            name: self.name.clone(),
            port: self.port.clone(),
            adaptor: self.adaptor.kind().to_string(),
            connection_id: self.id.clone(),
        }
    }

    fn on_port(&self) -> String {
        self.port
            .as_ref()
            .map(|p| format!(" on port {}", p))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("adaptor", &self.adaptor.kind())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use serde_json::json;

    fn build(spec: ConnectionSpec) -> Connection {
        Connection::new(spec, &ProviderRegistry::with_builtins(), &SequentialIds::new()).unwrap()
    }

    #[test]
    fn test_data() {
        let conn = build(ConnectionSpec::new("loopback", "loopback").port("/dev/null"));
        assert_eq!(
            conn.data(),
            ConnectionData {
                name: "loopback".to_string(),
                port: Some("/dev/null".to_string()),
                adaptor: "loopback".to_string(),
                connection_id: "1".to_string(),
            }
        );
    }

    #[test]
    fn test_explicit_id_wins() {
        let conn = build(ConnectionSpec::new("loopback", "loopback").id("arduino-1"));
        assert_eq!(conn.id(), "arduino-1");
    }

    #[test]
    fn test_halt_without_connect_is_safe() {
        let conn = build(ConnectionSpec::new("loopback", "loopback"));
        assert!(conn.halt().is_ok());
        assert!(conn.halt().is_ok());
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_connect_then_halt() {
        let conn = build(ConnectionSpec::new("loopback", "loopback"));
        conn.connect().unwrap();
        assert!(conn.is_connected());
        conn.halt().unwrap();
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_proxied_command_matches_adaptor() {
        let conn = build(
            ConnectionSpec::new("bench", "test").option("commands", json!(["reset", "status"])),
        );
        assert_eq!(conn.commands(), &["reset".to_string(), "status".to_string()]);

        let args = vec![json!(1), json!("two")];
        let via_connection = conn.command("status", &args).unwrap();
        let via_adaptor = conn.adaptor().invoke("status", &args).unwrap();
        assert_eq!(via_connection, via_adaptor);

        assert!(conn.command("explode", &[]).is_err());
    }

    #[test]
    fn test_connect_failure_leaves_disconnected() {
        let conn = build(ConnectionSpec::new("bench", "test").option("fail_connect", json!(true)));
        assert!(conn.connect().is_err());
        assert!(!conn.is_connected());
    }
}
