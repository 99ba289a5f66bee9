use serde_json::{json, Value};

use crate::driver::{Driver, DriverContext};
use crate::error::{Error, Result};
use crate::event::EventPublisher;

/// Minimal driver: `ping` publishes a `ping` event and returns `"pong"`
#[derive(Debug)]
pub struct PingDriver {
    name: String,
    events: EventPublisher,
}

impl PingDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self {
            name: ctx.name,
            events: ctx.events,
        }
    }
}

impl Driver for PingDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "ping"
    }

    fn commands(&self) -> Vec<String> {
        vec!["ping".to_string()]
    }

    fn invoke(&self, command: &str, _args: &[Value]) -> Result<Value> {
        match command {
            "ping" => {
                self.events.publish("ping", &json!("ping"));
                Ok(json!("pong"))
            }
            _ => Err(Error::unknown_command(&self.name, command)),
        }
    }
}
