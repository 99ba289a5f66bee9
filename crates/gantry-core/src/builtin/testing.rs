use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::adaptor::{Adaptor, AdaptorContext};
use crate::driver::{Driver, DriverContext};
use crate::error::{Error, Result};
use crate::event::EventPublisher;

/// Options understood by the `test` providers
#[derive(Debug, Deserialize)]
struct TestOptions {
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    fail_connect: bool,
    #[serde(default)]
    fail_start: bool,
}

impl TestOptions {
    fn parse(options: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(options))
            .map_err(|e| Error::provider(format!("invalid test provider options: {}", e)))
    }
}

/// Shared behaviour: every listed command echoes its arguments and publishes
/// a `command` event describing the call
#[derive(Debug)]
struct Echo {
    name: String,
    commands: Vec<String>,
    events: EventPublisher,
}

impl Echo {
    fn invoke(&self, command: &str, args: &[Value]) -> Result<Value> {
        if !self.commands.iter().any(|c| c == command) {
            return Err(Error::unknown_command(&self.name, command));
        }
        self.events
            .publish("command", &json!({ "command": command, "args": args }));
        Ok(Value::Array(args.to_vec()))
    }
}

/// Adaptor for exercising connections without hardware
#[derive(Debug)]
pub struct TestAdaptor {
    echo: Echo,
    fail_connect: bool,
}

impl TestAdaptor {
    pub fn new(ctx: AdaptorContext) -> Result<Self> {
        let opts = TestOptions::parse(ctx.options)?;
        Ok(Self {
            echo: Echo {
                name: ctx.name,
                commands: opts.commands,
                events: ctx.events,
            },
            fail_connect: opts.fail_connect,
        })
    }
}

impl Adaptor for TestAdaptor {
    fn name(&self) -> &str {
        &self.echo.name
    }

    fn kind(&self) -> &str {
        "test"
    }

    fn commands(&self) -> Vec<String> {
        self.echo.commands.clone()
    }

    fn invoke(&self, command: &str, args: &[Value]) -> Result<Value> {
        self.echo.invoke(command, args)
    }

    fn connect(&self) -> Result<()> {
        if self.fail_connect {
            return Err(Error::provider(format!("{}: connect refused", self.echo.name)));
        }
        info!(adaptor = %self.echo.name, "Test adaptor connected");
        Ok(())
    }
}

/// Driver for exercising devices without hardware
#[derive(Debug)]
pub struct TestDriver {
    echo: Echo,
    fail_start: bool,
}

impl TestDriver {
    pub fn new(ctx: DriverContext) -> Result<Self> {
        let opts = TestOptions::parse(ctx.options)?;
        Ok(Self {
            echo: Echo {
                name: ctx.name,
                commands: opts.commands,
                events: ctx.events,
            },
            fail_start: opts.fail_start,
        })
    }
}

impl Driver for TestDriver {
    fn name(&self) -> &str {
        &self.echo.name
    }

    fn kind(&self) -> &str {
        "test"
    }

    fn commands(&self) -> Vec<String> {
        self.echo.commands.clone()
    }

    fn invoke(&self, command: &str, args: &[Value]) -> Result<Value> {
        self.echo.invoke(command, args)
    }

    fn start(&self) -> Result<()> {
        if self.fail_start {
            return Err(Error::provider(format!("{}: start failed", self.echo.name)));
        }
        info!(driver = %self.echo.name, "Test driver started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_driver_echoes_and_publishes() {
        let events = EventPublisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe("command", move |v| sink.lock().unwrap().push(v.clone()));

        let mut options = Map::new();
        options.insert("commands".to_string(), json!(["roll"]));
        let driver = TestDriver::new(DriverContext::new("sphero", options, events)).unwrap();

        let result = driver.invoke("roll", &[json!(90), json!(180)]).unwrap();
        assert_eq!(result, json!([90, 180]));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!({"command": "roll", "args": [90, 180]})]
        );
        assert!(driver.invoke("fly", &[]).is_err());
    }

    #[test]
    fn test_bad_options_rejected() {
        let mut options = Map::new();
        options.insert("commands".to_string(), json!("roll"));
        let ctx = DriverContext::new("sphero", options, EventPublisher::new());
        assert!(TestDriver::new(ctx).is_err());
    }
}
