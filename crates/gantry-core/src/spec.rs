//! Declarative connection and device specifications

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single item or a list of them; both forms normalize to a `Vec`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        Self::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items)
    }
}

/// How to build one [`Connection`](crate::Connection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub name: String,
    /// Registered adaptor implementation name
    pub adaptor: String,
    /// Opaque transport descriptor, e.g. `/dev/ttyACM0` or `192.168.1.1:5556`
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Remaining keys, handed to the adaptor untouched
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ConnectionSpec {
    pub fn new(name: impl Into<String>, adaptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            adaptor: adaptor.into(),
            port: None,
            id: None,
            options: Map::new(),
        }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// How to build one [`Device`](crate::Device)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    /// Registered driver implementation name
    pub driver: String,
    /// Connection to bind to; the robot's first connection when omitted
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl DeviceSpec {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            connection: None,
            id: None,
            options: Map::new(),
        }
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_or_many_from_json() {
        let one: OneOrMany<ConnectionSpec> =
            serde_json::from_value(json!({"name": "loopback", "adaptor": "loopback"})).unwrap();
        let many: OneOrMany<ConnectionSpec> =
            serde_json::from_value(json!([{"name": "loopback", "adaptor": "loopback"}])).unwrap();

        assert_eq!(one.into_vec(), many.into_vec());
    }

    #[test]
    fn test_extra_keys_become_options() {
        let spec: DeviceSpec = serde_json::from_value(json!({
            "name": "led",
            "driver": "led",
            "pin": 13,
            "connection": "arduino"
        }))
        .unwrap();

        assert_eq!(spec.connection.as_deref(), Some("arduino"));
        assert_eq!(spec.options.get("pin"), Some(&json!(13)));
        assert!(!spec.options.contains_key("name"));
    }

    #[test]
    fn test_builder() {
        let spec = ConnectionSpec::new("sphero", "sphero")
            .port("/dev/rfcomm0")
            .option("baud", json!(115200));
        assert_eq!(spec.port.as_deref(), Some("/dev/rfcomm0"));
        assert_eq!(spec.options["baud"], json!(115200));
    }
}
