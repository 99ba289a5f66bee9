//! Provider registry: adaptor and driver implementations by name

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::adaptor::{Adaptor, AdaptorContext};
use crate::builtin;
use crate::driver::{Driver, DriverContext};
use crate::error::{Error, Result};

pub type AdaptorFactory = Arc<dyn Fn(AdaptorContext) -> Result<Box<dyn Adaptor>> + Send + Sync>;
pub type DriverFactory = Arc<dyn Fn(DriverContext) -> Result<Box<dyn Driver>> + Send + Sync>;

/// Named adaptor and driver factories a robot resolves its specs against
#[derive(Clone)]
pub struct ProviderRegistry {
    adaptors: HashMap<String, AdaptorFactory>,
    drivers: HashMap<String, DriverFactory>,
}

impl ProviderRegistry {
    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self {
            adaptors: HashMap::new(),
            drivers: HashMap::new(),
        }
    }

    /// Registry pre-loaded with `loopback`, `ping` and the `test` providers
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtin::register(&mut registry);
        registry
    }

    /// Register (or replace) an adaptor implementation
    pub fn register_adaptor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(AdaptorContext) -> Result<Box<dyn Adaptor>> + Send + Sync + 'static,
    {
        self.adaptors.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register (or replace) a driver implementation
    pub fn register_driver<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(DriverContext) -> Result<Box<dyn Driver>> + Send + Sync + 'static,
    {
        self.drivers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn create_adaptor(&self, kind: &str, ctx: AdaptorContext) -> Result<Box<dyn Adaptor>> {
        let factory = self
            .adaptors
            .get(kind)
            .ok_or_else(|| Error::UnknownAdaptor(kind.to_string()))?;
        debug!(adaptor = kind, connection = %ctx.name, "Loading adaptor");
        factory(ctx)
    }

    pub fn create_driver(&self, kind: &str, ctx: DriverContext) -> Result<Box<dyn Driver>> {
        let factory = self
            .drivers
            .get(kind)
            .ok_or_else(|| Error::UnknownDriver(kind.to_string()))?;
        debug!(driver = kind, device = %ctx.name, "Loading driver");
        factory(ctx)
    }

    /// Registered adaptor names, sorted
    pub fn adaptor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adaptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered driver names, sorted
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("adaptors", &self.adaptor_names())
            .field("drivers", &self.driver_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPublisher;
    use serde_json::Map;

    #[test]
    fn test_builtins_registered() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.adaptor_names(), vec!["loopback", "test"]);
        assert_eq!(registry.driver_names(), vec!["ping", "test"]);
    }

    #[test]
    fn test_unknown_names() {
        let registry = ProviderRegistry::empty();
        let ctx = AdaptorContext {
            name: "arduino".to_string(),
            port: None,
            options: Map::new(),
            events: EventPublisher::new(),
        };
        let err = registry.create_adaptor("firmata", ctx).err().unwrap();
        assert!(matches!(err, Error::UnknownAdaptor(ref n) if n == "firmata"));

        let ctx = DriverContext::new("led", Map::new(), EventPublisher::new());
        let err = registry.create_driver("led", ctx).err().unwrap();
        assert!(err.is_configuration());
    }
}
