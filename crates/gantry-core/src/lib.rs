//! Gantry Core - Robots, connections, devices and capability contracts
//!
//! This crate provides the hardware graph that the Gantry daemon serves:
//! - Adaptor and Driver contracts with explicit command dispatch tables
//! - Connections and Devices wrapping one adaptor/driver each
//! - Robots aggregating named connections and devices with a work callback
//! - A named-event publisher used to bridge hardware events to subscribers
//! - Built-in `loopback`, `ping` and `test` providers

pub mod adaptor;
pub mod builtin;
pub mod command;
pub mod connection;
pub mod device;
pub mod driver;
pub mod error;
pub mod event;
pub mod ids;
pub mod registry;
pub mod robot;
pub mod spec;

pub use adaptor::{Adaptor, AdaptorContext};
pub use connection::{Connection, ConnectionData};
pub use device::{Device, DeviceData};
pub use driver::{Driver, DriverContext};
pub use error::{Error, ErrorBody, LookupError, Result};
pub use event::{EventPublisher, Listener, ListenerId};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use registry::ProviderRegistry;
pub use robot::{Robot, RobotConfig, RobotData, RobotDefinition, RobotEnv, RobotState};
pub use spec::{ConnectionSpec, DeviceSpec, OneOrMany};
