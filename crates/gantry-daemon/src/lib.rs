//! Gantry Daemon - Master registry and HTTPS API
//!
//! Serves the robots registered with a [`Master`] over REST, with
//! server-sent event streams for device events.

pub mod api;
pub mod auth;
pub mod config;
pub mod master;
pub mod server;
pub mod sse;

pub use config::{ApiConfig, ApiConfigUpdate, AuthConfig, Config};
pub use master::Master;
pub use server::{ApiHandle, ApiServer};
