//! Providers that ship with Gantry
//!
//! - `loopback` adaptor: no I/O, every lifecycle call succeeds
//! - `ping` driver: answers `ping` with `"pong"` and publishes a `ping` event
//! - `test` adaptor/driver: configurable command list, echoes its arguments

mod loopback;
mod ping;
mod testing;

pub use loopback::LoopbackAdaptor;
pub use ping::PingDriver;
pub use testing::{TestAdaptor, TestDriver};

use crate::registry::ProviderRegistry;

pub(crate) fn register(registry: &mut ProviderRegistry) {
    registry
        .register_adaptor("loopback", |ctx| Ok(Box::new(LoopbackAdaptor::new(ctx))))
        .register_adaptor("test", |ctx| Ok(Box::new(TestAdaptor::new(ctx)?)))
        .register_driver("ping", |ctx| Ok(Box::new(PingDriver::new(ctx))))
        .register_driver("test", |ctx| Ok(Box::new(TestDriver::new(ctx)?)));
}
