//! Robot names and connection/device identifiers

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of generated robot names and instance identifiers.
///
/// Robots fall back to this when a configuration omits a name or id.
pub trait IdGenerator: Send + Sync {
    /// Name for a robot registered without one
    fn robot_name(&self) -> String;

    /// Identifier for a connection or device registered without one
    fn instance_id(&self) -> String;
}

/// Default generator: `Robot <n>` names and UUID v4 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn robot_name(&self) -> String {
        let n: u32 = rand::thread_rng().gen_range(0..100_000);
        format!("Robot {}", n)
    }

    fn instance_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic generator for tests and reproducible setups
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    robots: AtomicU64,
    instances: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::with_prefix("Robot")
    }

    /// Robot names become `<prefix> 1`, `<prefix> 2`, ...
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            robots: AtomicU64::new(0),
            instances: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn robot_name(&self) -> String {
        let n = self.robots.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{} {}", self.prefix, n)
    }

    fn instance_id(&self) -> String {
        let n = self.instances.fetch_add(1, Ordering::Relaxed) + 1;
        n.to_string()
    }
}
