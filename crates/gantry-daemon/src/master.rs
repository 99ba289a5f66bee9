//! Master: the process-wide robot registry and API owner

use gantry_core::{
    Connection, Device, LookupError, Robot, RobotConfig, RobotData, RobotEnv,
};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::{ApiConfig, ApiConfigUpdate};
use crate::server::{ApiHandle, ApiServer};

/// Registry of robots plus the lazily started API server
pub struct Master {
    env: RobotEnv,
    robots: RwLock<Vec<Arc<Robot>>>,
    api_config: RwLock<ApiConfig>,
    api: Mutex<Option<ApiHandle>>,
}

impl Master {
    pub fn new() -> Arc<Self> {
        Self::with_env(RobotEnv::default())
    }

    /// Create a master whose robots resolve providers and ids through `env`
    pub fn with_env(env: RobotEnv) -> Arc<Self> {
        Arc::new(Self {
            env,
            robots: RwLock::new(Vec::new()),
            api_config: RwLock::new(ApiConfig::default()),
            api: Mutex::new(None),
        })
    }

    pub fn env(&self) -> &RobotEnv {
        &self.env
    }

    /// Build a robot from `config` and register it
    pub fn robot(&self, config: RobotConfig) -> gantry_core::Result<Arc<Robot>> {
        let robot = Robot::new(config, self.env.clone())?;

        let mut robots = self.robots.write().unwrap_or_else(PoisonError::into_inner);
        if robots.iter().any(|r| r.name() == robot.name()) {
            return Err(gantry_core::Error::DuplicateRobot(robot.name().to_string()));
        }
        info!(robot = %robot.name(), "Registered robot");
        robots.push(Arc::clone(&robot));
        Ok(robot)
    }

    /// Registered robots in registration order
    pub fn robots(&self) -> Vec<Arc<Robot>> {
        self.robots.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn data(&self) -> Vec<RobotData> {
        self.robots().iter().map(|r| r.data()).collect()
    }

    pub fn find_robot(&self, name: &str) -> Option<Arc<Robot>> {
        self.lookup_robot(name).ok()
    }

    pub fn lookup_robot(&self, name: &str) -> Result<Arc<Robot>, LookupError> {
        self.robots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.name() == name)
            .cloned()
            .ok_or_else(|| {
                debug!(robot = name, "Robot lookup failed");
                LookupError::Robot(name.to_string())
            })
    }

    /// Callback form of [`lookup_robot`](Self::lookup_robot)
    pub fn find_robot_with<F>(&self, name: &str, callback: F)
    where
        F: FnOnce(Option<LookupError>, Option<Arc<Robot>>),
    {
        split(self.lookup_robot(name), callback)
    }

    pub fn find_robot_device(&self, robot: &str, device: &str) -> Option<Arc<Device>> {
        self.lookup_robot_device(robot, device).ok()
    }

    /// Resolve the robot first, so a missing robot wins over a missing device
    pub fn lookup_robot_device(&self, robot: &str, device: &str) -> Result<Arc<Device>, LookupError> {
        self.lookup_robot(robot)?.find_device(device)
    }

    pub fn find_robot_device_with<F>(&self, robot: &str, device: &str, callback: F)
    where
        F: FnOnce(Option<LookupError>, Option<Arc<Device>>),
    {
        split(self.lookup_robot_device(robot, device), callback)
    }

    pub fn find_robot_connection(&self, robot: &str, connection: &str) -> Option<Arc<Connection>> {
        self.lookup_robot_connection(robot, connection).ok()
    }

    pub fn lookup_robot_connection(
        &self,
        robot: &str,
        connection: &str,
    ) -> Result<Arc<Connection>, LookupError> {
        self.lookup_robot(robot)?.find_connection(connection)
    }

    pub fn find_robot_connection_with<F>(&self, robot: &str, connection: &str, callback: F)
    where
        F: FnOnce(Option<LookupError>, Option<Arc<Connection>>),
    {
        split(self.lookup_robot_connection(robot, connection), callback)
    }

    /// Merge `update` into the API configuration and return the result
    pub fn api(&self, update: ApiConfigUpdate) -> ApiConfig {
        let mut config = self.api_config.write().unwrap_or_else(PoisonError::into_inner);
        config.merge(update);
        config.clone()
    }

    pub fn api_config(&self) -> ApiConfig {
        self.api_config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start the API server (once), then every robot in registration order.
    ///
    /// Returns the address the API is listening on.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<SocketAddr> {
        let addr = self.start_api().await?;

        let master = Arc::clone(self);
        let work = tokio::task::spawn_blocking(move || master.start_robots()).await?;
        debug!(robots = work.len(), "All robots started");
        Ok(addr)
    }

    async fn start_api(self: &Arc<Self>) -> anyhow::Result<SocketAddr> {
        let mut api = self.api.lock().await;
        if let Some(handle) = api.as_ref() {
            debug!(addr = %handle.addr(), "API server already running");
            return Ok(handle.addr());
        }

        let server = ApiServer::new(Arc::clone(self), self.api_config());
        let handle = server.listen().await?;
        let addr = handle.addr();
        *api = Some(handle);
        Ok(addr)
    }

    /// Start every robot in order, returning the work thread handles of the
    /// ones that started
    pub fn start_robots(&self) -> Vec<JoinHandle<()>> {
        let mut work = Vec::new();
        for robot in self.robots() {
            match robot.start() {
                Ok(handle) => work.push(handle),
                Err(e) => error!(robot = %robot.name(), error = %e, "Failed to start robot"),
            }
        }
        work
    }

    /// Halt every robot in registration order; the API keeps serving
    pub fn halt(&self) {
        for robot in self.robots() {
            robot.halt();
        }
    }

    /// Stop the API listener gracefully, if it was started
    pub async fn shutdown(&self) {
        if let Some(handle) = self.api.lock().await.take() {
            handle.shutdown().await;
        }
    }
}

fn split<T, F>(result: Result<T, LookupError>, callback: F)
where
    F: FnOnce(Option<LookupError>, Option<T>),
{
    match result {
        Ok(found) => callback(None, Some(found)),
        Err(e) => callback(Some(e), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{
        ConnectionSpec, DeviceSpec, ProviderRegistry, RobotState, SequentialIds,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    fn master() -> Arc<Master> {
        Master::with_env(RobotEnv::new(ProviderRegistry::with_builtins(), SequentialIds::new()))
    }

    fn ultron(master: &Master) -> Arc<Robot> {
        master
            .robot(
                RobotConfig::named("Ultron")
                    .connection(ConnectionSpec::new("loopback", "loopback"))
                    .device(DeviceSpec::new("ping", "ping")),
            )
            .unwrap()
    }

    #[test]
    fn test_robot_registers_in_order() {
        let master = master();
        master.robot(RobotConfig::named("first")).unwrap();
        master.robot(RobotConfig::new()).unwrap();
        master.robot(RobotConfig::named("third")).unwrap();

        let names: Vec<String> = master.robots().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["first", "Robot 1", "third"]);
    }

    #[test]
    fn test_duplicate_robot_is_rejected() {
        let master = master();
        ultron(&master);
        let err = master.robot(RobotConfig::named("Ultron")).unwrap_err();
        assert!(matches!(err, gantry_core::Error::DuplicateRobot(ref n) if n == "Ultron"));
        assert_eq!(master.robots().len(), 1);
    }

    #[test]
    fn test_configuration_error_leaves_registry_unchanged() {
        let master = master();
        let result = master.robot(RobotConfig::named("bad").device(DeviceSpec::new("x", "warp-drive")));
        assert!(result.is_err());
        assert!(master.robots().is_empty());
    }

    #[test]
    fn test_find_robot_forms_agree() {
        let master = master();
        let robot = ultron(&master);

        assert!(Arc::ptr_eq(&master.find_robot("Ultron").unwrap(), &robot));
        master.find_robot_with("Ultron", |err, found| {
            assert!(err.is_none());
            assert!(Arc::ptr_eq(&found.unwrap(), &robot));
        });

        assert!(master.find_robot("Rob").is_none());
        master.find_robot_with("Rob", |err, found| {
            assert!(found.is_none());
            let body = serde_json::to_value(err.unwrap().body()).unwrap();
            assert_eq!(body, json!({"error": "No Robot found with the name Rob"}));
        });
    }

    #[test]
    fn test_find_robot_device() {
        let master = master();
        ultron(&master);

        assert_eq!(master.find_robot_device("Ultron", "ping").unwrap().name(), "ping");
        assert_eq!(
            master.lookup_robot_device("Ultron", "nope").unwrap_err().to_string(),
            "No device found with the name nope."
        );
        assert_eq!(
            master.lookup_robot_device("Rob", "ping").unwrap_err().to_string(),
            "No Robot found with the name Rob"
        );

        master.find_robot_device_with("Ultron", "ping", |err, device| {
            assert!(err.is_none());
            assert_eq!(device.unwrap().name(), "ping");
        });
    }

    #[test]
    fn test_find_robot_connection() {
        let master = master();
        ultron(&master);

        assert_eq!(master.find_robot_connection("Ultron", "loopback").unwrap().name(), "loopback");
        master.find_robot_connection_with("Ultron", "serial", |err, conn| {
            assert!(conn.is_none());
            assert_eq!(err, Some(LookupError::Connection("serial".to_string())));
        });
        master.find_robot_connection_with("Rob", "loopback", |err, _| {
            assert_eq!(err, Some(LookupError::Robot("Rob".to_string())));
        });
    }

    #[test]
    fn test_data_matches_robots() {
        let master = master();
        let robot = ultron(&master);
        assert_eq!(master.data(), vec![robot.data()]);
    }

    #[test]
    fn test_api_merge() {
        let master = master();
        let current = master.api(ApiConfigUpdate::default());
        assert_eq!(current, ApiConfig::default());

        let updated = master.api(ApiConfigUpdate {
            host: Some("0.0.0.0".to_string()),
            ..Default::default()
        });
        assert_eq!(updated.host, "0.0.0.0");
        assert_eq!(updated.port, 3000);
        assert_eq!(master.api_config(), updated);
    }

    #[test]
    fn test_start_robots_and_halt_in_order() {
        let master = master();
        for name in ["a", "b", "c"] {
            master
                .robot(
                    RobotConfig::named(name)
                        .connection(ConnectionSpec::new("loopback", "loopback"))
                        .work(move |_| {
                            // Earlier robots finish their work last
                            if name == "a" {
                                std::thread::sleep(std::time::Duration::from_millis(50));
                            }
                        }),
                )
                .unwrap();
        }

        // Connecting happens synchronously inside start_robots, so these
        // events record the start order regardless of how long work runs
        let order = Arc::new(StdMutex::new(Vec::new()));
        for robot in master.robots() {
            let sink = Arc::clone(&order);
            let name = robot.name().to_string();
            robot
                .connection("loopback")
                .unwrap()
                .events()
                .subscribe("connect", move |_| sink.lock().unwrap().push(name.clone()));
        }
        let halts = Arc::new(StdMutex::new(Vec::new()));
        for robot in master.robots() {
            let sink = Arc::clone(&halts);
            let name = robot.name().to_string();
            robot
                .connection("loopback")
                .unwrap()
                .events()
                .subscribe("halt", move |_| sink.lock().unwrap().push(name.clone()));
        }

        let work = master.start_robots();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
        for handle in work {
            handle.join().unwrap();
        }

        master.halt();
        assert_eq!(*halts.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(master.robots().iter().all(|r| r.state() == RobotState::Halted));
    }

    #[test]
    fn test_robot_command_through_master() {
        let master = master();
        master
            .robot(RobotConfig::named("calc").command("sum", |_, args| {
                Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
            }))
            .unwrap();
        let robot = master.find_robot("calc").unwrap();
        assert_eq!(robot.command("sum", &[json!(2), json!(3)]).unwrap(), json!(5));
    }

    #[tokio::test]
    async fn test_start_without_tls_material_fails() {
        let master = master();
        ultron(&master);
        let err = master.start().await.unwrap_err();
        assert!(err.to_string().contains("TLS"));
        // Robots are not started when the API cannot come up
        assert_eq!(master.find_robot("Ultron").unwrap().state(), RobotState::Constructed);
        master.shutdown().await;
    }
}
