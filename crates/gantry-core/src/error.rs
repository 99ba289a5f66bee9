//! Error types for robots, connections, devices and their providers

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown adaptor '{0}'")]
    UnknownAdaptor(String),
    #[error("Unknown driver '{0}'")]
    UnknownDriver(String),
    #[error("Device '{device}' refers to unknown connection '{connection}'")]
    UnknownConnection { device: String, connection: String },
    #[error("Connection '{0}' is already defined on this robot")]
    DuplicateConnection(String),
    #[error("Device '{0}' is already defined on this robot")]
    DuplicateDevice(String),
    #[error("A robot named '{0}' is already registered")]
    DuplicateRobot(String),
    #[error("Command '{0}' would shadow a reserved robot method")]
    ReservedCommand(String),
    #[error("Command '{command}' is defined more than once on robot '{robot}'")]
    CommandCollision { robot: String, command: String },
    #[error("'{target}' has no command named '{command}'")]
    UnknownCommand { target: String, command: String },
    #[error("Invalid argument {index} for '{command}': {reason}")]
    InvalidArgument {
        command: String,
        index: usize,
        reason: String,
    },
    #[error("{0}")]
    Provider(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a failure raised inside an adaptor or driver
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn unknown_command(target: impl Into<String>, command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            target: target.into(),
            command: command.into(),
        }
    }

    /// Whether this error should stop the process from building its robots
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownAdaptor(_)
                | Self::UnknownDriver(_)
                | Self::UnknownConnection { .. }
                | Self::DuplicateConnection(_)
                | Self::DuplicateDevice(_)
                | Self::DuplicateRobot(_)
                | Self::ReservedCommand(_)
                | Self::CommandCollision { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure to resolve a robot, device or connection by name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No Robot found with the name {0}")]
    Robot(String),
    #[error("No device found with the name {0}.")]
    Device(String),
    #[error("No connection found with the name {0}.")]
    Connection(String),
}

impl LookupError {
    /// JSON body reported to API clients: `{"error": "<message>"}`
    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.to_string())
    }
}

/// Serializable error object shared by lookups and the HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}
