//! Configuration loading and the API configuration record

use anyhow::Result;
use gantry_core::RobotDefinition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure (`gantry.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Robots to register at startup
    #[serde(default, alias = "robot")]
    pub robots: Vec<RobotDefinition>,
}

/// Settings for the HTTPS API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to certificate file (PEM format)
    #[serde(default)]
    pub cert: Option<PathBuf>,
    /// Path to private key file (PEM format)
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Value for `Access-Control-Allow-Origin`; `*` when unset
    #[serde(default, alias = "CORS")]
    pub cors: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cert: None,
            key: None,
            auth: None,
            cors: None,
        }
    }
}

impl ApiConfig {
    /// Overwrite only the fields present in `update`
    pub fn merge(&mut self, update: ApiConfigUpdate) {
        let ApiConfigUpdate {
            host,
            port,
            cert,
            key,
            auth,
            cors,
        } = update;

        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if cert.is_some() {
            self.cert = cert;
        }
        if key.is_some() {
            self.key = key;
        }
        if auth.is_some() {
            self.auth = auth;
        }
        if cors.is_some() {
            self.cors = cors;
        }
    }

    /// Credentials to enforce, if basic auth is configured with a user and password
    pub fn basic_auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref().filter(|a| a.is_enabled())
    }

    pub fn cors_origin(&self) -> &str {
        self.cors.as_deref().unwrap_or("*")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub kind: AuthKind,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl AuthConfig {
    pub fn basic(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            kind: AuthKind::Basic,
            user: user.into(),
            pass: pass.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.kind == AuthKind::Basic && !self.user.is_empty() && !self.pass.is_empty()
    }
}

/// Partial API configuration; `None` fields leave the current value untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfigUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub auth: Option<AuthConfig>,
    pub cors: Option<String>,
}

impl From<ApiConfig> for ApiConfigUpdate {
    fn from(config: ApiConfig) -> Self {
        Self {
            host: Some(config.host),
            port: Some(config.port),
            cert: config.cert,
            key: config.key,
            auth: config.auth,
            cors: config.cors,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), robots = config.robots.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
