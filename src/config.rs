// Copyright 2026 Acme Engineering

//! Gateway configuration, read once from TOML at startup.
//!
//! Every field has a default, so an empty file (or `Settings::default()`)
//! is a working configuration listening on `0.0.0.0:2030`.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde_derive::Deserialize;
use thiserror::Error;

use crate::auth::{AllowList, Credential};
use crate::protocol::{MAX_REQUEST_SIZE, MIN_REQUEST_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application_name: String,
    pub environment: String,
    pub options: Options,
    pub tcp: TcpSettings,
    pub threading: ThreadingSettings,
    pub authorized: Vec<Credential>,
}

impl Default for Settings {
    fn default() -> Settings {
        let allowed = AllowList::default();
        Settings {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            environment: "development".to_string(),
            options: Options::default(),
            tcp: TcpSettings::default(),
            threading: ThreadingSettings::default(),
            authorized: allowed.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Log the size of every unit read and every response written.
    pub enable_connection_logging: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpSettings {
    /// Idle read timeout in seconds.
    pub timeout: u64,
    /// Seconds connections get to drain after shutdown starts.
    pub shutdown_grace: u64,
    pub max_request_size: usize,
    pub endpoints: Vec<Endpoint>,
}

impl Default for TcpSettings {
    fn default() -> TcpSettings {
        TcpSettings {
            timeout: 60,
            shutdown_grace: 10,
            max_request_size: MAX_REQUEST_SIZE,
            endpoints: vec![Endpoint {
                name: "tcp-stream".to_string(),
                address: "0.0.0.0:2030".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadingSettings {
    pub worker_threads: usize,
}

impl Default for ThreadingSettings {
    fn default() -> ThreadingSettings {
        ThreadingSettings { worker_threads: 8 }
    }
}

impl Settings {
    /// Read, parse and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
        let content = fs::read_to_string(path)?;
        Settings::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Settings, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every rule and reports all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.tcp.endpoints.is_empty() {
            problems.push("at least one tcp endpoint is required".to_string());
        }
        let mut names = HashSet::new();
        for endpoint in &self.tcp.endpoints {
            if endpoint.address.parse::<SocketAddr>().is_err() {
                problems.push(format!(
                    "endpoint {:?} has an invalid address {:?}",
                    endpoint.name, endpoint.address
                ));
            }
            if !names.insert(endpoint.name.as_str()) {
                problems.push(format!("duplicate endpoint name {:?}", endpoint.name));
            }
        }
        if self.tcp.timeout == 0 {
            problems.push("tcp.timeout must be greater than zero".to_string());
        }
        if self.tcp.max_request_size < MIN_REQUEST_SIZE {
            problems.push(format!(
                "tcp.max_request_size must be at least {}",
                MIN_REQUEST_SIZE
            ));
        }
        if self.threading.worker_threads == 0 {
            problems.push("threading.worker_threads must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join(", ")))
        }
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(self.authorized.iter().cloned())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp.timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.tcp.shutdown_grace)
    }

    /// Endpoint addresses. Only meaningful after [`Settings::validate`].
    pub fn endpoint_addrs(&self) -> Result<Vec<(String, SocketAddr)>, ConfigError> {
        self.tcp
            .endpoints
            .iter()
            .map(|e| {
                e.address
                    .parse()
                    .map(|addr| (e.name.clone(), addr))
                    .map_err(|_| ConfigError::Invalid(format!("invalid address {:?}", e.address)))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tcp.timeout, 60);
        assert_eq!(settings.tcp.max_request_size, 4096);
        assert_eq!(settings.allow_list().len(), 2);
        assert!(Settings::from_toml("").is_ok());
    }

    #[test]
    fn parses_full_file() {
        let settings = Settings::from_toml(
            r#"
application_name = "gateway"
environment = "test"

[options]
enable_connection_logging = true

[tcp]
timeout = 5
max_request_size = 8192

[[tcp.endpoints]]
name = "public"
address = "127.0.0.1:443"

[[tcp.endpoints]]
name = "internal"
address = "[::1]:80"

[threading]
worker_threads = 2

[[authorized]]
oem_id = "acme"
device_id = "router"
unique_id = "0042"
"#,
        )
        .unwrap();

        assert_eq!(settings.application_name, "gateway");
        assert!(settings.options.enable_connection_logging);
        assert_eq!(settings.idle_timeout(), Duration::from_secs(5));
        assert_eq!(settings.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(settings.threading.worker_threads, 2);
        assert_eq!(settings.endpoint_addrs().unwrap().len(), 2);

        let allowed = settings.allow_list();
        assert_eq!(allowed.len(), 1);
        assert!(allowed.contains(&Credential::new("ACME", "Router", "0042")));
    }

    #[test]
    fn reports_every_problem() {
        let err = Settings::from_toml(
            r#"
[tcp]
timeout = 0
max_request_size = 4

[[tcp.endpoints]]
name = "a"
address = "not an address"

[[tcp.endpoints]]
name = "a"
address = "127.0.0.1:1"

[threading]
worker_threads = 0
"#,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("invalid address"));
        assert!(message.contains("duplicate endpoint"));
        assert!(message.contains("tcp.timeout"));
        assert!(message.contains("max_request_size"));
        assert!(message.contains("worker_threads"));
    }

    #[test]
    fn rejects_bad_toml() {
        match Settings::from_toml("[tcp") {
            Err(ConfigError::Parse(_)) => (),
            other => panic!("unexpected {:?}", other),
        }
        let mut settings = Settings::default();
        settings.tcp.endpoints.clear();
        assert!(settings.validate().is_err());
    }
}
