// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue/list server configuration.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Queue/list server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 7400)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the `sled` file backing all queue containers.
    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,

    /// Path to the `sled` file backing all list containers.
    #[serde(default = "default_list_file")]
    pub list_file: PathBuf,

    /// Address of an upstream service registry. Stored and logged only;
    /// dialing it is not implemented by this server.
    #[serde(default)]
    pub service_registry: Option<String>,

    /// Maximum message size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Enable TCP keepalive on client connections
    #[serde(default = "default_true")]
    pub tcp_keepalive: bool,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub tcp_keepalive_interval_secs: u64,
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    7400
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("queue.db")
}

fn default_list_file() -> PathBuf {
    PathBuf::from("list.db")
}

fn default_true() -> bool {
    true
}

fn default_keepalive_interval() -> u64 {
    15
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            queue_file: default_queue_file(),
            list_file: default_list_file(),
            service_registry: None,
            max_message_size: default_max_message_size(),
            tcp_keepalive: true,
            tcp_keepalive_interval_secs: default_keepalive_interval(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.queue_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("queue_file cannot be empty".into()));
        }
        if self.list_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("list_file cannot be empty".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
