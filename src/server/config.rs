use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use anyhow::{Context, Result};

/// Port the relay listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8089;

/// Nickname every session starts with until it sends `SetNickname`.
pub const DEFAULT_NICKNAME: &str = "guest";

/// Size of the per-read receive buffer. One read is one frame.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4096;

/// Relay configuration, usually loaded from TOML. Every section and field is
/// optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ListenConfig,
    pub session: SessionConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Address to bind, e.g. "0.0.0.0:8089"
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub recv_buffer_size: usize,
    pub default_nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Read administrative commands from stdin
    pub enabled: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{}", DEFAULT_PORT),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            default_nickname: DEFAULT_NICKNAME.to_string(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl RelayConfig {
    /// Keep the configured host but listen on `port` instead.
    pub fn with_port(mut self, port: u16) -> Result<Self> {
        let mut addr = self.listen_addr()?;
        addr.set_port(port);
        self.server.address = addr.to_string();
        Ok(self)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .address
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.server.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::load_config;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr().unwrap().port(), DEFAULT_PORT);
        assert_eq!(config.session.recv_buffer_size, 4096);
        assert_eq!(config.session.default_nickname, "guest");
        assert!(config.console.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\naddress = \"127.0.0.1:9000\"").unwrap();

        let config: RelayConfig = load_config(file.path()).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:9000");
        assert_eq!(config.session.default_nickname, "guest");
        assert!(config.console.enabled);
    }

    #[test]
    fn test_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
address = "127.0.0.1:7000"

[session]
recv_buffer_size = 512
default_nickname = "anon"

[console]
enabled = false
"#
        )
        .unwrap();

        let config: RelayConfig = load_config(file.path()).unwrap();
        assert_eq!(config.session.recv_buffer_size, 512);
        assert_eq!(config.session.default_nickname, "anon");
        assert!(!config.console.enabled);
    }

    #[test]
    fn test_port_override() {
        let mut config = RelayConfig::default();
        config.server.address = "127.0.0.1:7000".to_string();
        let config = config.with_port(8100).unwrap();
        assert_eq!(config.server.address, "127.0.0.1:8100");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result: Result<RelayConfig> = load_config("/definitely/not/here.toml");
        assert!(result.is_err());
    }
}
