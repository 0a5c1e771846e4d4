//! Server configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! file, environment variables, and command-line flags (applied by the
//! binary).
//!
//! ```toml
//! bind = "0.0.0.0"
//! port = 9001
//! accounts_dir = "Files"
//! outbound_buffer = 256
//! max_line_length = 8192
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use nodle_protocol::DEFAULT_PORT;

use crate::broadcast::DEFAULT_OUTBOUND_BUFFER;

/// Environment variable overriding the listening port
pub const ENV_PORT: &str = "NODLE_PORT";

/// Environment variable overriding the bind address
pub const ENV_BIND: &str = "NODLE_BIND";

/// Environment variable overriding the accounts directory
pub const ENV_ACCOUNTS_DIR: &str = "NODLE_ACCOUNTS_DIR";

/// Default directory holding account records
pub const DEFAULT_ACCOUNTS_DIR: &str = "Files";

/// Default maximum length of one client line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// Settings for one server instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: IpAddr,

    /// Port to listen on
    pub port: u16,

    /// Directory holding one record file per account
    pub accounts_dir: PathBuf,

    /// Lines queued per client before broadcasts skip it
    pub outbound_buffer: usize,

    /// Longest accepted client line; longer lines end the session
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            accounts_dir: PathBuf::from(DEFAULT_ACCOUNTS_DIR),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Parses TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: None,
            error: e.to_string(),
        })
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            error: e.to_string(),
        })
    }

    /// Loads `path` if given; otherwise the per-user config file if it
    /// exists; otherwise defaults.
    ///
    /// An explicitly named file that cannot be read is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading configuration file");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Applies `NODLE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Applies `NODLE_*` overrides read through `lookup`.
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_PORT) {
            self.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_PORT,
                value,
            })?;
        }

        if let Some(value) = lookup(ENV_BIND) {
            self.bind = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_BIND,
                value,
            })?;
        }

        if let Some(value) = lookup(ENV_ACCOUNTS_DIR) {
            if value.is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: ENV_ACCOUNTS_DIR,
                    value,
                });
            }
            self.accounts_dir = PathBuf::from(value);
        }

        Ok(self)
    }

    /// Socket address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Location of the per-user configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nodle").join("nodled.toml"))
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {error}", .path.display())]
    Read { path: PathBuf, error: String },

    #[error("Invalid config: {error}")]
    Parse {
        path: Option<PathBuf>,
        error: String,
    },

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9001);
        assert_eq!(config.accounts_dir, PathBuf::from("Files"));
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:9001");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml_str("port = 4000\naccounts_dir = \"/srv/nodle\"\n").unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.accounts_dir, PathBuf::from("/srv/nodle"));
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_full_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind = "127.0.0.1"
            port = 7000
            accounts_dir = "accounts"
            outbound_buffer = 16
            max_line_length = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:7000");
        assert_eq!(config.outbound_buffer, 16);
        assert_eq!(config.max_line_length, 512);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ServerConfig::from_toml_str("prot = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodled.toml");
        std::fs::write(&path, "port = 1234").unwrap();

        let config = ServerConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.port, 1234);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = ServerConfig::load_or_default(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_PORT, "5555"),
            (ENV_BIND, "127.0.0.1"),
            (ENV_ACCOUNTS_DIR, "/var/lib/nodle"),
        ]
        .into_iter()
        .collect();

        let config = ServerConfig::default()
            .apply_env_from(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:5555");
        assert_eq!(config.accounts_dir, PathBuf::from("/var/lib/nodle"));
    }

    #[test]
    fn test_bad_env_port() {
        let err = ServerConfig::default()
            .apply_env_from(|var| (var == ENV_PORT).then(|| "ninety".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_PORT, .. }));
    }

    #[test]
    fn test_no_env_changes_nothing() {
        let config = ServerConfig::default().apply_env_from(|_| None).unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}
