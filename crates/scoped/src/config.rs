//! Configuration management for the scoped server.
//!
//! Settings live in a TOML file with three sections: `[server]` for networking and
//! message limits, `[world]` for the scope tables of the sample world, and `[logging]`.
//! A missing file is created with the defaults on first start.

use scope_protocol::{DEFAULT_MAX_MESSAGE_SIZE, MAX_SCOPES, MAX_SCOPE_PREFABS, MIN_MESSAGE_SIZE};
use scope_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Scope tables of the hosted world
    #[serde(default)]
    pub world: WorldSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Network binding and message limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest message the transport delivers in one piece, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

/// The scopes the world is made of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    /// Scopes loaded with the world, in id order (the first one gets id 1)
    #[serde(default)]
    pub default_scopes: Vec<DefaultScopeSettings>,
    /// Scopes loaded on demand, by key
    #[serde(default)]
    pub extra_scopes: Vec<ExtraScopeSettings>,
}

/// One default scope and the cubes it starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultScopeSettings {
    pub name: String,
    /// Period of the cube shuffle broadcast in milliseconds (0 to disable)
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default)]
    pub cubes: Vec<CubeSettings>,
}

/// One extra scope prefab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraScopeSettings {
    /// Lookup key used by clients and by `load_extra_scope`
    pub key: String,
    /// Period of the cube shuffle broadcast in milliseconds (0 to disable)
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Initial state of a seeded cube.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubeSettings {
    /// RGBA
    pub color: [u8; 4],
    pub position: [f32; 3],
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            default_scopes: vec![
                DefaultScopeSettings {
                    name: "lobby".to_string(),
                    refresh_interval_ms: 1000,
                    cubes: vec![
                        CubeSettings {
                            color: [255, 255, 255, 255],
                            position: [0.0, 0.0, 0.0],
                        },
                        CubeSettings {
                            color: [255, 0, 0, 255],
                            position: [2.0, 0.0, -1.0],
                        },
                        CubeSettings {
                            color: [0, 0, 255, 255],
                            position: [-2.0, 1.0, 1.5],
                        },
                    ],
                },
                DefaultScopeSettings {
                    name: "garden".to_string(),
                    refresh_interval_ms: 2000,
                    cubes: vec![
                        CubeSettings {
                            color: [0, 255, 0, 255],
                            position: [1.0, 1.0, 1.0],
                        },
                        CubeSettings {
                            color: [0, 255, 0, 128],
                            position: [-3.0, 0.5, 2.0],
                        },
                    ],
                },
            ],
            extra_scopes: vec![ExtraScopeSettings {
                key: "sample-extra".to_string(),
                refresh_interval_ms: 1000,
            }],
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl DefaultScopeSettings {
    pub fn refresh_interval(&self) -> Option<Duration> {
        interval_from_millis(self.refresh_interval_ms)
    }
}

impl ExtraScopeSettings {
    pub fn refresh_interval(&self) -> Option<Duration> {
        interval_from_millis(self.refresh_interval_ms)
    }
}

fn interval_from_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

impl AppConfig {
    /// Loads configuration from a TOML file, or creates a default one.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded configuration, or an error if the file could not be read, parsed
    /// or written.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Replication server settings derived from `[server]`.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            max_message_size: self.server.max_message_size,
        }
    }

    /// Checks the configuration for values the server cannot run with.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, otherwise a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.server.max_message_size < MIN_MESSAGE_SIZE {
            return Err(format!(
                "server.max_message_size must be at least {MIN_MESSAGE_SIZE} bytes, got {}",
                self.server.max_message_size
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.world.default_scopes.len() >= MAX_SCOPES as usize {
            return Err(format!(
                "Too many default scopes: {} (at most {})",
                self.world.default_scopes.len(),
                MAX_SCOPES - 1
            ));
        }
        if let Some(position) = self.world.default_scopes.iter().position(|s| s.name.trim().is_empty()) {
            return Err(format!("world.default_scopes[{position}] needs a name"));
        }

        if self.world.extra_scopes.len() > MAX_SCOPE_PREFABS as usize {
            return Err(format!("Too many extra scopes: {}", self.world.extra_scopes.len()));
        }
        let mut keys = HashSet::new();
        for extra in &self.world.extra_scopes {
            let key = extra.key.trim();
            if key.is_empty() {
                return Err("Extra scope keys cannot be empty".to_string());
            }
            if !keys.insert(key) {
                return Err(format!("Duplicate extra scope key: {key}"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.max_message_size, 1028);
        assert_eq!(config.world.default_scopes.len(), 2);
        assert_eq!(config.world.default_scopes[0].cubes.len(), 3);
        assert_eq!(config.world.extra_scopes[0].key, "sample-extra");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_conversion() {
        let mut config = AppConfig::default();
        config.server.max_message_size = 2048;
        let server = config.to_server_config();
        assert_eq!(server.max_message_size, 2048);
        assert_eq!(server.max_payload_size(), 1443);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().unwrap_err().contains("bind address"));

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("log level"));

        let mut config = AppConfig::default();
        config.server.max_message_size = 100;
        assert!(config.validate().unwrap_err().contains("max_message_size"));

        let mut config = AppConfig::default();
        config.world.extra_scopes.push(ExtraScopeSettings {
            key: " sample-extra ".to_string(),
            refresh_interval_ms: 0,
        });
        assert!(config.validate().unwrap_err().contains("Duplicate"));

        let mut config = AppConfig::default();
        config.world.extra_scopes[0].key = "   ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.world.default_scopes[1].name = String::new();
        assert!(config.validate().unwrap_err().contains("default_scopes[1]"));
    }

    #[test]
    fn test_zero_interval_disables_refresh() {
        let settings = ExtraScopeSettings {
            key: "quiet".to_string(),
            refresh_interval_ms: 0,
        };
        assert!(settings.refresh_interval().is_none());
        assert_eq!(
            AppConfig::default().world.default_scopes[0].refresh_interval(),
            Some(Duration::from_millis(1000))
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.expect("Failed to load config");
        assert!(path.exists());
        assert_eq!(config.world.default_scopes.len(), 2);

        let reloaded = AppConfig::load_from_file(&path).await.expect("Failed to reload config");
        assert_eq!(reloaded.world.default_scopes[1].name, "garden");
        assert_eq!(reloaded.world.default_scopes[0].cubes[1].color, [255, 0, 0, 255]);
        assert_eq!(reloaded.world.default_scopes[0].cubes[2].position, [-2.0, 1.0, 1.5]);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let path = temp_file.path().to_path_buf();
        let content = r#"
[server]
bind_address = "0.0.0.0:9000"

[[world.default_scopes]]
name = "only"

[[world.default_scopes.cubes]]
color = [1, 2, 3, 4]
position = [0.5, 0.25, -1.0]
"#;
        fs::write(&path, content).await.expect("Failed to write config");

        let config = AppConfig::load_from_file(&path).await.expect("Failed to load config");
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.server.max_message_size, 1028);
        assert_eq!(config.world.default_scopes.len(), 1);
        assert_eq!(config.world.default_scopes[0].refresh_interval_ms, 1000);
        assert_eq!(config.world.default_scopes[0].cubes[0].color, [1, 2, 3, 4]);
        assert!(config.world.extra_scopes.is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }
}
