//! Configuration loading and typed config structures for the multiverse server.
//!
//! The configuration lives in `multiverse-config.yaml` next to the binary's
//! working directory. This module defines strongly-typed structs mirroring
//! the YAML sections, a loader that reads the file, and environment variable
//! overrides applied on top of the file (or the defaults when it is absent).
//!
//! | Variable | Field |
//! |---|---|
//! | `SERVER_HOST` | `server.host` |
//! | `SERVER_PORT` | `server.port` |
//! | `SERVER_WS_QUEUE_CAPACITY` | `server.ws_queue_capacity` |
//! | `SERVER_READ_TIMEOUT` | `server.read_timeout` |
//! | `SERVER_WRITE_TIMEOUT` | `server.write_timeout` |
//! | `SERVER_WS_HANDSHAKE_TIMEOUT` | `server.ws_handshake_timeout` |
//! | `GAME_FPS` | `game.fps` |
//! | `GAME_CAPACITY` | `game.capacity` |
//! | `GAME_UNIVERSE_PREPEND` | `game.universe_prepend` |
//! | `GAME_REMOVE_STATIC_UNIVERSE_AFTER` | `game.remove_static_universe_after` |
//! | `LOG_LEVEL` | `log.level` |
//! | `LOG_SET_REPORT_CALLER` | `log.set_report_caller` |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::multiverse::{DEFAULT_CAPACITY, InsertMode};

/// Highest accepted `game.fps`.
pub const MAX_FPS: u32 = 1000;

/// Highest accepted `server.ws_queue_capacity`.
pub const MAX_WS_QUEUE_CAPACITY: usize = 1024;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A field holds a value the engine cannot run with.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MultiverseConfig {
    /// HTTP and `WebSocket` settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Simulation settings.
    #[serde(default)]
    pub game: GameConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl MultiverseConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides apply in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields with environment variables when set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Override fields from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SERVER_HOST") {
            self.server.host = val;
        }
        override_parsed(&lookup, "SERVER_PORT", &mut self.server.port)?;
        override_parsed(
            &lookup,
            "SERVER_WS_QUEUE_CAPACITY",
            &mut self.server.ws_queue_capacity,
        )?;
        override_parsed(&lookup, "SERVER_READ_TIMEOUT", &mut self.server.read_timeout)?;
        override_parsed(&lookup, "SERVER_WRITE_TIMEOUT", &mut self.server.write_timeout)?;
        override_parsed(
            &lookup,
            "SERVER_WS_HANDSHAKE_TIMEOUT",
            &mut self.server.ws_handshake_timeout,
        )?;
        override_parsed(&lookup, "GAME_FPS", &mut self.game.fps)?;
        override_parsed(&lookup, "GAME_CAPACITY", &mut self.game.capacity)?;
        override_parsed(
            &lookup,
            "GAME_UNIVERSE_PREPEND",
            &mut self.game.universe_prepend,
        )?;
        override_parsed(
            &lookup,
            "GAME_REMOVE_STATIC_UNIVERSE_AFTER",
            &mut self.game.remove_static_universe_after,
        )?;
        if let Some(val) = lookup("LOG_LEVEL") {
            self.log.level = val;
        }
        override_parsed(
            &lookup,
            "LOG_SET_REPORT_CALLER",
            &mut self.log.set_report_caller,
        )?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FPS).contains(&self.game.fps) {
            return Err(ConfigError::Invalid {
                reason: format!("game.fps must be between 1 and {MAX_FPS}"),
            });
        }
        if self.game.capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "game.capacity must be at least 1".to_owned(),
            });
        }
        if !(1..=MAX_WS_QUEUE_CAPACITY).contains(&self.server.ws_queue_capacity) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "server.ws_queue_capacity must be between 1 and {MAX_WS_QUEUE_CAPACITY}"
                ),
            });
        }
        for (key, secs) in [
            ("server.read_timeout", self.server.read_timeout),
            ("server.write_timeout", self.server.write_timeout),
            ("server.ws_handshake_timeout", self.server.ws_handshake_timeout),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("{key} must be at least 1 second"),
                });
            }
        }
        Ok(())
    }
}

/// HTTP and `WebSocket` server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Updates buffered per subscriber before the oldest is dropped.
    #[serde(default = "default_ws_queue_capacity")]
    pub ws_queue_capacity: usize,

    /// Seconds allowed to receive a request body.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    /// Seconds allowed to produce a response, and to push one frame to a
    /// `WebSocket` client.
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,

    /// Seconds allowed to answer a `WebSocket` upgrade request.
    #[serde(default = "default_ws_handshake_timeout")]
    pub ws_handshake_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_queue_capacity: default_ws_queue_capacity(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            ws_handshake_timeout: default_ws_handshake_timeout(),
        }
    }
}

/// Simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// Ticks per second.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Maximum number of universes held at once.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Insert new universes at the front instead of the back.
    #[serde(default)]
    pub universe_prepend: bool,

    /// Seconds a universe may stay static before it is removed.
    #[serde(default = "default_remove_static_universe_after")]
    pub remove_static_universe_after: u64,
}

impl GameConfig {
    /// Time between two ticks, or `None` when `fps` is zero.
    pub const fn tick_period(&self) -> Option<Duration> {
        Duration::from_secs(1).checked_div(self.fps)
    }

    /// How long a static universe is kept.
    pub const fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.remove_static_universe_after)
    }

    /// Placement of newly created universes.
    pub const fn insert_mode(&self) -> InsertMode {
        InsertMode::from_prepend(self.universe_prepend)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            capacity: default_capacity(),
            universe_prepend: false,
            remove_static_universe_after: default_remove_static_universe_after(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include the source file and line of each event.
    #[serde(default)]
    pub set_report_caller: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            set_report_caller: false,
        }
    }
}

fn override_parsed<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_parse_err| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_ws_queue_capacity() -> usize {
    8
}

const fn default_read_timeout() -> u64 {
    15
}

const fn default_write_timeout() -> u64 {
    15
}

const fn default_ws_handshake_timeout() -> u64 {
    5
}

const fn default_fps() -> u32 {
    4
}

const fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

const fn default_remove_static_universe_after() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_valid() {
        let config = MultiverseConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.game.fps, 4);
        assert_eq!(config.game.capacity, 24);
        assert!(!config.game.universe_prepend);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
server:
  host: 127.0.0.1
  port: 9000
  ws_queue_capacity: 2
  read_timeout: 3
  write_timeout: 4
  ws_handshake_timeout: 1
game:
  fps: 25
  capacity: 32
  universe_prepend: true
  remove_static_universe_after: 10
log:
  level: debug
  set_report_caller: true
";
        let mut config: MultiverseConfig = serde_yml::from_str(yaml).unwrap();
        config.apply_overrides(no_env).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ws_queue_capacity, 2);
        assert_eq!(config.game.fps, 25);
        assert_eq!(config.game.capacity, 32);
        assert_eq!(config.game.insert_mode(), InsertMode::Prepend);
        assert_eq!(config.game.stale_ttl(), Duration::from_secs(10));
        assert_eq!(config.game.tick_period(), Some(Duration::from_millis(40)));
        assert_eq!(config.log.level, "debug");
        assert!(config.log.set_report_caller);
        assert_eq!(
            (config.server.read_timeout, config.server.write_timeout, config.server.ws_handshake_timeout),
            (3, 4, 1)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config: MultiverseConfig = serde_yml::from_str("game:\n  fps: 1\n").unwrap();
        assert_eq!(config.game.fps, 1);
        assert_eq!(config.game.capacity, 24);
        assert_eq!(config.server, ServerSection::default());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let env: BTreeMap<&str, &str> = [
            ("SERVER_PORT", "7000"),
            ("GAME_FPS", "10"),
            ("GAME_UNIVERSE_PREPEND", "true"),
            ("LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = MultiverseConfig::default();
        config
            .apply_overrides(|var| env.get(var).map(|v| (*v).to_owned()))
            .unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.game.fps, 10);
        assert!(config.game.universe_prepend);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn unparseable_env_override_is_an_error() {
        let mut config = MultiverseConfig::default();
        let err = config
            .apply_overrides(|var| (var == "GAME_FPS").then(|| "fast".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "GAME_FPS", .. }));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut config = MultiverseConfig::default();
        config.game.fps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn fps_above_limit_is_rejected() {
        let mut config = MultiverseConfig::default();
        config.game.fps = 2000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.game.fps = MAX_FPS;
        assert!(config.validate().is_ok());
        assert_eq!(config.game.tick_period(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn high_fps_period_is_not_rounded_to_zero() {
        let game = GameConfig {
            fps: 2000,
            ..GameConfig::default()
        };
        assert_eq!(game.tick_period(), Some(Duration::from_micros(500)));
        let zero = GameConfig {
            fps: 0,
            ..GameConfig::default()
        };
        assert_eq!(zero.tick_period(), None);
    }

    #[test]
    fn oversized_ws_queue_is_rejected() {
        let mut config = MultiverseConfig::default();
        config.server.ws_queue_capacity = usize::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        config.server.ws_queue_capacity = MAX_WS_QUEUE_CAPACITY;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_ws_queue_from_env_is_rejected() {
        let mut config = MultiverseConfig::default();
        config
            .apply_overrides(|var| {
                (var == "SERVER_WS_QUEUE_CAPACITY").then(|| "18446744073709551615".to_owned())
            })
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = MultiverseConfig::default();
        config.server.write_timeout = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.write_timeout"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = MultiverseConfig::default();
        config.game.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            MultiverseConfig::parse("game: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
