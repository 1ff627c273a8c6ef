//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::client::motion::MotionConfig;
use crate::client::spatial::SpatialConfig;
use crate::presence::DEFAULT_WORLD_LIMIT;
use crate::util::rate_limit::POS_RATE_LIMIT;
use crate::util::throttle::REPORT_INTERVAL;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Positions are clamped into `[-world_limit, world_limit]` on each axis
    pub world_limit: f64,
    /// Inbound frames accepted per second per connection
    pub pos_rate_limit: u32,
    /// Allowed client origins for CORS; empty allows any origin
    pub client_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR so container platforms can pick the port
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let world_limit: f64 = parse_var("WORLD_LIMIT", DEFAULT_WORLD_LIMIT)?;
        if !world_limit.is_finite() || world_limit <= 0.0 {
            return Err(ConfigError::Invalid("WORLD_LIMIT"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            world_limit,
            pos_rate_limit: parse_var("POS_RATE_LIMIT", POS_RATE_LIMIT)?,
            client_origins: env::var("CLIENT_ORIGIN")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: "info".to_string(),
            world_limit: DEFAULT_WORLD_LIMIT,
            pos_rate_limit: POS_RATE_LIMIT,
            client_origins: Vec::new(),
        }
    }
}

/// Client engine configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket endpoint of the presence server
    pub server_url: String,
    pub log_level: String,
    /// Minimum spacing between position reports
    pub report_interval: Duration,
    pub motion: MotionConfig,
    pub spatial: SpatialConfig,
    /// Animation frames per second
    pub frame_rate: u32,
    /// Wait before reconnecting after the transport drops
    pub reconnect_delay: Duration,
    /// Seed for the wander client's pointer
    pub bot_seed: Option<u64>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let spatial = SpatialConfig {
            near: parse_var("AUDIO_NEAR", defaults.spatial.near)?,
            cutoff: parse_var("AUDIO_CUTOFF", defaults.spatial.cutoff)?,
        };
        if spatial.near < 0.0 || spatial.cutoff <= spatial.near {
            return Err(ConfigError::Invalid("AUDIO_CUTOFF"));
        }

        Ok(Self {
            server_url: env::var("SERVER_URL").unwrap_or(defaults.server_url),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            report_interval: Duration::from_millis(parse_var(
                "REPORT_INTERVAL_MS",
                defaults.report_interval.as_millis() as u64,
            )?),
            motion: MotionConfig {
                move_speed: parse_var("MOVE_SPEED", defaults.motion.move_speed)?,
                snap_threshold: defaults.motion.snap_threshold,
                interp_gain: parse_var("INTERP_GAIN", defaults.motion.interp_gain)?,
            },
            spatial,
            frame_rate: parse_var("FRAME_RATE", defaults.frame_rate)?,
            reconnect_delay: Duration::from_millis(parse_var(
                "RECONNECT_DELAY_MS",
                defaults.reconnect_delay.as_millis() as u64,
            )?),
            bot_seed: match env::var("BOT_SEED") {
                Ok(v) => Some(v.parse().map_err(|_| ConfigError::Invalid("BOT_SEED"))?),
                Err(_) => None,
            },
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3000/ws".to_string(),
            log_level: "info".to_string(),
            report_interval: REPORT_INTERVAL,
            motion: MotionConfig::default(),
            spatial: SpatialConfig::default(),
            frame_rate: 60,
            reconnect_delay: Duration::from_millis(1000),
            bot_seed: None,
        }
    }
}

/// Read `key`, falling back to `default` when unset
fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_list_ignores_blanks() {
        assert_eq!(
            split_list(" https://a.example, ,https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u32 = parse_var("PROXIMITY_SPACE_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn client_defaults_match_engine_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.report_interval, Duration::from_millis(25));
        assert_eq!(config.motion.move_speed, 64.0);
        assert_eq!(config.motion.interp_gain, 5.0);
        assert!(config.spatial.cutoff > config.spatial.near);
    }
}
