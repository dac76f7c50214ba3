//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed client origins for CORS (comma separated), permissive when unset
    pub client_origin: Option<String>,

    /// Account backend base URL (identity lookup and match history)
    pub account_api_url: Option<String>,
    /// Service key sent when recording match results
    pub account_api_key: Option<String>,

    /// Simulation tuning shared by every match
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").ok(),

            account_api_url: env::var("ACCOUNT_API_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string()),
            account_api_key: env::var("ACCOUNT_API_KEY").ok(),

            game: GameConfig::from_env()?,
        })
    }
}

/// Table, paddle and ball dimensions plus match rules
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub table_width: f32,
    pub table_depth: f32,
    pub wall_thickness: f32,
    pub paddle_width: f32,
    pub paddle_depth: f32,
    /// Paddle step per tick while a key is held
    pub paddle_speed: f32,
    pub ball_diameter: f32,
    /// Ball step per tick on each axis
    pub ball_speed: f32,
    /// Ticks per second
    pub tick_rate: u32,
    /// Score that ends a match naturally (none = only disconnects end it)
    pub score_to_win: Option<u32>,
    /// Hold the `start` broadcast until both players sent `ready`
    pub require_ready: bool,
}

impl GameConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            table_width: parse_or("TABLE_WIDTH", defaults.table_width)?,
            table_depth: parse_or("TABLE_DEPTH", defaults.table_depth)?,
            wall_thickness: parse_or("WALL_THICKNESS", defaults.wall_thickness)?,
            paddle_width: parse_or("PADDLE_WIDTH", defaults.paddle_width)?,
            paddle_depth: parse_or("PADDLE_DEPTH", defaults.paddle_depth)?,
            paddle_speed: parse_or("PADDLE_SPEED", defaults.paddle_speed)?,
            ball_diameter: parse_or("BALL_DIAMETER", defaults.ball_diameter)?,
            ball_speed: parse_or("BALL_SPEED", defaults.ball_speed)?,
            tick_rate: parse_or("TICK_RATE", defaults.tick_rate)?,
            score_to_win: match env::var("SCORE_TO_WIN") {
                Ok(raw) => Some(
                    raw.parse()
                        .map_err(|_| ConfigError::Invalid("SCORE_TO_WIN"))?,
                ),
                Err(_) => None,
            },
            require_ready: parse_or("REQUIRE_READY", defaults.require_ready)?,
        })
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            table_width: 20.0,
            table_depth: 10.0,
            wall_thickness: 0.5,
            paddle_width: 2.0,
            paddle_depth: 0.5,
            paddle_speed: 0.2,
            ball_diameter: 0.5,
            ball_speed: 0.1,
            tick_rate: 30,
            score_to_win: None,
            require_ready: false,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
