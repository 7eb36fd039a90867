//! Process configuration, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `REDIS_URL` | unset: in-memory key-value store |
//! | `JWT_SECRET` | required |
//! | `JWT_EXPIRES_MINUTES` | `1440` |
//! | `APP_URL` | `http://localhost:3000` |
//! | `LOG_FORMAT` | `pretty` (`json` for one JSON object per line) |
//! | `BODY_LIMIT_BYTES` | `1048576` |

use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    pub app_url: String,
    pub log_format: LogFormat,
    pub body_limit: usize,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host: IpAddr = parse(&get, "HOST", "0.0.0.0")?;
        let port: u16 = parse(&get, "PORT", "3000")?;
        let minutes: i64 = parse(&get, "JWT_EXPIRES_MINUTES", "1440")?;
        let body_limit: usize = parse(&get, "BODY_LIMIT_BYTES", "1048576")?;
        if minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_EXPIRES_MINUTES",
                value: minutes.to_string(),
            });
        }

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid { key: "LOG_FORMAT", value: other.to_owned() });
            }
        };

        Ok(Self {
            addr: SocketAddr::new(host, port),
            redis_url: get("REDIS_URL"),
            jwt_secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            jwt_ttl: chrono::Duration::minutes(minutes),
            app_url: get("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_owned()),
            log_format,
            body_limit,
        })
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = get(key).unwrap_or_else(|| default.to_owned());
    value.trim().parse().map_err(|_| ConfigError::Invalid { key, value })
}
