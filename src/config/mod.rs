use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GameError, Result};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rooms: RoomConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct AuthConfig {
    pub jwt_secret: String,
}

pub struct RoomConfig {
    /// Rooms without participants for longer than this are reaped. `None` keeps
    /// rooms for the process lifetime.
    pub idle_timeout: Option<Duration>,
    pub reap_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let jwt_secret = match env::var("AUTH_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("AUTH_JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let idle_timeout = match env::var("ROOM_IDLE_TIMEOUT_SECS") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(Duration::from_secs(parse_var("ROOM_IDLE_TIMEOUT_SECS", &raw)?))
            }
            _ => None,
        };

        let reap_interval_secs: u64 = parse_var(
            "ROOM_REAP_INTERVAL_SECS",
            &env::var("ROOM_REAP_INTERVAL_SECS").unwrap_or_else(|_| "60".to_string()),
        )?;
        if reap_interval_secs == 0 {
            return Err(GameError::InvalidConfiguration(
                "ROOM_REAP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var(
                    "SERVER_PORT",
                    &env::var("SERVER_PORT").unwrap_or_else(|_| "8080".to_string()),
                )?,
            },
            auth: AuthConfig { jwt_secret },
            rooms: RoomConfig {
                idle_timeout,
                reap_interval: Duration::from_secs(reap_interval_secs),
            },
        })
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GameError::ConfigurationParseFailed(format!("{}={:?}", name, raw)))
}
