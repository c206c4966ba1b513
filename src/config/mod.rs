use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::OAuthConfig;
use crate::drive::DriveConfig;
use crate::error::{CaptureError, Result};
use crate::recording::CaptureSettings;
use crate::storage::StorageType;

pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub capture: CaptureSettings,
    pub drive: DriveConfig,
    pub oauth: Option<OAuthConfig>,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub preferred: StorageType,
}

impl StorageConfig {
    /// Directory holding the key-value records (registry, credential)
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Directory holding locally saved recordings
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("recordings")
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: parse_var("SERVER_PORT", 8787)?,
            },
            storage: StorageConfig {
                data_dir: env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                preferred: parse_var("PREFERRED_STORAGE", StorageType::Drive)?,
            },
            capture: CaptureSettings::from_env()?,
            drive: DriveConfig::from_env()?,
            oauth: OAuthConfig::from_env(),
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
                        "IPv6 address provided but only IPv4 supported, using 127.0.0.1"
                    );
                    return Ipv4Addr::LOCALHOST;
                }
            }
        }

        match self.server.host.as_str() {
            "" | "localhost" => Ipv4Addr::LOCALHOST,
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 127.0.0.1"
                );
                Ipv4Addr::LOCALHOST
            }
        }
    }
}

/// Reads `name` from the environment, falling back to `default` when unset
pub(crate) fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e| {
            CaptureError::ConfigurationParseFailed(format!("{}={}: {}", name, raw, e))
        }),
        _ => Ok(default),
    }
}
