use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const URL_SCHEME: &str = "docmap://";
const DEFAULT_PORT: u16 = 27017;

/// Replica read routing requested by the caller.
///
/// Forwarded to the wire client untouched; nothing in this crate branches on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryOnly,
    Nearest,
}

impl FromStr for ReadPreference {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "primary_preferred" | "primarypreferred" => Ok(Self::PrimaryPreferred),
            "secondary" => Ok(Self::Secondary),
            "secondary_only" | "secondaryonly" => Ok(Self::SecondaryOnly),
            "nearest" => Ok(Self::Nearest),
            other => Err(DbError::Config(format!("Unknown read preference '{}'", other))),
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primary_preferred",
            Self::Secondary => "secondary",
            Self::SecondaryOnly => "secondary_only",
            Self::Nearest => "nearest",
        };
        f.write_str(name)
    }
}

/// Database configuration
///
/// Host and port are for wire clients that open real connections; the core
/// only reads the database name and forwards the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub name: String,

    /// Read routing passed to the wire client
    pub read_preference: ReadPreference,

    /// Write acknowledgement timeout in milliseconds
    pub write_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    /// Create a configuration for the named database
    pub fn new(name: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            name: name.to_string(),
            read_preference: ReadPreference::Primary,
            write_timeout_ms: None,
        }
    }

    /// Set the host
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the read preference
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn write_timeout_duration(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Parse from connection string
    ///
    /// Format: "docmap://host:port/name?read_preference=secondary&write_timeout_ms=500"
    ///
    /// # Examples
    ///
    /// ```
    /// # use docmap::{DatabaseConfig, ReadPreference};
    /// let config = DatabaseConfig::from_url(
    ///     "docmap://db.example.com:27018/shop?read_preference=secondary"
    /// ).unwrap();
    /// assert_eq!(config.name, "shop");
    /// assert_eq!(config.read_preference, ReadPreference::Secondary);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| DbError::Config(format!("URL must start with '{}'", URL_SCHEME)))?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (host_port, name) = location
            .split_once('/')
            .ok_or_else(|| DbError::Config("Invalid host/database format".to_string()))?;

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| DbError::Config(format!("Invalid port '{}'", port)))?;
                (host, port)
            }
            None => (host_port, DEFAULT_PORT),
        };

        let mut config = Self::new(name).host(if host.is_empty() { "localhost" } else { host }).port(port);

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DbError::Config(format!("Invalid option '{}'", pair)))?;
            match key {
                "read_preference" | "readPreference" => {
                    config.read_preference = value.parse()?;
                }
                "write_timeout_ms" | "wtimeoutMS" => {
                    let ms = value
                        .parse()
                        .map_err(|_| DbError::Config(format!("Invalid write timeout '{}'", value)))?;
                    config.write_timeout_ms = Some(ms);
                }
                other => {
                    return Err(DbError::Config(format!("Unknown option '{}'", other)));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON document, missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "{}{}:{}/{}?read_preference={}",
            URL_SCHEME, self.host, self.port, self.name, self.read_preference
        );
        if let Some(ms) = self.write_timeout_ms {
            url.push_str(&format!("&write_timeout_ms={}", ms));
        }
        url
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DbError::Config("Database name cannot be empty".to_string()));
        }

        if self.name.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(DbError::Config(format!(
                "Database name '{}' contains invalid characters",
                self.name
            )));
        }

        if self.port == 0 {
            return Err(DbError::Config("port must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("test")
    }
}
