use crate::core::{DbLinkError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment flag selecting the local profile (`1`, `true` or `yes`).
pub const LOCAL_FLAG_VAR: &str = "DBLINK_LOCAL";
/// Environment variable naming the profile explicitly.
pub const PROFILE_VAR: &str = "DBLINK_PROFILE";

/// Top-level settings structure parsed from a TOML file.
///
/// Each profile is a complete connection description; the environment picks
/// which one is used.
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub local: Option<ConnectionConfig>,
    pub production: Option<ConnectionConfig>,
}

/// Named connection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Local,
    Production,
}

impl Profile {
    /// Selects the profile from the process environment.
    pub fn from_env() -> Self {
        let local = std::env::var(LOCAL_FLAG_VAR).ok();
        let named = std::env::var(PROFILE_VAR).ok();
        Profile::from_vars(local.as_deref(), named.as_deref())
    }

    /// Selects the profile from raw variable values. The local flag wins over
    /// the profile name; production is the fallback.
    pub fn from_vars(local_flag: Option<&str>, profile: Option<&str>) -> Self {
        if let Some(flag) = local_flag {
            match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => return Profile::Local,
                "0" | "false" | "no" => return Profile::Production,
                _ => {}
            }
        }
        profile
            .and_then(Profile::parse)
            .unwrap_or(Profile::Production)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "dev" | "development" => Some(Profile::Local),
            "production" | "prod" => Some(Profile::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Local => "local",
            Profile::Production => "production",
        }
    }
}

/// How driver failures are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Failures surface as typed errors
    #[default]
    Exception,
    /// Failures are logged at warn level by the driver, then surface as typed errors
    Warning,
}

/// Shape of fetched rows when serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Column name to value maps
    #[default]
    Assoc,
    /// Positional value arrays
    Num,
}

/// How statements are prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrepareMode {
    /// Every statement is freshly prepared
    #[default]
    Native,
    /// Prepared statements are kept in the connection's statement cache
    Cached,
}

/// Fixed driver behavior options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    pub error_mode: ErrorMode,
    pub fetch_mode: FetchMode,
    pub prepare_mode: PrepareMode,
}

/// Immutable description of the one database connection.
#[derive(Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub host: String,
    pub name: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub options: DriverOptions,
}

fn default_engine() -> String {
    "sqlite".to_string()
}

fn default_charset() -> String {
    "utf8".to_string()
}

impl ConnectionConfig {
    /// SQLite configuration for the database at `name` with default options.
    pub fn sqlite(name: impl Into<String>) -> Self {
        ConnectionConfig {
            engine: default_engine(),
            host: String::new(),
            name: name.into(),
            charset: default_charset(),
            user: String::new(),
            pass: String::new(),
            options: DriverOptions::default(),
        }
    }

    /// In-memory SQLite configuration.
    pub fn in_memory() -> Self {
        ConnectionConfig::sqlite(":memory:")
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Data source name used in log lines. Never includes credentials.
    pub fn dsn(&self) -> String {
        format!(
            "{}:host={};dbname={};charset={}",
            self.engine, self.host, self.name, self.charset
        )
    }

    /// Location of the database: `name`, or `host/name` when a host directory is set.
    pub fn database_path(&self) -> String {
        if self.name == ":memory:" || self.host.is_empty() || self.host == "localhost" {
            self.name.clone()
        } else {
            Path::new(&self.host).join(&self.name).to_string_lossy().into_owned()
        }
    }

    /// Value for `PRAGMA encoding` matching the configured charset.
    pub fn sqlite_encoding(&self) -> Result<&'static str> {
        match self.charset.trim().to_lowercase().as_str() {
            "utf8" | "utf8mb4" | "utf-8" => Ok("UTF-8"),
            "utf16" | "utf-16" => Ok("UTF-16"),
            "utf16le" | "utf-16le" => Ok("UTF-16le"),
            "utf16be" | "utf-16be" => Ok("UTF-16be"),
            other => Err(DbLinkError::Connection(format!("unsupported charset '{}'", other))),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("name", &self.name)
            .field("charset", &self.charset)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl Settings {
    /// Loads settings from a TOML file at the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DbLinkError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Settings::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Settings> {
        Ok(toml::from_str(content)?)
    }

    /// Returns the connection description for the given profile.
    pub fn select(&self, profile: Profile) -> Result<ConnectionConfig> {
        let config = match profile {
            Profile::Local => self.local.as_ref(),
            Profile::Production => self.production.as_ref(),
        };
        config.cloned().ok_or_else(|| {
            DbLinkError::Config(format!("profile '{}' is not defined", profile.as_str()))
        })
    }
}

/// Default settings file location: `<config dir>/dblink/database.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dblink")
        .join("database.toml")
}
