//! Application configuration loading from config.toml
//!
//! Every section is optional and falls back to defaults, so the service starts
//! with no configuration file at all. A handful of environment variables
//! (usually supplied through `.env`) override the file so deployment secrets
//! stay out of version control.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Outbound email endpoints
    pub email: EmailConfig,
    /// Login and role settings
    pub auth: AuthConfig,
    /// Feature switches for risky admin actions
    pub features: FeatureRules,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Outbound email endpoints. Both accept a multipart form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Receives coupon emails; issuance is refused while unset
    pub coupon_endpoint: Option<String>,
    /// Receives login codes; code login is refused while unset
    pub login_code_endpoint: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            coupon_endpoint: None,
            login_code_endpoint: None,
            timeout_secs: 30,
        }
    }
}

/// Login and role settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Emails granted the admin role
    pub admins: Vec<String>,
    /// Emails granted the organizer (gate staff) role
    pub organizers: Vec<String>,
    /// How long an emailed login code stays valid
    pub code_ttl_minutes: i64,
    /// How long a session token stays valid
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            organizers: Vec::new(),
            code_ttl_minutes: 10,
            session_ttl_hours: 24,
        }
    }
}

/// Feature switches for risky admin actions
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FeatureRules {
    /// Allows creating, editing and deleting students
    pub enable_editing: bool,
    /// Allows issuing coupons by email
    pub enable_email_sending: bool,
}

impl Default for FeatureRules {
    fn default() -> Self {
        Self {
            enable_editing: true,
            enable_email_sending: true,
        }
    }
}

impl AppConfig {
    /// Applies environment overrides.
    ///
    /// `lookup` is usually [`std::env::var`]; it is a parameter so tests don't have to
    /// mutate the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("EMAIL_API_URL") {
            self.email.coupon_endpoint = Some(endpoint);
        }
        if let Some(endpoint) = lookup("LOGIN_CODE_API_URL") {
            self.email.login_code_endpoint = Some(endpoint);
        }
        if let Some(bind) = lookup("BIND_ADDRESS") {
            self.server.bind = bind;
        }
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Loading configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {path_ref:?}: {e}"),
    })
}

/// Loads configuration from `FEAST_PASS_CONFIG` (default `./config.toml`) and applies
/// environment overrides. A missing file means all defaults.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("FEAST_PASS_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = if Path::new(&path).exists() {
        load_config(&path)?
    } else {
        info!("No configuration file at {}; using defaults", path);
        AppConfig::default()
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}
