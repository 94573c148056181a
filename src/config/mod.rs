/// Service, email, auth and feature settings loaded from config.toml
pub mod app;

/// Database configuration and connection management
pub mod database;

pub use app::{AppConfig, AuthConfig, EmailConfig, FeatureRules, ServerConfig};
