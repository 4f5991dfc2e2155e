//! Core module - configuration and run outcome

pub mod config;
pub mod status;

pub use config::{Config, ConfigError, MigrationSettings, Settings};
pub use status::{MigrationReport, MigrationStatus};
