//! Configuration management
//!
//! Handles parsing the database URL and loading server settings.

pub mod connections;
pub mod settings;

pub use connections::{ConnectionConfig, PoolOptions, SslMode};
pub use settings::{Settings, load_settings, load_settings_from};
