//! Client configuration
//!
//! This module defines configuration types and default values:
//! - `client_config`: Configuration structure and TOML loading
//! - `defaults`: Default configuration values

pub mod client_config;
pub mod defaults;

// Re-export configuration types
pub use client_config::{ClientConfig, ConsoleConfig, LoggingConfig, ReconnectConfig, ServerConfig};
