/*!
 * Core Module
 * Fundamental supervisor types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod types;

// Re-export for convenience
pub use config::{Config, ConfigError, ConfigResult};
pub use errors::*;
pub use types::*;
