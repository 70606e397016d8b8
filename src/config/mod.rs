//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (platform config dir)
//! 3. Project config (.trialsift/config.toml)
//! 4. Environment variables (TRIALSIFT_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{API_KEY_ENV, ConfigLoader, ENV_PREFIX};
pub use types::*;
