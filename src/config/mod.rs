//! # Configuration
//!
//! TOML-based configuration for remote components: type-safe parsing,
//! semantic validation, and file loading.
//!
//! ## Example Configuration
//!
//! ```toml
//! name = "myComponent"
//! halrcmd_uri = "tcp://192.168.1.2:5001"
//! halrcomp_uri = "tcp://192.168.1.2:5002"
//! heartbeat_period_ms = 3000
//! create = true
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::RemoteComponentConfig;
pub use validation::{BasicValidator, ValidationError, ValidationResult, Validator};
