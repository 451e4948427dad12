//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::transport::DEFAULT_HEARTBEAT_PERIOD_MS;

/// Configuration for one remote component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteComponentConfig {
    /// Component name; also the subscription topic on the update channel.
    pub name: String,

    /// URI of the halrcmd service.
    pub halrcmd_uri: String,

    /// URI of the halrcomp service.
    pub halrcomp_uri: String,

    /// Heartbeat period for the command channel in milliseconds; zero
    /// disables the heartbeat.
    pub heartbeat_period_ms: u64,

    /// Whether the remote side may create the component on bind if it
    /// does not exist yet.
    pub create: bool,

    /// Optional tag used in log output instead of the component name.
    pub debug_name: Option<String>,
}

impl Default for RemoteComponentConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            halrcmd_uri: String::new(),
            halrcomp_uri: String::new(),
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD_MS,
            create: true,
            debug_name: None,
        }
    }
}
