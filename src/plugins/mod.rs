//! # Plugin discovery
//!
//! Walks a set of search paths for `plugin.ini` manifest files and
//! collects the described UI plugins. Discovery is filesystem-only; no
//! plugin code is loaded here.

mod manifest;
mod registry;

pub use manifest::{Plugin, PluginKind};
pub use registry::{PluginError, PluginRegistry, PluginResult};
