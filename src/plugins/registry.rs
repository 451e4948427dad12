//! Recursive plugin discovery over a set of search paths.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::manifest::Plugin;

/// Name of the manifest file that marks a plugin directory.
const MANIFEST_FILE: &str = "plugin.ini";

/// Errors raised during plugin discovery.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A directory could not be listed.
    #[error("failed to scan '{path}': {source}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest file could not be read.
    #[error("failed to read manifest '{path}': {source}")]
    Manifest {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for plugin discovery.
pub type PluginResult<T> = Result<T, PluginError>;

/// Walks search paths for plugin manifests and keeps the discovered set.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    search_paths: Vec<PathBuf>,
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory tree to scan on the next update.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Replaces the search path set.
    pub fn set_search_paths(&mut self, paths: Vec<PathBuf>) {
        self.search_paths = paths;
    }

    /// The plugins found by the last update.
    #[must_use]
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Rescans every search path from scratch. Search paths that do not
    /// exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory listing or manifest read fails.
    pub fn update(&mut self) -> PluginResult<()> {
        self.plugins.clear();
        let paths = self.search_paths.clone();
        for path in &paths {
            if !path.is_dir() {
                debug!("skipping missing plugin path {}", path.display());
                continue;
            }
            self.scan_directory(path)?;
        }
        Ok(())
    }

    /// Drops every discovered plugin.
    pub fn clear(&mut self) {
        self.plugins.clear();
    }

    fn scan_directory(&mut self, directory: &Path) -> PluginResult<()> {
        let entries = std::fs::read_dir(directory).map_err(|e| PluginError::Scan {
            path: directory.to_path_buf(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| PluginError::Scan {
                path: directory.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_dir() {
                self.scan_directory(&path)?;
            } else if path.file_name().is_some_and(|name| name == MANIFEST_FILE) {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| PluginError::Manifest {
                        path: path.clone(),
                        source: e,
                    })?;
                let plugin = Plugin::from_manifest(&path, &content);
                debug!("discovered plugin '{}' at {}", plugin.name, path.display());
                self.plugins.push(plugin);
            }
        }
        Ok(())
    }
}
