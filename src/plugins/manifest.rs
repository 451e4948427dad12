//! Plugin manifest parsing.

use std::path::{Path, PathBuf};

/// Implementation technology of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginKind {
    /// QML user interface plugin.
    #[default]
    Qml,
    /// Python plugin.
    Python,
}

impl PluginKind {
    fn from_manifest_type(value: &str) -> Self {
        match value {
            "PYTHON" => Self::Python,
            // QT5_QML and anything unrecognized.
            _ => Self::Qml,
        }
    }
}

/// A discovered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    /// Display name from the manifest; `"Unnamed"` if missing.
    pub name: String,

    /// Free-text description; may be empty.
    pub description: String,

    /// Implementation technology.
    pub kind: PluginKind,

    /// Entry file next to the manifest, named after the plugin.
    pub main_file: PathBuf,
}

impl Plugin {
    /// Builds a plugin entry from the text of a `plugin.ini` manifest.
    ///
    /// The manifest carries a `[Default]` section with `name`,
    /// `description`, and `type` keys. Missing keys fall back to benign
    /// defaults rather than failing the scan.
    pub(crate) fn from_manifest(manifest_path: &Path, content: &str) -> Self {
        let mut name = None;
        let mut description = None;
        let mut kind_value = None;

        let mut in_default_section = false;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_default_section = section.trim() == "Default";
                continue;
            }
            if !in_default_section {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "name" => name = Some(value.to_string()),
                "description" => description = Some(value.to_string()),
                "type" => kind_value = Some(value.to_string()),
                _ => {}
            }
        }

        let name = name.unwrap_or_else(|| "Unnamed".to_string());
        let kind = kind_value
            .as_deref()
            .map(PluginKind::from_manifest_type)
            .unwrap_or_default();
        let directory = manifest_path.parent().unwrap_or_else(|| Path::new(""));
        // The entry file is always the QML file next to the manifest,
        // whatever the plugin type.
        let main_file = directory.join(format!("{name}.qml"));

        Self {
            name,
            description: description.unwrap_or_default(),
            kind,
            main_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_with_all_keys() {
        let plugin = Plugin::from_manifest(
            Path::new("/plugins/dro/plugin.ini"),
            "[Default]\nname = dro\ndescription = Digital readout\ntype = QT5_QML\n",
        );
        assert_eq!(plugin.name, "dro");
        assert_eq!(plugin.description, "Digital readout");
        assert_eq!(plugin.kind, PluginKind::Qml);
        assert_eq!(plugin.main_file, PathBuf::from("/plugins/dro/dro.qml"));
    }

    #[test]
    fn test_python_plugin_keeps_qml_main_file() {
        let plugin = Plugin::from_manifest(
            Path::new("/plugins/probe/plugin.ini"),
            "[Default]\nname = probe\ntype = PYTHON\n",
        );
        assert_eq!(plugin.kind, PluginKind::Python);
        assert_eq!(plugin.main_file, PathBuf::from("/plugins/probe/probe.qml"));
    }

    #[test]
    fn test_missing_name_falls_back_to_unnamed() {
        let plugin = Plugin::from_manifest(
            Path::new("/plugins/x/plugin.ini"),
            "[Default]\ndescription = mystery\n",
        );
        assert_eq!(plugin.name, "Unnamed");
        assert_eq!(plugin.kind, PluginKind::Qml);
    }

    #[test]
    fn test_keys_outside_default_section_are_ignored() {
        let plugin = Plugin::from_manifest(
            Path::new("/plugins/y/plugin.ini"),
            "[Other]\nname = wrong\n[Default]\nname = right\n",
        );
        assert_eq!(plugin.name, "right");
    }

    #[test]
    fn test_unknown_type_falls_back_to_qml() {
        let plugin = Plugin::from_manifest(
            Path::new("/plugins/z/plugin.ini"),
            "[Default]\nname = z\ntype = COBOL\n",
        );
        assert_eq!(plugin.kind, PluginKind::Qml);
    }
}
