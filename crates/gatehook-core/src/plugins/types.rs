use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

fn default_true() -> bool {
    true
}

/// One manifest entry. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path or identifier of the plugin's script source
    #[serde(rename = "filename")]
    pub source_ref: String,
    #[serde(default)]
    pub description: String,
    /// Service name this plugin applies to
    pub target: String,
}

impl PluginSpec {
    pub fn new(source_ref: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            enabled: true,
            source_ref: source_ref.into(),
            description: String::new(),
            target: target.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Name used in logs and decision reasons
    pub fn name(&self) -> &str {
        &self.source_ref
    }

    pub fn targets(&self, target: &str) -> bool {
        self.target == target
    }
}

/// Parsed manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

impl PluginManifest {
    pub fn new(plugins: Vec<PluginSpec>) -> Self {
        Self { plugins }
    }

    /// Parse a manifest document. `origin` only feeds the error message.
    pub fn from_json(content: &str, origin: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(content).map_err(|source| ManifestError::Unparsable {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn enabled(&self) -> impl Iterator<Item = &PluginSpec> {
        self.plugins.iter().filter(|spec| spec.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_in_declared_order() {
        let manifest = PluginManifest::from_json(
            r#"{
                "plugins": [
                    {"enabled": true, "filename": "a.rhai", "description": "first", "target": "svcA"},
                    {"enabled": false, "filename": "b.rhai", "description": "second", "target": "svcB"}
                ]
            }"#,
            "inline",
        )
        .unwrap();

        assert_eq!(manifest.plugins.len(), 2);
        assert_eq!(manifest.plugins[0].source_ref, "a.rhai");
        assert_eq!(manifest.plugins[0].description, "first");
        assert!(manifest.plugins[0].targets("svcA"));
        assert!(!manifest.plugins[1].enabled);
        assert_eq!(manifest.enabled().count(), 1);
    }

    #[test]
    fn optional_fields_take_defaults() {
        let manifest = PluginManifest::from_json(
            r#"{"plugins": [{"filename": "a.rhai", "target": "svcA"}]}"#,
            "inline",
        )
        .unwrap();

        let spec = &manifest.plugins[0];
        assert!(spec.enabled);
        assert!(spec.description.is_empty());
    }

    #[test]
    fn missing_plugins_key_is_an_empty_manifest() {
        let manifest = PluginManifest::from_json("{}", "inline").unwrap();
        assert!(manifest.plugins.is_empty());
    }

    #[test]
    fn malformed_manifest_reports_origin() {
        let err = PluginManifest::from_json("{\"plugins\": [", "plugins.json").unwrap_err();
        assert!(matches!(err, ManifestError::Unparsable { .. }));
        assert!(err.to_string().contains("plugins.json"));
    }

    #[test]
    fn entry_without_target_is_rejected() {
        let result = PluginManifest::from_json(r#"{"plugins": [{"filename": "a.rhai"}]}"#, "inline");
        assert!(result.is_err());
    }
}
